use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use log::info;

use crate::model::timestamp::{self, parse_timestamp};
use crate::model::{
    NewAddress, NewCharge, NewConveyancer, NewOwner, NewRestriction, NewTitle, PriceHistory,
    TitleOwner, X500Name,
};
use crate::store::traits::Store;

pub const SEED_TITLE_NUMBER: &str = "RTV237250";
pub const SEED_OWNER_IDENTITY: &str = "1";
pub const SEED_CONVEYANCER: &str =
    "O=Generic Conveyancing Company,L=Plymouth,C=GB,ST=Devon,OU=Digital,CN=Generic Conveyancing Company";

fn date(text: &str) -> Result<NaiveDateTime> {
    parse_timestamp(text).map_err(|e| anyhow!(e))
}

fn digital_street() -> NewAddress {
    NewAddress {
        house_name_or_number: "1".to_string(),
        street_name: "Digital Street".to_string(),
        city: "Bristol".to_string(),
        county: "Avon".to_string(),
        country: "England".to_string(),
        postcode: "BS2 8EN".to_string(),
    }
}

/// Load the demonstration records. Records that already exist are left as
/// they are, so this can run on every start-up.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    load_conveyancers(store).await?;
    load_titles(store).await?;
    Ok(())
}

async fn load_conveyancers<S: Store>(store: &S) -> Result<()> {
    let conveyancer = NewConveyancer::new(SEED_CONVEYANCER, "Generic Conveyancing Company")?;

    let existing = store.list_conveyancers().await?;
    if existing.iter().any(|c| c.x500_name == conveyancer.x500_name) {
        info!("Conveyancer {} already present", conveyancer.company_name);
        return Ok(());
    }

    let created = store.create_conveyancer(conveyancer).await?;
    info!("Created conveyancer {} ({})", created.conveyancer_id, created.company_name);
    Ok(())
}

async fn load_titles<S: Store>(store: &S) -> Result<()> {
    if store.get_title(SEED_TITLE_NUMBER).await?.is_some() {
        info!("Title {} already present", SEED_TITLE_NUMBER);
        return Ok(());
    }

    let owner = match store.get_owner(SEED_OWNER_IDENTITY).await? {
        Some(owner) => TitleOwner::Existing(owner.owner.identity),
        None => TitleOwner::New {
            owner: NewOwner::new(
                SEED_OWNER_IDENTITY,
                "Lisa",
                "White",
                "lisa.seller@example.com",
                "07123456780",
                "individual",
            ),
            address: digital_street(),
        },
    };

    let lender = X500Name::new("Generic Bank", "London", "GB").with_organisational_unit("Mortgages");

    let mut title = NewTitle::new(SEED_TITLE_NUMBER, owner, digital_street(), timestamp::now());
    title.price_history = vec![
        PriceHistory::new(SEED_TITLE_NUMBER, 150_000, "GBP", date("2009-05-01")?),
        PriceHistory::new(SEED_TITLE_NUMBER, 210_000, "GBP", date("2015-09-14")?),
    ];
    title.restrictions = vec![NewRestriction {
        restriction_code: "RX001".to_string(),
        restriction_type: "CBCR".to_string(),
        restriction_text: "No disposition of the registered estate by the proprietor of the \
                           registered estate is to be registered without a written consent signed \
                           by the proprietor for the time being of the Charge dated 2015-09-14 \
                           in favour of Generic Bank."
            .to_string(),
        consenting_party: lender.serialize()?,
        restriction_date: date("2015-09-14")?,
        title_number: SEED_TITLE_NUMBER.to_string(),
        charge: Some(NewCharge::new(date("2015-09-14")?, &lender, 168_000.0, "GBP", SEED_TITLE_NUMBER)),
    }];
    title.charges = vec![NewCharge::new(
        date("2017-02-20")?,
        &X500Name::new("Second Lending Company", "Leeds", "GB"),
        12_500.0,
        "GBP",
        SEED_TITLE_NUMBER,
    )];

    store.create_title(title).await?;
    info!("Created title {}", SEED_TITLE_NUMBER);
    Ok(())
}
