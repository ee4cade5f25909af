use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Row};

use crate::error::{StaleTitle, UniqueViolation};
use crate::model::{
    Address, Charge, Conveyancer, NewAddress, NewCharge, NewConveyancer, NewOwner, NewRestriction,
    NewTitle, Owner, OwnerChange, OwnerRecord, PriceHistory, Restriction, RestrictionRecord, Title,
    TitleChangeSet, TitleOwner, TitleRecord,
};
use crate::store::traits::{ConveyancerStore, OwnerFilter, OwnerStore, TitleFilter, TitleStore};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Keep uniqueness violations recognisable behind the anyhow boundary.
fn write_error(err: sqlx::Error, what: &'static str) -> anyhow::Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or(what).to_string();
            return anyhow::Error::new(UniqueViolation(constraint)).context(what);
        }
    }
    anyhow::Error::new(err).context(what)
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    async fn load_address(&self, address_id: i64) -> Result<Address> {
        let row = sqlx::query(
            "SELECT address_id, house_name_or_number, street_name, city, county, country, postcode \
             FROM address WHERE address_id = $1",
        )
        .bind(address_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch address")?;

        Ok(Address {
            address_id: row.get("address_id"),
            house_name_or_number: row.get("house_name_or_number"),
            street_name: row.get("street_name"),
            city: row.get("city"),
            county: row.get("county"),
            country: row.get("country"),
            postcode: row.get("postcode"),
        })
    }

    async fn load_owner(&self, column: &'static str, value: &str) -> Result<Option<OwnerRecord>> {
        let sql = format!(
            "SELECT identity, forename, surname, email, phone, owner_type, address_id FROM owner WHERE {} = $1",
            column
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch owner")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let owner = Owner {
            identity: row.get("identity"),
            forename: row.get("forename"),
            surname: row.get("surname"),
            email: row.get("email"),
            phone: row.get("phone"),
            owner_type: row.get("owner_type"),
            address_id: row.get("address_id"),
        };
        let address = self.load_address(owner.address_id).await?;

        Ok(Some(OwnerRecord { owner, address }))
    }

    async fn load_title(&self, title_number: &str) -> Result<Option<TitleRecord>> {
        let row = sqlx::query(
            "SELECT title_number, created_at, updated_at, lock, owner_identity, address_id \
             FROM title WHERE title_number = $1",
        )
        .bind(title_number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch title")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let title = Title {
            title_number: row.get("title_number"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            lock: row.get("lock"),
            owner_identity: row.get("owner_identity"),
            address_id: row.get("address_id"),
        };

        let owner = self
            .load_owner("identity", &title.owner_identity)
            .await?
            .ok_or_else(|| anyhow!("Owner {} missing for title {}", title.owner_identity, title_number))?;
        let address = self.load_address(title.address_id).await?;

        let price_history = sqlx::query(
            "SELECT title_number, date, price_amount, price_currency FROM price_history \
             WHERE title_number = $1 ORDER BY date",
        )
        .bind(title_number)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch price history")?
        .into_iter()
        .map(|row| PriceHistory {
            title_number: row.get("title_number"),
            date: row.get("date"),
            price_amount: row.get("price_amount"),
            price_currency: row.get("price_currency"),
        })
        .collect();

        let charges: Vec<Charge> = sqlx::query(
            "SELECT charge_id, charge_date, charge_lender, charge_amount, charge_currency_type, title_number \
             FROM charge WHERE title_number = $1 ORDER BY charge_id",
        )
        .bind(title_number)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch charges")?
        .into_iter()
        .map(|row| Charge {
            charge_id: row.get("charge_id"),
            charge_date: row.get("charge_date"),
            charge_lender: row.get("charge_lender"),
            charge_amount: row.get("charge_amount"),
            charge_currency_type: row.get("charge_currency_type"),
            title_number: row.get("title_number"),
        })
        .collect();

        let restrictions = sqlx::query(
            "SELECT restriction_id, restriction_code, restriction_type, restriction_text, consenting_party, \
             restriction_date, title_number, charge_id FROM restriction WHERE title_number = $1 ORDER BY restriction_id",
        )
        .bind(title_number)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch restrictions")?
        .into_iter()
        .map(|row| {
            let restriction = Restriction {
                restriction_id: row.get("restriction_id"),
                restriction_code: row.get("restriction_code"),
                restriction_type: row.get("restriction_type"),
                restriction_text: row.get("restriction_text"),
                consenting_party: row.get("consenting_party"),
                restriction_date: row.get("restriction_date"),
                title_number: row.get("title_number"),
                charge_id: row.get("charge_id"),
            };
            let charge = restriction
                .charge_id
                .and_then(|id| charges.iter().find(|c| c.charge_id == id).cloned());
            RestrictionRecord { restriction, charge }
        })
        .collect();

        Ok(Some(TitleRecord {
            title,
            owner,
            address,
            price_history,
            restrictions,
            charges,
        }))
    }
}

async fn insert_address(conn: &mut PgConnection, address: &NewAddress) -> Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO address (house_name_or_number, street_name, city, county, country, postcode) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING address_id",
    )
    .bind(&address.house_name_or_number)
    .bind(&address.street_name)
    .bind(&address.city)
    .bind(&address.county)
    .bind(&address.country)
    .bind(&address.postcode)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to insert address"))
}

async fn insert_owner(conn: &mut PgConnection, owner: &NewOwner, address: &NewAddress) -> Result<String> {
    let address_id = insert_address(conn, address).await?;
    sqlx::query(
        "INSERT INTO owner (identity, forename, surname, email, phone, owner_type, address_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&owner.identity)
    .bind(&owner.forename)
    .bind(&owner.surname)
    .bind(&owner.email)
    .bind(&owner.phone)
    .bind(&owner.owner_type)
    .bind(address_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to insert owner"))?;

    Ok(owner.identity.clone())
}

async fn update_owner(conn: &mut PgConnection, record: &OwnerRecord) -> Result<()> {
    let address = &record.address;
    sqlx::query(
        "UPDATE address SET house_name_or_number = $2, street_name = $3, city = $4, county = $5, \
         country = $6, postcode = $7 WHERE address_id = $1",
    )
    .bind(address.address_id)
    .bind(&address.house_name_or_number)
    .bind(&address.street_name)
    .bind(&address.city)
    .bind(&address.county)
    .bind(&address.country)
    .bind(&address.postcode)
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to update address"))?;

    let owner = &record.owner;
    sqlx::query(
        "UPDATE owner SET forename = $2, surname = $3, email = $4, phone = $5, owner_type = $6, \
         address_id = $7 WHERE identity = $1",
    )
    .bind(&owner.identity)
    .bind(&owner.forename)
    .bind(&owner.surname)
    .bind(&owner.email)
    .bind(&owner.phone)
    .bind(&owner.owner_type)
    .bind(owner.address_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to update owner"))?;

    Ok(())
}

async fn insert_charge(conn: &mut PgConnection, charge: &NewCharge) -> Result<i64> {
    sqlx::query_scalar(
        "INSERT INTO charge (charge_date, charge_lender, charge_amount, charge_currency_type, title_number) \
         VALUES ($1, $2, $3, $4, $5) RETURNING charge_id",
    )
    .bind(charge.charge_date)
    .bind(&charge.charge_lender)
    .bind(charge.charge_amount)
    .bind(&charge.charge_currency_type)
    .bind(&charge.title_number)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to insert charge"))
}

async fn insert_restriction(conn: &mut PgConnection, restriction: &NewRestriction) -> Result<()> {
    let charge_id = match &restriction.charge {
        Some(charge) => Some(insert_charge(conn, charge).await?),
        None => None,
    };

    sqlx::query(
        "INSERT INTO restriction (restriction_code, restriction_type, restriction_text, consenting_party, \
         restriction_date, title_number, charge_id) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&restriction.restriction_code)
    .bind(&restriction.restriction_type)
    .bind(&restriction.restriction_text)
    .bind(&restriction.consenting_party)
    .bind(restriction.restriction_date)
    .bind(&restriction.title_number)
    .bind(charge_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| write_error(e, "Failed to insert restriction"))?;

    Ok(())
}

async fn delete_charge(conn: &mut PgConnection, charge_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM charge WHERE charge_id = $1")
        .bind(charge_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "Failed to delete charge"))?;

    if result.rows_affected() == 0 {
        return Err(anyhow!("Charge {} not found", charge_id));
    }
    Ok(())
}

async fn delete_restriction(conn: &mut PgConnection, record: &RestrictionRecord) -> Result<()> {
    // The restriction references its charge, so it has to go first.
    let result = sqlx::query("DELETE FROM restriction WHERE restriction_id = $1")
        .bind(record.restriction.restriction_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, "Failed to delete restriction"))?;

    if result.rows_affected() == 0 {
        return Err(anyhow!("Restriction {} not found", record.restriction.restriction_id));
    }

    if let Some(charge) = &record.charge {
        delete_charge(conn, charge.charge_id).await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl TitleStore for PostgresStore {
    async fn get_title(&self, title_number: &str) -> Result<Option<TitleRecord>> {
        self.load_title(title_number).await
    }

    async fn find_titles(&self, filter: &TitleFilter) -> Result<Vec<TitleRecord>> {
        let (email, identity) = match &filter.owner {
            OwnerFilter::Email(email) => (Some(email.to_lowercase()), None),
            OwnerFilter::Identity(identity) => (None, Some(identity.clone())),
        };
        let (house, postcode) = match &filter.address {
            Some(address) => (Some(address.house_name_number.clone()), Some(address.postcode.clone())),
            None => (None, None),
        };

        let title_numbers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.title_number
            FROM title t
            JOIN owner o ON o.identity = t.owner_identity
            JOIN address a ON a.address_id = t.address_id
            WHERE ($1::text IS NULL OR o.email = $1)
              AND ($2::text IS NULL OR o.identity = $2)
              AND ($3::text IS NULL OR a.house_name_or_number = $3)
              AND ($4::text IS NULL OR a.postcode = $4)
            ORDER BY t.title_number
            "#,
        )
        .bind(email)
        .bind(identity)
        .bind(house)
        .bind(postcode)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search titles")?;

        let mut titles = Vec::with_capacity(title_numbers.len());
        for title_number in title_numbers {
            if let Some(record) = self.load_title(&title_number).await? {
                titles.push(record);
            }
        }
        Ok(titles)
    }

    async fn apply_title_changes(&self, changes: TitleChangeSet) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Holds the title row until commit, so concurrent updates queue here.
        let row = sqlx::query("SELECT updated_at FROM title WHERE title_number = $1 FOR UPDATE")
            .bind(&changes.title_number)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock title")?
            .ok_or_else(|| anyhow!("Title {} not found", changes.title_number))?;
        let updated_at: Option<NaiveDateTime> = row.get("updated_at");
        if updated_at != changes.based_on {
            return Err(StaleTitle(changes.title_number.clone()).into());
        }

        let owner_identity = match &changes.owner {
            OwnerChange::Relink { identity } => identity.clone(),
            OwnerChange::Create { owner, address } => insert_owner(&mut tx, owner, address).await?,
            OwnerChange::UpdateInPlace(record) => {
                update_owner(&mut tx, record).await?;
                record.owner.identity.clone()
            }
        };

        for record in &changes.restrictions_removed {
            delete_restriction(&mut tx, record).await?;
        }
        for charge_id in &changes.charges_removed {
            delete_charge(&mut tx, *charge_id).await?;
        }
        for restriction in &changes.restrictions_added {
            insert_restriction(&mut tx, restriction).await?;
        }
        for charge in &changes.charges_added {
            insert_charge(&mut tx, charge).await?;
        }

        sqlx::query("UPDATE title SET owner_identity = $2, updated_at = $3 WHERE title_number = $1")
            .bind(&changes.title_number)
            .bind(&owner_identity)
            .bind(changes.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, "Failed to update title"))?;

        tx.commit()
            .await
            .map_err(|e| write_error(e, "Failed to commit title changes"))?;
        Ok(())
    }

    async fn set_title_lock(&self, title_number: &str, lock: Option<NaiveDateTime>) -> Result<()> {
        let result = sqlx::query("UPDATE title SET lock = $2 WHERE title_number = $1")
            .bind(title_number)
            .bind(lock)
            .execute(&self.pool)
            .await
            .context("Failed to update title lock")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Title {} not found", title_number));
        }
        Ok(())
    }

    async fn create_title(&self, title: NewTitle) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let owner_identity = match &title.owner {
            TitleOwner::Existing(identity) => identity.clone(),
            TitleOwner::New { owner, address } => insert_owner(&mut tx, owner, address).await?,
        };
        let address_id = insert_address(&mut tx, &title.address).await?;

        sqlx::query(
            "INSERT INTO title (title_number, created_at, owner_identity, address_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(&title.title_number)
        .bind(title.created_at)
        .bind(&owner_identity)
        .bind(address_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Failed to insert title"))?;

        for entry in &title.price_history {
            sqlx::query(
                "INSERT INTO price_history (title_number, date, price_amount, price_currency) VALUES ($1, $2, $3, $4)",
            )
            .bind(&entry.title_number)
            .bind(entry.date)
            .bind(entry.price_amount)
            .bind(&entry.price_currency)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, "Failed to insert price history"))?;
        }
        for restriction in &title.restrictions {
            insert_restriction(&mut tx, restriction).await?;
        }
        for charge in &title.charges {
            insert_charge(&mut tx, charge).await?;
        }

        tx.commit()
            .await
            .map_err(|e| write_error(e, "Failed to commit new title"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OwnerStore for PostgresStore {
    async fn get_owner(&self, identity: &str) -> Result<Option<OwnerRecord>> {
        self.load_owner("identity", identity).await
    }

    async fn find_owner_by_email(&self, email: &str) -> Result<Option<OwnerRecord>> {
        self.load_owner("email", &email.to_lowercase()).await
    }
}

#[async_trait::async_trait]
impl ConveyancerStore for PostgresStore {
    async fn list_conveyancers(&self) -> Result<Vec<Conveyancer>> {
        let rows = sqlx::query(
            "SELECT conveyancer_id, x500_name, company_name FROM conveyancer ORDER BY conveyancer_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conveyancers")?;

        Ok(rows
            .into_iter()
            .map(|row| Conveyancer {
                conveyancer_id: row.get("conveyancer_id"),
                x500_name: row.get("x500_name"),
                company_name: row.get("company_name"),
            })
            .collect())
    }

    async fn get_conveyancer(&self, conveyancer_id: i64) -> Result<Option<Conveyancer>> {
        let row = sqlx::query(
            "SELECT conveyancer_id, x500_name, company_name FROM conveyancer WHERE conveyancer_id = $1",
        )
        .bind(conveyancer_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch conveyancer")?;

        Ok(row.map(|row| Conveyancer {
            conveyancer_id: row.get("conveyancer_id"),
            x500_name: row.get("x500_name"),
            company_name: row.get("company_name"),
        }))
    }

    async fn create_conveyancer(&self, conveyancer: NewConveyancer) -> Result<Conveyancer> {
        let conveyancer_id: i64 = sqlx::query_scalar(
            "INSERT INTO conveyancer (x500_name, company_name) VALUES ($1, $2) RETURNING conveyancer_id",
        )
        .bind(&conveyancer.x500_name)
        .bind(&conveyancer.company_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to insert conveyancer"))?;

        Ok(conveyancer.with_id(conveyancer_id))
    }
}
