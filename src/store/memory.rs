use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

use crate::error::{StaleTitle, UniqueViolation};
use crate::model::{
    Address, Charge, Conveyancer, NewAddress, NewCharge, NewConveyancer, NewRestriction, NewTitle,
    Owner, OwnerChange, OwnerRecord, PriceHistory, Restriction, RestrictionRecord, Title,
    TitleChangeSet, TitleOwner, TitleRecord,
};
use crate::store::traits::{ConveyancerStore, OwnerFilter, OwnerStore, TitleFilter, TitleStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    titles: BTreeMap<String, Title>,
    owners: BTreeMap<String, Owner>,
    addresses: BTreeMap<i64, Address>,
    restrictions: BTreeMap<i64, Restriction>,
    charges: BTreeMap<i64, Charge>,
    conveyancers: BTreeMap<i64, Conveyancer>,
    price_history: BTreeMap<(String, NaiveDateTime), PriceHistory>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn owner_record(&self, identity: &str) -> Result<Option<OwnerRecord>> {
        let Some(owner) = self.owners.get(identity) else {
            return Ok(None);
        };
        let address = self
            .addresses
            .get(&owner.address_id)
            .cloned()
            .ok_or_else(|| anyhow!("Address {} missing for owner {}", owner.address_id, identity))?;
        Ok(Some(OwnerRecord {
            owner: owner.clone(),
            address,
        }))
    }

    fn title_record(&self, title_number: &str) -> Result<Option<TitleRecord>> {
        let Some(title) = self.titles.get(title_number) else {
            return Ok(None);
        };

        let owner = self
            .owner_record(&title.owner_identity)?
            .ok_or_else(|| anyhow!("Owner {} missing for title {}", title.owner_identity, title_number))?;
        let address = self
            .addresses
            .get(&title.address_id)
            .cloned()
            .ok_or_else(|| anyhow!("Address {} missing for title {}", title.address_id, title_number))?;

        let charges: Vec<Charge> = self
            .charges
            .values()
            .filter(|c| c.title_number == title.title_number)
            .cloned()
            .collect();

        let restrictions = self
            .restrictions
            .values()
            .filter(|r| r.title_number == title.title_number)
            .map(|r| RestrictionRecord {
                restriction: r.clone(),
                charge: r
                    .charge_id
                    .and_then(|id| charges.iter().find(|c| c.charge_id == id).cloned()),
            })
            .collect();

        let price_history = self
            .price_history
            .values()
            .filter(|p| p.title_number == title.title_number)
            .cloned()
            .collect();

        Ok(Some(TitleRecord {
            title: title.clone(),
            owner,
            address,
            price_history,
            restrictions,
            charges,
        }))
    }

    fn insert_address(&mut self, address: NewAddress) -> i64 {
        let id = self.next_id();
        self.addresses.insert(id, address.with_id(id));
        id
    }

    fn insert_owner(&mut self, owner: Owner) -> Result<()> {
        if self.owners.contains_key(&owner.identity) {
            return Err(UniqueViolation(format!("owner identity {}", owner.identity)).into());
        }
        self.owners.insert(owner.identity.clone(), owner);
        Ok(())
    }

    fn insert_charge(&mut self, charge: NewCharge) -> i64 {
        let id = self.next_id();
        self.charges.insert(id, charge.with_id(id));
        id
    }

    fn insert_restriction(&mut self, restriction: NewRestriction) {
        let NewRestriction {
            restriction_code,
            restriction_type,
            restriction_text,
            consenting_party,
            restriction_date,
            title_number,
            charge,
        } = restriction;

        let charge_id = charge.map(|charge| self.insert_charge(charge));
        let id = self.next_id();
        self.restrictions.insert(
            id,
            Restriction {
                restriction_id: id,
                restriction_code,
                restriction_type,
                restriction_text,
                consenting_party,
                restriction_date,
                title_number,
                charge_id,
            },
        );
    }

    fn remove_restriction(&mut self, record: &RestrictionRecord) -> Result<()> {
        if let Some(charge) = &record.charge {
            self.charges
                .remove(&charge.charge_id)
                .ok_or_else(|| anyhow!("Charge {} not found", charge.charge_id))?;
        }
        self.restrictions
            .remove(&record.restriction.restriction_id)
            .ok_or_else(|| anyhow!("Restriction {} not found", record.restriction.restriction_id))?;
        Ok(())
    }

    fn check_unique_emails(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for owner in self.owners.values() {
            if !seen.insert(owner.email.as_str()) {
                return Err(UniqueViolation(format!("owner email {}", owner.email)).into());
            }
        }
        Ok(())
    }

    fn apply(&mut self, changes: TitleChangeSet) -> Result<()> {
        let title_number = changes.title_number.clone();
        match self.titles.get(&title_number) {
            None => return Err(anyhow!("Title {} not found", title_number)),
            Some(title) if title.updated_at != changes.based_on => {
                return Err(StaleTitle(title_number).into());
            }
            Some(_) => {}
        }

        let owner_identity = match changes.owner {
            OwnerChange::Relink { identity } => {
                if !self.owners.contains_key(&identity) {
                    return Err(anyhow!("Owner {} not found", identity));
                }
                identity
            }
            OwnerChange::Create { owner, address } => {
                let address_id = self.insert_address(address);
                let owner = owner.with_address_id(address_id);
                let identity = owner.identity.clone();
                self.insert_owner(owner)?;
                identity
            }
            OwnerChange::UpdateInPlace(record) => {
                let identity = record.owner.identity.clone();
                self.addresses.insert(record.address.address_id, record.address);
                self.owners.insert(identity.clone(), record.owner);
                identity
            }
        };

        for record in &changes.restrictions_removed {
            self.remove_restriction(record)?;
        }
        for charge_id in &changes.charges_removed {
            self.charges
                .remove(charge_id)
                .ok_or_else(|| anyhow!("Charge {} not found", charge_id))?;
        }
        for restriction in changes.restrictions_added {
            self.insert_restriction(restriction);
        }
        for charge in changes.charges_added {
            self.insert_charge(charge);
        }

        if let Some(title) = self.titles.get_mut(&title_number) {
            title.owner_identity = owner_identity;
            title.updated_at = Some(changes.updated_at);
        }

        self.check_unique_emails()
    }

    fn create(&mut self, new_title: NewTitle) -> Result<()> {
        if self.titles.contains_key(&new_title.title_number) {
            return Err(UniqueViolation(format!("title {}", new_title.title_number)).into());
        }

        let owner_identity = match new_title.owner {
            TitleOwner::Existing(identity) => {
                if !self.owners.contains_key(&identity) {
                    return Err(anyhow!("Owner {} not found", identity));
                }
                identity
            }
            TitleOwner::New { owner, address } => {
                let address_id = self.insert_address(address);
                let owner = owner.with_address_id(address_id);
                let identity = owner.identity.clone();
                self.insert_owner(owner)?;
                identity
            }
        };

        let address_id = self.insert_address(new_title.address);
        self.titles.insert(
            new_title.title_number.clone(),
            Title {
                title_number: new_title.title_number,
                created_at: new_title.created_at,
                updated_at: None,
                lock: None,
                owner_identity,
                address_id,
            },
        );

        for entry in new_title.price_history {
            self.price_history
                .insert((entry.title_number.clone(), entry.date), entry);
        }
        for restriction in new_title.restrictions {
            self.insert_restriction(restriction);
        }
        for charge in new_title.charges {
            self.insert_charge(charge);
        }

        self.check_unique_emails()
    }
}

/// In-process store with the same all-or-nothing write behaviour as the
/// Postgres store. Every write works on a copy of the tables which only
/// replaces the live copy once the whole operation has succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transact<T>(&self, op: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut live = self.tables.write();
        let mut working = live.clone();
        let value = op(&mut working)?;
        *live = working;
        Ok(value)
    }

    /// Row counts, in the order restrictions, charges, owners, addresses.
    pub fn row_counts(&self) -> (usize, usize, usize, usize) {
        let tables = self.tables.read();
        (
            tables.restrictions.len(),
            tables.charges.len(),
            tables.owners.len(),
            tables.addresses.len(),
        )
    }
}

#[async_trait::async_trait]
impl TitleStore for MemoryStore {
    async fn get_title(&self, title_number: &str) -> Result<Option<TitleRecord>> {
        self.tables.read().title_record(title_number)
    }

    async fn find_titles(&self, filter: &TitleFilter) -> Result<Vec<TitleRecord>> {
        let tables = self.tables.read();

        let owner_identity = match &filter.owner {
            OwnerFilter::Identity(identity) => Some(identity.clone()),
            OwnerFilter::Email(email) => {
                let email = email.to_lowercase();
                tables
                    .owners
                    .values()
                    .find(|o| o.email == email)
                    .map(|o| o.identity.clone())
            }
        };
        let Some(owner_identity) = owner_identity else {
            return Ok(Vec::new());
        };

        tables
            .titles
            .values()
            .filter(|t| t.owner_identity == owner_identity)
            .filter(|t| match &filter.address {
                None => true,
                Some(wanted) => tables.addresses.get(&t.address_id).is_some_and(|a| {
                    a.house_name_or_number == wanted.house_name_number && a.postcode == wanted.postcode
                }),
            })
            .filter_map(|t| tables.title_record(&t.title_number).transpose())
            .collect()
    }

    async fn apply_title_changes(&self, changes: TitleChangeSet) -> Result<()> {
        self.transact(|tables| tables.apply(changes))
            .context("Failed to apply title changes")
    }

    async fn set_title_lock(&self, title_number: &str, lock: Option<NaiveDateTime>) -> Result<()> {
        self.transact(|tables| {
            let title = tables
                .titles
                .get_mut(title_number)
                .ok_or_else(|| anyhow!("Title {} not found", title_number))?;
            title.lock = lock;
            Ok(())
        })
    }

    async fn create_title(&self, title: NewTitle) -> Result<()> {
        self.transact(|tables| tables.create(title))
            .context("Failed to create title")
    }
}

#[async_trait::async_trait]
impl OwnerStore for MemoryStore {
    async fn get_owner(&self, identity: &str) -> Result<Option<OwnerRecord>> {
        self.tables.read().owner_record(identity)
    }

    async fn find_owner_by_email(&self, email: &str) -> Result<Option<OwnerRecord>> {
        let tables = self.tables.read();
        let email = email.to_lowercase();
        match tables.owners.values().find(|o| o.email == email) {
            Some(owner) => tables.owner_record(&owner.identity),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl ConveyancerStore for MemoryStore {
    async fn list_conveyancers(&self) -> Result<Vec<Conveyancer>> {
        Ok(self.tables.read().conveyancers.values().cloned().collect())
    }

    async fn get_conveyancer(&self, conveyancer_id: i64) -> Result<Option<Conveyancer>> {
        Ok(self.tables.read().conveyancers.get(&conveyancer_id).cloned())
    }

    async fn create_conveyancer(&self, conveyancer: NewConveyancer) -> Result<Conveyancer> {
        self.transact(|tables| {
            if tables
                .conveyancers
                .values()
                .any(|c| c.x500_name == conveyancer.x500_name)
            {
                return Err(UniqueViolation(format!("conveyancer {}", conveyancer.x500_name)).into());
            }
            let id = tables.next_id();
            let conveyancer = conveyancer.with_id(id);
            tables.conveyancers.insert(id, conveyancer.clone());
            Ok(conveyancer)
        })
    }
}
