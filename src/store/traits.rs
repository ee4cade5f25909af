use anyhow::Result;
use chrono::NaiveDateTime;

use crate::model::{Conveyancer, NewConveyancer, NewTitle, OwnerRecord, TitleChangeSet, TitleRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Matched against the stored, lower-cased email.
    Email(String),
    Identity(String),
}

/// Title search. The address part narrows on the title's own address and
/// needs both values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFilter {
    pub owner: OwnerFilter,
    pub address: Option<AddressFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFilter {
    pub house_name_number: String,
    pub postcode: String,
}

#[async_trait::async_trait]
pub trait TitleStore: Send + Sync {
    async fn get_title(&self, title_number: &str) -> Result<Option<TitleRecord>>;
    async fn find_titles(&self, filter: &TitleFilter) -> Result<Vec<TitleRecord>>;
    /// Apply every write in the change set or none of them. A broken
    /// uniqueness constraint surfaces as [`crate::error::UniqueViolation`].
    async fn apply_title_changes(&self, changes: TitleChangeSet) -> Result<()>;
    async fn set_title_lock(&self, title_number: &str, lock: Option<NaiveDateTime>) -> Result<()>;
    /// Provision a title with its owner, address and nested collections.
    async fn create_title(&self, title: NewTitle) -> Result<()>;
}

#[async_trait::async_trait]
pub trait OwnerStore: Send + Sync {
    async fn get_owner(&self, identity: &str) -> Result<Option<OwnerRecord>>;
    async fn find_owner_by_email(&self, email: &str) -> Result<Option<OwnerRecord>>;
}

#[async_trait::async_trait]
pub trait ConveyancerStore: Send + Sync {
    async fn list_conveyancers(&self) -> Result<Vec<Conveyancer>>;
    async fn get_conveyancer(&self, conveyancer_id: i64) -> Result<Option<Conveyancer>>;
    async fn create_conveyancer(&self, conveyancer: NewConveyancer) -> Result<Conveyancer>;
}

pub trait Store: TitleStore + OwnerStore + ConveyancerStore + Send + Sync {}
impl<T: TitleStore + OwnerStore + ConveyancerStore + Send + Sync> Store for T {}
