use chrono::NaiveDateTime;

use crate::model::{NewAddress, NewCharge, NewOwner, NewRestriction, OwnerRecord, RestrictionRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum OwnerChange {
    /// Point the title at an owner that already exists. That owner's stored
    /// fields are left alone.
    Relink { identity: String },
    /// Create a new owner with its own new address and point the title at it.
    Create { owner: NewOwner, address: NewAddress },
    /// Same owner as before. Overwrite its fields and its address in place.
    UpdateInPlace(OwnerRecord),
}

/// The complete set of writes one title update needs. A store applies it as
/// a single atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleChangeSet {
    pub title_number: String,
    /// The title's `updated_at` when this was planned. A store refuses the
    /// change set once the title has moved on.
    pub based_on: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
    pub owner: OwnerChange,
    pub restrictions_added: Vec<NewRestriction>,
    /// Removed along with the charge each one owns.
    pub restrictions_removed: Vec<RestrictionRecord>,
    pub charges_added: Vec<NewCharge>,
    pub charges_removed: Vec<i64>,
}

impl TitleChangeSet {
    /// True when neither nested collection is touched.
    pub fn collections_unchanged(&self) -> bool {
        self.restrictions_added.is_empty()
            && self.restrictions_removed.is_empty()
            && self.charges_added.is_empty()
            && self.charges_removed.is_empty()
    }
}
