use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::timestamp::{display_format, iso_format};
use crate::model::{
    Address, AddressView, Charge, ChargeView, NewAddress, NewCharge, NewOwner, NewRestriction,
    OwnerRecord, OwnerView, PriceHistory, PriceHistoryView, RestrictionRecord, RestrictionView,
    X500Error, X500Fields,
};

/// How long a title stays locked after `lock`.
pub const LOCK_DURATION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("The title is already locked.")]
    AlreadyLocked { until: NaiveDateTime },
    #[error("The title is already unlocked.")]
    NotLocked,
    #[error("Title is locked until {}", display_format(.until))]
    TitleLocked { until: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: NaiveDateTime },
}

/// Title row. The title number is upper-cased on creation and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub title_number: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub lock: Option<NaiveDateTime>,
    pub owner_identity: String,
    pub address_id: i64,
}

impl Title {
    pub fn lock_state(&self) -> LockState {
        match self.lock {
            Some(until) => LockState::Locked { until },
            None => LockState::Unlocked,
        }
    }

    /// Expiry of the lock if it still holds at `now`. An expired lock is
    /// left in place and simply ignored.
    fn active_lock(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self.lock_state() {
            LockState::Locked { until } if until > now => Some(until),
            _ => None,
        }
    }

    pub fn is_locked_at(&self, now: NaiveDateTime) -> bool {
        self.active_lock(now).is_some()
    }

    pub fn ensure_mutable(&self, now: NaiveDateTime) -> Result<(), LockError> {
        match self.active_lock(now) {
            Some(until) => Err(LockError::TitleLocked { until }),
            None => Ok(()),
        }
    }

    pub fn lock(&mut self, now: NaiveDateTime) -> Result<NaiveDateTime, LockError> {
        if let Some(until) = self.active_lock(now) {
            return Err(LockError::AlreadyLocked { until });
        }
        let until = now + Duration::days(LOCK_DURATION_DAYS);
        self.lock = Some(until);
        Ok(until)
    }

    pub fn unlock(&mut self) -> Result<(), LockError> {
        match self.lock_state() {
            LockState::Unlocked => Err(LockError::NotLocked),
            LockState::Locked { .. } => {
                self.lock = None;
                Ok(())
            }
        }
    }
}

/// A title with everything hanging off it, as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRecord {
    pub title: Title,
    pub owner: OwnerRecord,
    pub address: Address,
    pub price_history: Vec<PriceHistory>,
    pub restrictions: Vec<RestrictionRecord>,
    /// Every charge on the title, including those owned by a restriction.
    pub charges: Vec<Charge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleView {
    pub title_number: String,
    pub owner: OwnerView,
    pub address: AddressView,
    pub restrictions: Vec<RestrictionView>,
    pub charges: Vec<ChargeView>,
    pub restriction_consenting_parties: Vec<X500Fields>,
    pub price_history: Vec<PriceHistoryView>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub locked_at: Option<String>,
}

impl TitleRecord {
    /// Charges that are not owned by any restriction.
    pub fn standalone_charges(&self) -> impl Iterator<Item = &Charge> {
        self.charges.iter().filter(move |charge| {
            !self
                .restrictions
                .iter()
                .any(|r| r.restriction.charge_id == Some(charge.charge_id))
        })
    }

    pub fn view(&self) -> Result<TitleView, X500Error> {
        let restrictions = self
            .restrictions
            .iter()
            .map(RestrictionRecord::view)
            .collect::<Result<Vec<_>, _>>()?;
        let charges = self
            .standalone_charges()
            .map(Charge::view)
            .collect::<Result<Vec<_>, _>>()?;
        let restriction_consenting_parties = self
            .restrictions
            .iter()
            .map(RestrictionRecord::consenting_party)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TitleView {
            title_number: self.title.title_number.clone(),
            owner: self.owner.view(),
            address: self.address.view(),
            restrictions,
            charges,
            restriction_consenting_parties,
            price_history: self.price_history.iter().map(PriceHistory::view).collect(),
            created_at: iso_format(&self.title.created_at),
            updated_at: self.title.updated_at.as_ref().map(iso_format),
            locked_at: self.title.lock.as_ref().map(iso_format),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TitleOwner {
    Existing(String),
    New { owner: NewOwner, address: NewAddress },
}

/// Everything needed to provision a title from scratch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTitle {
    pub title_number: String,
    pub created_at: NaiveDateTime,
    pub owner: TitleOwner,
    pub address: NewAddress,
    pub price_history: Vec<PriceHistory>,
    pub restrictions: Vec<NewRestriction>,
    pub charges: Vec<NewCharge>,
}

impl NewTitle {
    pub fn new(title_number: &str, owner: TitleOwner, address: NewAddress, created_at: NaiveDateTime) -> Self {
        Self {
            title_number: title_number.to_uppercase(),
            created_at,
            owner,
            address,
            price_history: Vec::new(),
            restrictions: Vec::new(),
            charges: Vec::new(),
        }
    }
}
