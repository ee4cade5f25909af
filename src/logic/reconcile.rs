use anyhow::anyhow;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::{ServiceError, TITLE_NOT_FOUND};
use crate::logic::RequestValidator;
use crate::model::{
    ChargeRequest, NewAddress, NewCharge, NewOwner, NewRestriction, OwnerChange, OwnerRecord,
    OwnerRequest, RestrictionRecord, RestrictionRequest, TitleChangeSet, TitleRecord, TitleRequest,
    TitleView,
};
use crate::store::traits::Store;

/// Outcome of diffing one nested collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDiff<C, D> {
    pub kept: usize,
    pub added: Vec<D>,
    pub removed: Vec<C>,
}

/// Content-addressed diff of a collection. Every desired entry is compared
/// with the full current collection: one whose view equals any current view
/// is kept, otherwise it is added. Current entries whose view equals no
/// desired view are removed. Row ids play no part in matching.
pub fn diff_by_content<C, D, V: PartialEq>(current: Vec<(C, V)>, desired: Vec<(D, V)>) -> CollectionDiff<C, D> {
    let mut to_delete = vec![true; current.len()];
    let mut added = Vec::new();
    let mut kept = 0;

    for (entry, view) in desired {
        let mut matched = false;
        for (index, (_, current_view)) in current.iter().enumerate() {
            if *current_view == view {
                to_delete[index] = false;
                matched = true;
            }
        }
        if matched {
            kept += 1;
        } else {
            added.push(entry);
        }
    }

    CollectionDiff {
        kept,
        added,
        removed: current
            .into_iter()
            .zip(to_delete)
            .filter_map(|((entry, _), delete)| delete.then_some(entry))
            .collect(),
    }
}

/// Render a loaded title. Stored identities were validated on the way in, so
/// failing here means the stored data itself is broken.
pub fn render(record: &TitleRecord) -> Result<TitleView, ServiceError> {
    record.view().map_err(|e| {
        ServiceError::Internal(anyhow!(
            "Stored identity on title {} is invalid: {}",
            record.title.title_number,
            e
        ))
    })
}

fn stored_view_error(e: crate::model::X500Error) -> ServiceError {
    ServiceError::Internal(anyhow!("Stored identity is invalid: {}", e))
}

async fn load_title<S: Store>(store: &S, title_number: &str) -> Result<TitleRecord, ServiceError> {
    store
        .get_title(title_number)
        .await
        .map_err(ServiceError::from_store)?
        .ok_or_else(|| ServiceError::not_found(TITLE_NOT_FOUND, "E404"))
}

/// Applies desired-state updates to titles and manages their edit locks.
pub struct TitleReconciler;

impl TitleReconciler {
    /// Validate the payload, diff it against the stored title and commit the
    /// resulting writes in one unit.
    pub async fn update<S: Store>(
        store: &S,
        validator: &RequestValidator,
        title_number: &str,
        payload: &Value,
        now: NaiveDateTime,
    ) -> Result<TitleView, ServiceError> {
        validator.validate(payload)?;
        let request: TitleRequest = serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::ValidationFailed(e.to_string()))?;

        let record = load_title(store, title_number).await?;
        if record.title.title_number != title_number {
            return Err(ServiceError::Mismatch);
        }
        if let Err(e) = record.title.ensure_mutable(now) {
            warn!("Rejected update of locked title {}", title_number);
            return Err(e.into());
        }

        let existing_owner = if request.owner.identity != record.owner.owner.identity {
            store
                .get_owner(&request.owner.identity)
                .await
                .map_err(ServiceError::from_store)?
        } else {
            None
        };

        let changes = Self::plan(&record, &request, existing_owner, now)?;
        info!(
            "Title {}: +{} -{} restrictions, +{} -{} charges",
            title_number,
            changes.restrictions_added.len(),
            changes.restrictions_removed.len(),
            changes.charges_added.len(),
            changes.charges_removed.len()
        );

        store
            .apply_title_changes(changes)
            .await
            .map_err(ServiceError::from_store)?;

        let updated = load_title(store, title_number).await?;
        render(&updated)
    }

    /// Work out every write an update needs without touching the store.
    /// `existing_owner` is the stored owner matching the requested identity
    /// when that identity differs from the current owner's.
    pub fn plan(
        record: &TitleRecord,
        request: &TitleRequest,
        existing_owner: Option<OwnerRecord>,
        now: NaiveDateTime,
    ) -> Result<TitleChangeSet, ServiceError> {
        let (restrictions_added, restrictions_removed) = match &request.restrictions {
            Some(desired) => {
                let diff = Self::reconcile_restrictions(record, desired)?;
                (diff.added, diff.removed)
            }
            None => (Vec::new(), Vec::new()),
        };

        let (charges_added, charges_removed) = match &request.charges {
            Some(desired) => {
                let diff = Self::reconcile_charges(record, desired)?;
                (diff.added, diff.removed)
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(TitleChangeSet {
            title_number: record.title.title_number.clone(),
            based_on: record.title.updated_at,
            updated_at: now,
            owner: Self::resolve_owner(&record.owner, &request.owner, existing_owner),
            restrictions_added,
            restrictions_removed,
            charges_added,
            charges_removed,
        })
    }

    pub fn reconcile_restrictions(
        record: &TitleRecord,
        desired: &[RestrictionRequest],
    ) -> Result<CollectionDiff<RestrictionRecord, NewRestriction>, ServiceError> {
        let title_number = &record.title.title_number;

        let current = record
            .restrictions
            .iter()
            .map(|r| Ok::<_, ServiceError>((r.clone(), r.view().map_err(stored_view_error)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let desired = desired
            .iter()
            .map(|request| {
                let restriction = NewRestriction::from_request(request, title_number)?;
                let view = restriction.view()?;
                Ok::<_, ServiceError>((restriction, view))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let diff = diff_by_content(current, desired);
        for removed in &diff.removed {
            debug!(
                "Title {}: removing restriction {} ({})",
                title_number, removed.restriction.restriction_id, removed.restriction.restriction_code
            );
        }
        for added in &diff.added {
            debug!("Title {}: adding restriction {}", title_number, added.restriction_code);
        }
        Ok(diff)
    }

    /// Only charges not owned by a restriction take part; restriction
    /// charges travel with their restriction.
    pub fn reconcile_charges(
        record: &TitleRecord,
        desired: &[ChargeRequest],
    ) -> Result<CollectionDiff<i64, NewCharge>, ServiceError> {
        let title_number = &record.title.title_number;

        let current = record
            .standalone_charges()
            .map(|c| Ok::<_, ServiceError>((c.charge_id, c.view().map_err(stored_view_error)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let desired = desired
            .iter()
            .map(|request| {
                let charge = NewCharge::from_request(request, title_number)?;
                let view = charge.view()?;
                Ok::<_, ServiceError>((charge, view))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let diff = diff_by_content(current, desired);
        for charge_id in &diff.removed {
            debug!("Title {}: removing charge {}", title_number, charge_id);
        }
        Ok(diff)
    }

    /// A different identity either re-points the title at the stored owner
    /// (leaving that owner untouched) or creates a new owner. The same
    /// identity overwrites the current owner and its address in place; the
    /// identity itself never changes on that path.
    pub fn resolve_owner(
        current: &OwnerRecord,
        request: &OwnerRequest,
        existing: Option<OwnerRecord>,
    ) -> OwnerChange {
        if request.identity == current.owner.identity {
            let mut updated = current.clone();
            updated.owner.apply(request);
            updated.address.apply(&request.address);
            return OwnerChange::UpdateInPlace(updated);
        }

        match existing {
            Some(owner) => {
                info!("Re-pointing title to existing owner {}", owner.owner.identity);
                OwnerChange::Relink {
                    identity: owner.owner.identity,
                }
            }
            None => {
                info!("Creating new owner {}", request.identity);
                OwnerChange::Create {
                    owner: NewOwner::from(request),
                    address: NewAddress::from(&request.address),
                }
            }
        }
    }

    pub async fn lock<S: Store>(store: &S, title_number: &str, now: NaiveDateTime) -> Result<TitleView, ServiceError> {
        let mut record = load_title(store, title_number).await?;
        let until = record.title.lock(now).map_err(|e| {
            warn!("Lock of title {} rejected: {}", title_number, e);
            ServiceError::from(e)
        })?;

        store
            .set_title_lock(title_number, Some(until))
            .await
            .map_err(ServiceError::from_store)?;
        render(&record)
    }

    pub async fn unlock<S: Store>(store: &S, title_number: &str) -> Result<TitleView, ServiceError> {
        let mut record = load_title(store, title_number).await?;
        record.title.unlock().map_err(|e| {
            warn!("Unlock of title {} rejected: {}", title_number, e);
            ServiceError::from(e)
        })?;

        store
            .set_title_lock(title_number, None)
            .await
            .map_err(ServiceError::from_store)?;
        render(&record)
    }
}
