use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ServiceError, CONVEYANCER_NOT_FOUND, TITLE_NOT_FOUND};
use crate::logic::{render, RequestValidator, TitleReconciler};
use crate::model::timestamp;
use crate::model::{ConveyancerView, OwnerView, TitleView};
use crate::store::traits::{AddressFilter, OwnerFilter, Store, TitleFilter};

/// Shared handler state: the store plus the request validator built at
/// start-up.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub validator: Arc<RequestValidator>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            validator: Arc::clone(&self.validator),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(store: Arc<S>, validator: RequestValidator) -> Self {
        Self {
            store,
            validator: Arc::new(validator),
        }
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct TitleQuery {
    pub owner_identity: Option<String>,
    pub owner_email_address: Option<String>,
    pub address_house_name_number: Option<String>,
    pub address_postcode: Option<String>,
}

impl TitleQuery {
    /// `owner_identity` takes precedence when both owner parameters are set.
    pub fn into_filter(self) -> Result<TitleFilter, ServiceError> {
        let owner = match (self.owner_identity, self.owner_email_address) {
            (Some(identity), _) if !identity.is_empty() => OwnerFilter::Identity(identity),
            (_, Some(email)) if !email.is_empty() => OwnerFilter::Email(email.to_lowercase()),
            _ => {
                return Err(ServiceError::ValidationFailed(
                    "'owner_identity' or 'owner_email_address' is required.".to_string(),
                ))
            }
        };

        let address = match (self.address_house_name_number, self.address_postcode) {
            (None, None) => None,
            (Some(house_name_number), Some(postcode)) => Some(AddressFilter {
                house_name_number,
                postcode,
            }),
            _ => {
                return Err(ServiceError::ValidationFailed(
                    "'address_house_name_number' and 'address_postcode' must be given together."
                        .to_string(),
                ))
            }
        };

        Ok(TitleFilter { owner, address })
    }
}

pub async fn get_titles<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<TitleQuery>,
) -> Result<Json<Vec<TitleView>>, ServiceError> {
    info!("Starting get_titles");
    let filter = query.into_filter()?;

    let records = state
        .store
        .find_titles(&filter)
        .await
        .map_err(ServiceError::from_store)?;
    let titles = records.iter().map(render).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(titles))
}

pub async fn get_title<S: Store>(
    State(state): State<AppState<S>>,
    Path(title_number): Path<String>,
) -> Result<Json<TitleView>, ServiceError> {
    info!("Starting get_title for {}", title_number);
    let record = state
        .store
        .get_title(&title_number)
        .await
        .map_err(ServiceError::from_store)?
        .ok_or_else(|| ServiceError::not_found(TITLE_NOT_FOUND, "E002"))?;
    Ok(Json(render(&record)?))
}

/// The body is taken as raw JSON so that schema violations are reported by
/// the validator rather than by the extractor.
pub async fn update_title<S: Store>(
    State(state): State<AppState<S>>,
    Path(title_number): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<TitleView>, ServiceError> {
    info!("Starting update_title for {}", title_number);
    let view = TitleReconciler::update(
        state.store.as_ref(),
        &state.validator,
        &title_number,
        &payload,
        timestamp::now(),
    )
    .await?;
    Ok(Json(view))
}

pub async fn lock_title<S: Store>(
    State(state): State<AppState<S>>,
    Path(title_number): Path<String>,
) -> Result<Json<TitleView>, ServiceError> {
    info!("Starting lock_title for {}", title_number);
    let view = TitleReconciler::lock(state.store.as_ref(), &title_number, timestamp::now()).await?;
    Ok(Json(view))
}

pub async fn unlock_title<S: Store>(
    State(state): State<AppState<S>>,
    Path(title_number): Path<String>,
) -> Result<Json<TitleView>, ServiceError> {
    info!("Starting unlock_title for {}", title_number);
    let view = TitleReconciler::unlock(state.store.as_ref(), &title_number).await?;
    Ok(Json(view))
}

#[derive(Debug, Default, Deserialize)]
pub struct OwnerQuery {
    pub email_address: Option<String>,
}

/// Zero or one owner, as a list.
pub async fn get_owners<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<OwnerView>>, ServiceError> {
    info!("Starting get_owners");
    let email = query
        .email_address
        .filter(|email| !email.is_empty())
        .ok_or_else(|| ServiceError::ValidationFailed("'email_address' is required.".to_string()))?;

    let owner = state
        .store
        .find_owner_by_email(&email)
        .await
        .map_err(ServiceError::from_store)?;
    Ok(Json(owner.iter().map(|o| o.view()).collect()))
}

pub async fn list_conveyancers<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<ConveyancerView>>, ServiceError> {
    info!("Starting list_conveyancers");
    let conveyancers = state
        .store
        .list_conveyancers()
        .await
        .map_err(ServiceError::from_store)?;

    let views = conveyancers
        .iter()
        .map(|c| c.view())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Stored conveyancer name is invalid: {}", e)))?;
    Ok(Json(views))
}

pub async fn get_conveyancer<S: Store>(
    State(state): State<AppState<S>>,
    Path(conveyancer_id): Path<String>,
) -> Result<Json<ConveyancerView>, ServiceError> {
    info!("Starting get_conveyancer for {}", conveyancer_id);
    // A non-numeric id cannot match any row.
    let not_found = || ServiceError::not_found(CONVEYANCER_NOT_FOUND, "E002");
    let conveyancer_id: i64 = conveyancer_id.parse().map_err(|_| not_found())?;

    let conveyancer = state
        .store
        .get_conveyancer(conveyancer_id)
        .await
        .map_err(ServiceError::from_store)?
        .ok_or_else(not_found)?;

    let view = conveyancer
        .view()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Stored conveyancer name is invalid: {}", e)))?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_query_needs_an_owner_filter() {
        let err = TitleQuery::default().into_filter().unwrap_err();
        assert_eq!(
            err.to_string(),
            "'owner_identity' or 'owner_email_address' is required."
        );
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_title_query_prefers_identity_and_lowercases_email() {
        let filter = TitleQuery {
            owner_identity: Some("1".to_string()),
            owner_email_address: Some("x@example.com".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.owner, OwnerFilter::Identity("1".to_string()));

        let filter = TitleQuery {
            owner_email_address: Some("Lisa@Example.com".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.owner, OwnerFilter::Email("lisa@example.com".to_string()));
        assert_eq!(filter.address, None);
    }

    #[test]
    fn test_title_query_address_needs_both_parts() {
        let err = TitleQuery {
            owner_identity: Some("1".to_string()),
            address_postcode: Some("BS2 8EN".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));

        let filter = TitleQuery {
            owner_identity: Some("1".to_string()),
            address_house_name_number: Some("1".to_string()),
            address_postcode: Some("BS2 8EN".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(
            filter.address,
            Some(AddressFilter {
                house_name_number: "1".to_string(),
                postcode: "BS2 8EN".to_string(),
            })
        );
    }
}
