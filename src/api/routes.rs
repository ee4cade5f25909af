use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

/// Version 1 of the API, mounted under `/v1`.
fn v1_routes<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Titles
        .route("/titles", get(handlers::get_titles::<S>))
        .route(
            "/titles/:title_number",
            get(handlers::get_title::<S>).put(handlers::update_title::<S>),
        )
        .route("/titles/:title_number/lock", put(handlers::lock_title::<S>))
        .route("/titles/:title_number/unlock", put(handlers::unlock_title::<S>))
        // Owners
        .route("/owners", get(handlers::get_owners::<S>))
        // Conveyancers
        .route("/conveyancers", get(handlers::list_conveyancers::<S>))
        .route(
            "/conveyancers/:conveyancer_id",
            get(handlers::get_conveyancer::<S>),
        )
}

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", v1_routes::<S>())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::RequestValidator;
    use crate::seed::load_seed_data;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        load_seed_data(store.as_ref()).await.unwrap();
        let state = AppState::new(store, RequestValidator::bundled().unwrap());
        create_router::<MemoryStore>().with_state(state)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_is_unversioned() {
        let (status, body) = send(app().await, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_titles_are_under_v1() {
        let (status, body) = send(app().await, "GET", "/v1/titles/RTV237250").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title_number"], "RTV237250");

        let response = app()
            .await
            .oneshot(Request::builder().uri("/titles/RTV237250").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unlock_unlocked_title() {
        let (status, body) = send(app().await, "PUT", "/v1/titles/RTV237250/unlock").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_code"], "E409");
    }
}
