pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ErrorResponse, ServiceError};

pub use logic::{RequestValidator, TitleReconciler};

// Export all model types
pub use model::*;

pub use store::{MemoryStore, PostgresStore, Store};

/// Serve the API for `store` on an already bound listener.
pub async fn serve_store<S: Store + 'static>(
    listener: tokio::net::TcpListener,
    store: std::sync::Arc<S>,
    validator: RequestValidator,
) -> anyhow::Result<()> {
    let state = api::handlers::AppState::new(store, validator);
    let app = api::routes::create_router::<S>().with_state(state);
    axum::serve(listener, app).await?;
    Ok(())
}
