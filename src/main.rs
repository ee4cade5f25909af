use log::info;
use std::sync::Arc;
use title_api::config::AppConfig;
use title_api::seed;
use title_api::serve_store;
use title_api::store::PostgresStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    info!("Title API");

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    let validator = config.request_validator()?;
    info!("Request schema '{}' loaded", validator.schema_name());

    info!("Connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let postgres_store = PostgresStore::new(&database_url, config.max_connections()).await?;

    info!("Running database migrations...");
    postgres_store.migrate().await?;

    let store = Arc::new(postgres_store);

    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        info!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
    }

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Title API running on http://{}", bind_address);

    serve_store(listener, store, validator).await
}
