use agenda_api::application::dispatcher::NotificationDispatcher;
use agenda_api::application::identity::JwtIdentityVerifier;
use agenda_api::config::AppConfig;
use agenda_api::{AppState, create_app};
use anyhow::{Context, Result};
use core_lib::{
    Cache, DocumentStore,
    adapters::{
        in_memory_cache::InMemoryCache, in_memory_event_bus::InMemoryEventBus,
        in_memory_store::InMemoryDocumentStore, logging_push_gateway::LoggingPushGateway,
        postgres_store::PostgresDocumentStore, redis_cache::RedisCache,
    },
    crypto::{FieldCipher, StaticKeyProvider},
    domain::event::APPOINTMENTS_TOPIC,
};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

async fn document_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, using the in-memory document store");
        return Ok(Arc::new(InMemoryDocumentStore::default()));
    };
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    info!(
        database = config.redacted_database_url().as_deref().unwrap_or("?"),
        "connected to Postgres"
    );
    let store = PostgresDocumentStore::new(pool);
    store.migrate().await.context("database migration failed")?;
    Ok(Arc::new(store))
}

async fn token_cache(config: &AppConfig) -> Result<Arc<dyn Cache>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let cache = RedisCache::connect(url, "agenda", config.token_cache_ttl_seconds)
                .await
                .context("failed to connect to Redis")?;
            Ok(Arc::new(cache))
        }
        None => {
            info!("REDIS_URL not set, caching verified tokens in process");
            Ok(Arc::new(InMemoryCache::new(
                10_000,
                config.token_cache_ttl_seconds,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment (.env) if present
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("Starting Agenda API v{}...", env!("CARGO_PKG_VERSION"));
    let config = AppConfig::from_env()?;

    // The data key must be available before any request is served.
    let key_provider = StaticKeyProvider::from_base64(&config.encryption_key)
        .context("ENCRYPTION_KEY must be base64 of 32 bytes")?;
    let cipher = FieldCipher::from_provider(&key_provider)
        .await
        .context("failed to initialize field encryption")?;
    info!("field encryption ready");

    let store = document_store(&config).await?;
    let cache = token_cache(&config).await?;

    let event_bus = Arc::new(InMemoryEventBus::default());
    NotificationDispatcher::new(store.clone(), Arc::new(LoggingPushGateway))
        .spawn(event_bus.subscribe(APPOINTMENTS_TOPIC));

    let app_state = AppState {
        store,
        event_bus,
        cache,
        cipher: Arc::new(cipher),
        identity: Arc::new(JwtIdentityVerifier::new(
            &config.idp_jwt_secret,
            &config.idp_issuer,
            &config.idp_audience,
        )),
        token_cache_ttl_seconds: config.token_cache_ttl_seconds,
        booking_policy: config.booking_policy,
        cors_allowed_origin: config.cors_allowed_origin.clone(),
    };
    info!(policy = ?config.booking_policy, "booking policy");

    let app = create_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to address {}", addr))?;
    info!("Agenda API listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
