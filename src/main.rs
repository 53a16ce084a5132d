use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use campuspay_backend::api::{self, AppState};
use campuspay_backend::config::Config;
use campuspay_backend::database::{
    self, payment_record_repository::PaymentRecordRepository, ticket_repository::TicketRepository,
    wallet_repository::WalletRepository, webhook_repository::WebhookRepository, PoolConfig,
};
use campuspay_backend::payments::engine::ReconciliationEngine;
use campuspay_backend::payments::providers::build_registry;
use campuspay_backend::payments::settlement::{TicketIssuanceApplier, WalletCreditApplier};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting CampusPay Backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "Configured providers: {:?}",
        config.gateways.enabled_providers()
    );

    // Database pool and schema
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = database::init_pool(&config.database.url, Some(pool_config)).await?;
    database::run_migrations(&pool).await?;

    // Wire the reconciliation engine
    let registry = build_registry(&config.gateways)?;
    let records = Arc::new(PaymentRecordRepository::new(pool.clone()));
    let wallets = Arc::new(WalletRepository::new(pool.clone()));
    let tickets = Arc::new(TicketRepository::new(pool.clone()));
    let engine = Arc::new(ReconciliationEngine::new(
        records,
        registry,
        WalletCreditApplier::new(wallets),
        TicketIssuanceApplier::new(tickets),
    ));

    let state = AppState {
        engine,
        webhooks: Arc::new(WebhookRepository::new(pool.clone())),
        pool,
        config: Arc::new(config.clone()),
    };

    let app = api::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
