use sokoni_backend::api::{self, AppState};
use sokoni_backend::config::Config;
use sokoni_backend::database::webhook_repository::WebhookRepository;
use sokoni_backend::database::{self, PoolConfig};
use sokoni_backend::notifications::LogNotifier;
use sokoni_backend::payments::providers::PaystackGateway;
use sokoni_backend::payouts::{PayoutEngine, Sweeper};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Log startup info
    tracing::info!("Starting Sokoni payout backend");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "Withholding tax rate: {}%",
        config.payouts.withholding_tax_rate
    );

    // Database pool
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = database::init_pool(&config.database.url, Some(pool_config)).await?;

    // Transfer gateway and payout engine
    let gateway = Arc::new(PaystackGateway::from_env()?);
    let notifier = Arc::new(LogNotifier);
    let engine = Arc::new(PayoutEngine::new(
        pool.clone(),
        gateway.clone(),
        notifier,
        config.payouts.clone(),
    ));

    // Reconciliation sweeper runs for the lifetime of the service
    tokio::spawn(Sweeper::new(engine.clone()).run());

    // Build router
    let state = AppState {
        config: config.clone(),
        pool: pool.clone(),
        engine,
        gateway,
        webhooks: Arc::new(WebhookRepository::new(pool)),
    };
    let app = api::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
