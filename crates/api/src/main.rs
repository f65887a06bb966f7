//! MemberGate API Server
//!
//! Receives payment-provider webhooks and keeps subscriber access in sync.

use std::net::SocketAddr;

use membergate_api::{bootstrap::ensure_admin, routes::create_router, AppState, Config};
use membergate_billing::BillingService;
use membergate_shared::{create_pool, run_migrations};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,membergate_api=debug,membergate_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MemberGate API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!(config = ?config, "Configuration loaded");

    if config.webhook_secret.is_none() {
        tracing::warn!(
            "WEBHOOK_SECRET not set: webhook endpoint is open and operator routes are disabled"
        );
    }

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database connection established");

    if config.run_migrations {
        run_migrations(&pool).await?;
    } else {
        tracing::info!("Database migrations skipped (RUN_MIGRATIONS=false)");
    }

    let billing = BillingService::new(pool, config.email.clone());

    // A broken admin seed should not keep webhooks from being served
    if let Err(e) = ensure_admin(billing.users.as_ref(), config.admin.as_ref()).await {
        tracing::error!(error = %e, "Admin bootstrap failed");
    }

    let addr: SocketAddr = config.bind_address.parse()?;
    let app = create_router(AppState::new(config, billing)).layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
