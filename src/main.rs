use std::sync::Arc;

use clap::Parser;
use rust_decimal::Decimal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use charterpay::config::Config;
use charterpay::db::{create_pool, init_audit_db, init_db, queries, AppState};
use charterpay::gateway::{GatewayClient, MockGateway, StripeGateway};
use charterpay::handlers;
use charterpay::models::CreateBooking;
use charterpay::rate_limit::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "charterpay")]
#[command(about = "Settlement reconciliation service for charter bookings")]
struct Cli {
    /// Seed the database with dev bookings
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds a couple of pending bookings so checkout flows can be exercised
/// immediately. Only runs in dev mode and when the table is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))
        .expect("Failed to count bookings");
    if count > 0 {
        tracing::info!("Database already has bookings, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV BOOKINGS");
    tracing::info!("============================================");

    let seeds = [
        (Decimal::new(125_000, 2), "usd", "dev-payer-1"),
        (Decimal::new(890_050, 2), "usd", "dev-payer-2"),
    ];

    for (amount, currency, payer) in seeds {
        let booking = queries::create_booking(
            &conn,
            &CreateBooking {
                amount,
                currency: currency.to_string(),
                payer_id: Some(payer.to_string()),
            },
        )
        .expect("Failed to create dev booking");
        tracing::info!(
            "Booking: {} ({} {} for {})",
            booking.id,
            booking.amount,
            booking.currency,
            payer
        );
    }

    tracing::info!("============================================");
    tracing::info!("DEV BOOKINGS SEEDED SUCCESSFULLY");
    tracing::info!("============================================");
}

fn build_gateway(config: &Config) -> Arc<dyn GatewayClient> {
    match config.gateway.as_str() {
        "mock" => {
            let secret = config
                .stripe_webhook_secret
                .clone()
                .unwrap_or_else(|| "mock_webhook_secret".to_string());
            tracing::info!("Using mock payment gateway");
            Arc::new(MockGateway::new(&secret, &config.base_url))
        }
        "stripe" => {
            let secret_key = config
                .stripe_secret_key
                .as_deref()
                .expect("STRIPE_SECRET_KEY is required when GATEWAY=stripe");
            let webhook_secret = config
                .stripe_webhook_secret
                .as_deref()
                .expect("STRIPE_WEBHOOK_SECRET is required when GATEWAY=stripe");
            Arc::new(
                StripeGateway::new(secret_key, webhook_secret)
                    .expect("Failed to build Stripe client"),
            )
        }
        other => panic!("Unknown GATEWAY value: {} (expected stripe or mock)", other),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charterpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    // Create database connection pools
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    // Initialize database schemas
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let gateway = build_gateway(&config);

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        gateway,
        rate_limiter: Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute)),
        audit_log_enabled: config.audit_log_enabled,
        base_url: config.base_url.clone(),
    };

    // Seed dev data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set CHARTERPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Charterpay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            // Also remove WAL and SHM files if they exist
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
