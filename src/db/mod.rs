mod schema;
pub mod queries;

pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateway::GatewayClient;
use crate::rate_limit::RateLimiter;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools and injected collaborators.
///
/// The ledger store and the gateway client are passed in here explicitly;
/// no component reaches for ambient global state.
#[derive(Clone)]
pub struct AppState {
    /// Main ledger pool (bookings, payments).
    pub db: DbPool,
    /// Audit trail pool (separate file to isolate append-only growth).
    pub audit: DbPool,
    /// Payment gateway behind its contract trait.
    pub gateway: Arc<dyn GatewayClient>,
    /// Fixed-window request guard, keyed per (caller, action).
    pub rate_limiter: Arc<RateLimiter>,
    pub audit_log_enabled: bool,
    /// Base URL for gateway redirect callbacks.
    pub base_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
