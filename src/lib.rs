//! Roster generation, live fleet/equipment cache and session gating for the
//! operations front-end.

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;

use application::admin_view::AdminRosterView;
use application::live_cache::LiveCache;
use application::session::{MemoryTokenStore, SessionController, TokenStore};
use config::{AppConfig, DatabaseConfig};
use infrastructure::notifier::ChangeHub;
use infrastructure::sqlite_repo::SqliteRepository;

/// Opens (creating if needed) the SQLite database and applies migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    // 1. Open, creating the file on first run
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    // 2. Schema
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(path = %config.path.display(), "database ready");
    Ok(pool)
}

/// Explicit application context, built once and handed to every component.
pub struct AppServices {
    pub repo: Arc<SqliteRepository>,
    pub hub: ChangeHub,
    pub cache: Arc<LiveCache>,
    pub session: SessionController,
}

impl AppServices {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        Self::with_token_store(pool, config, Arc::new(MemoryTokenStore::default()))
    }

    pub fn with_token_store(pool: SqlitePool, config: &AppConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let hub = ChangeHub::new();
        let repo = Arc::new(SqliteRepository::with_hub(pool, hub.clone()));
        let cache = Arc::new(LiveCache::new(repo.clone(), hub.clone()));
        let session = SessionController::new(repo.clone(), tokens, hub.clone(), config.session.clone());
        Self {
            repo,
            hub,
            cache,
            session,
        }
    }

    pub fn admin_view(&self) -> AdminRosterView {
        AdminRosterView::new(
            self.session.clone(),
            Arc::clone(&self.cache),
            self.repo.clone(),
            self.repo.clone(),
            self.repo.clone(),
        )
    }
}
