//! # trialbase-db
//!
//! PostgreSQL database layer for trialbase.
//!
//! This crate provides:
//! - Connection pool management
//! - A whitelist-driven JSON record store for the wide aggregate tables
//! - Typed repositories for identity, audit, and the approval queue
//! - Advisory-lock allocation of sequential trial identifiers
//!
//! ## Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trialbase_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/trialbase").await?;
//!     db.migrate().await?;
//!
//!     let payload = json!({"title": "Phase II dose-finding", "status": "Ongoing"});
//!     let trial = db.trials.create(payload.as_object().unwrap()).await?;
//!
//!     println!("Created trial: {}", trial["trial_id"]);
//!     Ok(())
//! }
//! ```
pub mod activity;
pub mod drugs;
pub mod pending_changes;
pub mod pool;
pub mod records;
pub mod tables;
pub mod trial_id;
pub mod trials;
pub mod users;

// Test fixtures for integration tests.
// Note: always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use trialbase_core::*;

// Re-export repository implementations
pub use activity::PgActivityLogRepository;
pub use drugs::PgDrugRepository;
pub use pending_changes::PgPendingChangeRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use records::{coerce, BindValue, ColumnKind, RecordStore, TableSpec};
pub use trial_id::TrialIdAllocator;
pub use trials::PgTrialRepository;
pub use users::{
    is_protected_role, PgRoleRepository, PgUserRepository, PgUserRoleRepository, PROTECTED_ROLES,
};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Trial aggregate roots.
    pub trials: PgTrialRepository,
    /// Drug aggregate roots.
    pub drugs: PgDrugRepository,
    /// Append-only audit log.
    pub activity: PgActivityLogRepository,
    /// Approval queue for proposed mutations.
    pub pending_changes: PgPendingChangeRepository,
    /// User accounts.
    pub users: PgUserRepository,
    /// Roles.
    pub roles: PgRoleRepository,
    /// User-role assignments.
    pub user_roles: PgUserRoleRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            trials: PgTrialRepository::new(pool.clone()),
            drugs: PgDrugRepository::new(pool.clone()),
            activity: PgActivityLogRepository::new(pool.clone()),
            pending_changes: PgPendingChangeRepository::new(pool.clone()),
            users: PgUserRepository::new(pool.clone()),
            roles: PgRoleRepository::new(pool.clone()),
            user_roles: PgUserRoleRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Record store for one aggregate table spec.
    pub fn record_store(&self, spec: &'static TableSpec) -> RecordStore {
        RecordStore::new(self.pool.clone(), spec)
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
