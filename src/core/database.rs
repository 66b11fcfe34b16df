//! Persistence handle.
//!
//! A `Database` is constructed once at startup from a [`Config`] and passed by reference
//! to every operation that touches state. It owns the connection pool and the broker; no
//! module-level client exists.

use crate::core::broker::{DbBroker, ReplayReport};
use crate::core::config::Config;
use crate::core::db;
use crate::core::error::RatingError;
use crate::core::pool::SqlitePool;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::info;

pub struct Database {
    config: Config,
    pool: SqlitePool,
    broker: DbBroker,
}

impl Database {
    /// Prepare the data directory, open the database and apply the schema.
    pub fn open(config: Config) -> Result<Self, RatingError> {
        config.validate()?;
        db::storage_preflight(&config.data_dir)?;

        let db_path = config.db_path();
        let pool = SqlitePool::new(&db_path, &config);
        pool.with_write(|conn| db::ensure_schema(conn))?;
        let broker = DbBroker::new(&config.data_dir, config.audit_log);

        info!(path = %db_path.display(), "database opened");
        Ok(Self {
            config,
            pool,
            broker,
        })
    }

    /// Shorthand for a default-configured database under `data_dir`.
    pub fn open_in(data_dir: &Path) -> Result<Self, RatingError> {
        Self::open(Config::for_data_dir(data_dir))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Read-only access on one snapshot, outside any write transaction.
    pub fn read<F, R>(&self, f: F) -> Result<R, RatingError>
    where
        F: FnOnce(&Connection) -> Result<R, RatingError>,
    {
        self.pool.with_read(f)
    }

    /// One atomic unit of work, see [`DbBroker::with_tx`].
    pub fn transact<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, RatingError>
    where
        F: FnMut(&Transaction<'_>) -> Result<R, RatingError>,
    {
        self.broker.with_tx(&self.pool, actor, op_name, f)
    }

    pub fn verify_audit_log(&self) -> Result<ReplayReport, RatingError> {
        self.broker.verify_replay()
    }
}
