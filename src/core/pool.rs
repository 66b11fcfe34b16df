//! SQLite connection handling with read/write separation and retry logic.
//!
//! - Writes are serialized in-process through a **write mutex** and use fresh connections.
//! - Reads create fresh connections without the mutex (concurrent via WAL).
//! - Busy/locked failures are retried with exponential backoff, then surface as
//!   `TransactionFailure`.
//!
//! Connections are opened per operation rather than cached, so a handle can be shared
//! across request threads without any connection-level locking.

use crate::core::config::Config;
use crate::core::db;
use crate::core::error::RatingError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Backoff parameters for busy/locked retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Connection source for one SQLite database file.
pub struct SqlitePool {
    db_path: PathBuf,
    busy_timeout_secs: u32,
    write_lock: Mutex<()>,
    retry: RetryPolicy,
}

impl SqlitePool {
    pub fn new(db_path: &Path, config: &Config) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            busy_timeout_secs: config.busy_timeout_secs,
            write_lock: Mutex::new(()),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execute a closure with a write connection.
    /// Write access is serialized in-process via mutex.
    pub fn with_write<F, R>(&self, f: F) -> Result<R, RatingError>
    where
        F: FnOnce(&mut Connection) -> Result<R, RatingError>,
    {
        // The mutex guards no data, so a writer that panicked leaves nothing to repair.
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut conn = db::db_connect(&self.db_path.to_string_lossy(), self.busy_timeout_secs)?;

        f(&mut conn)
    }

    /// Execute a closure with a read connection (no mutex serialization).
    ///
    /// The closure runs inside one deferred transaction, so every statement it issues
    /// sees the same WAL snapshot.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, RatingError>
    where
        F: FnOnce(&Connection) -> Result<R, RatingError>,
    {
        let conn = db::db_connect(&self.db_path.to_string_lossy(), self.busy_timeout_secs)?;

        let tx = conn.unchecked_transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Retry a closure on `SQLITE_BUSY` / `SQLITE_LOCKED` with exponential backoff.
///
/// Once the attempt budget is spent the last busy error is reported as
/// `TransactionFailure`; every other error is returned untouched on first sight.
pub fn retry_on_busy<F, R>(policy: RetryPolicy, mut f: F) -> Result<R, RatingError>
where
    F: FnMut() -> Result<R, RatingError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_busy() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "database busy, retrying");
                thread::sleep(delay);
            }
            Err(e) if e.is_busy() => {
                return Err(RatingError::TransactionFailure(format!(
                    "gave up after {} retries: {}",
                    attempt, e
                )));
            }
            Err(e) => return Err(e),
        }
    }
}
