use crate::core::error::{self, RatingError};
use crate::core::pool::{SqlitePool, retry_on_busy};
use crate::core::time;
use rusqlite::{Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The DB Broker is the single entry point for state mutation.
///
/// Every mutating unit of work runs inside one `BEGIN IMMEDIATE` transaction, so the
/// write lock is held from the first read of a store aggregate until commit. Each unit
/// is bracketed by `pending` and terminal entries in the audit ledger.
pub struct DbBroker {
    audit_log_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

/// Ops whose `pending` entry has no terminal entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub total_events: usize,
    pub divergences: Vec<Divergence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Divergence {
    pub event_id: String,
    pub op: String,
    pub reason: String,
}

pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";

impl DbBroker {
    pub fn new(root: &Path, audit: bool) -> Self {
        Self {
            audit_log_path: audit.then(|| root.join(AUDIT_LOG_NAME)),
        }
    }

    /// Run `f` inside an immediate transaction, retrying busy/locked failures.
    ///
    /// Any error returned by `f` (or a panic inside it) drops the transaction, which rolls
    /// it back; nothing from a failed attempt is ever visible to readers.
    pub fn with_tx<F, R>(
        &self,
        pool: &SqlitePool,
        actor: &str,
        op_name: &str,
        mut f: F,
    ) -> Result<R, error::RatingError>
    where
        F: FnMut(&Transaction<'_>) -> Result<R, error::RatingError>,
    {
        let db_id = pool
            .db_path()
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let event_id = time::new_event_id();
        self.log_event(&event_id, actor, op_name, &db_id, "pending")?;

        let result = retry_on_busy(pool.retry_policy(), || {
            pool.with_write(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                debug!(op = op_name, "transaction begin");
                let out = f(&tx)?;
                tx.commit()?;
                debug!(op = op_name, "transaction commit");
                Ok(out)
            })
        });

        let status = match &result {
            Ok(_) => "success",
            Err(e) => {
                debug!(op = op_name, error = %e, "transaction rolled back");
                "error"
            }
        };
        if let Err(e) = self.log_event(&event_id, actor, op_name, &db_id, status) {
            warn!(op = op_name, error = %e, "failed to append terminal audit event");
        }

        result
    }

    fn log_event(
        &self,
        event_id: &str,
        actor: &str,
        op: &str,
        db_id: &str,
        status: &str,
    ) -> Result<(), error::RatingError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(());
        };

        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: event_id.to_string(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };
        let line = serde_json::to_string(&ev)
            .map_err(|e| RatingError::ValidationError(format!("audit event encode: {e}")))?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(RatingError::IoError)?;
        writeln!(f, "{}", line).map_err(RatingError::IoError)?;
        Ok(())
    }

    /// Scan the audit ledger for units of work that started but never finished.
    pub fn verify_replay(&self) -> Result<ReplayReport, error::RatingError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(ReplayReport::default());
        };
        if !path.exists() {
            return Ok(ReplayReport::default());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut pending: Vec<BrokerEvent> = Vec::new();
        let mut total = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let ev: BrokerEvent = serde_json::from_str(&line).map_err(|e| {
                RatingError::ValidationError(format!("corrupt audit line: {e}"))
            })?;
            total += 1;
            if ev.status == "pending" {
                pending.push(ev);
            } else {
                pending.retain(|p| p.event_id != ev.event_id);
            }
        }

        Ok(ReplayReport {
            total_events: total,
            divergences: pending
                .into_iter()
                .map(|p| Divergence {
                    event_id: p.event_id,
                    op: p.op,
                    reason: "Pending event without terminal status (potential crash)".to_string(),
                })
                .collect(),
        })
    }
}
