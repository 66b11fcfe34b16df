use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RatingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflicting concurrent write: {0}")]
    ConflictRace(String),
    #[error("Transaction failed: {0}")]
    TransactionFailure(String),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl RatingError {
    /// HTTP-style status the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            RatingError::InvalidInput(_) | RatingError::ValidationError(_) => 400,
            RatingError::Unauthenticated(_) => 401,
            RatingError::Forbidden(_) => 403,
            RatingError::NotFound(_) => 404,
            RatingError::ConflictRace(_) => 409,
            RatingError::TransactionFailure(_) => 503,
            RatingError::RusqliteError(_)
            | RatingError::IoError(_)
            | RatingError::ConfigError(_) => 500,
        }
    }

    /// Stable machine-readable tag for envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            RatingError::InvalidInput(_) => "INVALID_INPUT",
            RatingError::Unauthenticated(_) => "UNAUTHENTICATED",
            RatingError::Forbidden(_) => "FORBIDDEN",
            RatingError::NotFound(_) => "NOT_FOUND",
            RatingError::ConflictRace(_) => "CONFLICT_RACE",
            RatingError::TransactionFailure(_) => "TRANSACTION_FAILURE",
            RatingError::RusqliteError(_) => "STORAGE_ERROR",
            RatingError::IoError(_) => "IO_ERROR",
            RatingError::ConfigError(_) => "CONFIG_ERROR",
            RatingError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// SQLITE_BUSY / SQLITE_LOCKED: another writer holds the lock, safe to retry.
    pub fn is_busy(&self) -> bool {
        match self {
            RatingError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Unique-constraint violation, i.e. a lost insert race on `(store_id, user_id)`.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RatingError::ConflictRace(_) => true,
            RatingError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => {
                code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}
