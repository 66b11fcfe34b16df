//! Directory projection of users.
//!
//! Accounts, passwords and sessions belong to the auth collaborator; this table only holds
//! what rating logic needs: the id, a display name for listings, and the role.

use crate::core::database::Database;
use crate::core::error::RatingError;
use crate::core::time;
use crate::plugins::guard::{Authenticator, Identity, Role};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.role)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role,
        created_at: row.get(3)?,
    })
}

pub fn find_user(conn: &Connection, user_id: i64) -> Result<Option<User>, RatingError> {
    conn.query_row(
        "SELECT id, username, role, created_at FROM users WHERE id = ?1",
        params![user_id],
        user_from_row,
    )
    .optional()
    .map_err(RatingError::RusqliteError)
}

pub(crate) fn set_role(conn: &Connection, user_id: i64, role: Role) -> Result<(), RatingError> {
    conn.execute(
        "UPDATE users SET role = ?1 WHERE id = ?2",
        params![role.as_str(), user_id],
    )?;
    Ok(())
}

pub fn get_user(db: &Database, user_id: i64) -> Result<Option<User>, RatingError> {
    db.read(|conn| find_user(conn, user_id))
}

pub fn register_user(db: &Database, username: &str, role: Role) -> Result<User, RatingError> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > 50 {
        return Err(RatingError::InvalidInput(
            "username must be between 1 and 50 characters".into(),
        ));
    }

    let user = db.transact("directory", "user.register", |tx| {
        tx.execute(
            "INSERT INTO users(username, role, created_at) VALUES(?1, ?2, ?3)",
            params![username, role.as_str(), time::now_row_ts()],
        )?;
        find_user(tx, tx.last_insert_rowid())?
            .ok_or_else(|| RatingError::NotFound("freshly inserted user".into()))
    })?;

    info!(user_id = user.id, role = %user.role, "user registered");
    Ok(user)
}

/// Resolves a numeric user-id credential against the directory.
pub struct DirectoryAuthenticator<'a> {
    db: &'a Database,
}

impl<'a> DirectoryAuthenticator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl Authenticator for DirectoryAuthenticator<'_> {
    fn authenticate(&self, credential: &str) -> Result<Identity, RatingError> {
        let user_id: i64 = credential.trim().parse().map_err(|_| {
            RatingError::Unauthenticated(format!("malformed credential: {credential}"))
        })?;
        get_user(self.db, user_id)?
            .map(|u| u.identity())
            .ok_or_else(|| RatingError::Unauthenticated(format!("unknown user {user_id}")))
    }
}
