//! Store records and store-management primitives.
//!
//! This module creates, reads and deletes stores. It never writes the aggregate
//! columns; those belong to [`crate::plugins::aggregate`].

use crate::core::database::Database;
use crate::core::error::RatingError;
use crate::core::time;
use crate::plugins::aggregate::Aggregate;
use crate::plugins::guard::{self, Identity, Role};
use crate::plugins::users;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

const NAME_LEN: (usize, usize) = (2, 100);
const ADDRESS_LEN: (usize, usize) = (5, 400);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub owner_id: Option<i64>,
    pub average_rating: f64,
    pub total_ratings: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Store {
    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(self.average_rating, self.total_ratings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub address: String,
    pub owner_id: Option<i64>,
}

const STORE_COLUMNS: &str =
    "id, name, address, owner_id, average_rating, total_ratings, created_at, updated_at";

fn store_from_row(row: &Row<'_>) -> rusqlite::Result<Store> {
    Ok(Store {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        owner_id: row.get(3)?,
        average_rating: row.get(4)?,
        total_ratings: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn find_store(conn: &Connection, store_id: i64) -> Result<Option<Store>, RatingError> {
    let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?1");
    conn.query_row(&sql, params![store_id], store_from_row)
        .optional()
        .map_err(RatingError::RusqliteError)
}

pub fn require_store(conn: &Connection, store_id: i64) -> Result<Store, RatingError> {
    find_store(conn, store_id)?
        .ok_or_else(|| RatingError::NotFound(format!("store {store_id}")))
}

pub fn get_store(db: &Database, store_id: i64) -> Result<Option<Store>, RatingError> {
    db.read(|conn| find_store(conn, store_id))
}

pub fn list_stores(db: &Database) -> Result<Vec<Store>, RatingError> {
    db.read(|conn| {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], store_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

fn check_len(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), RatingError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(RatingError::InvalidInput(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

/// Register a store. Admin only.
///
/// A named owner must exist, may own at most one store, and is promoted to
/// `store_owner` if they held a plain `user` role.
pub fn create_store(
    db: &Database,
    identity: &Identity,
    new_store: &NewStore,
) -> Result<Store, RatingError> {
    if !guard::can_create_store(identity) {
        return Err(RatingError::Forbidden(
            "only administrators can create stores".into(),
        ));
    }
    check_len("name", &new_store.name, NAME_LEN)?;
    check_len("address", &new_store.address, ADDRESS_LEN)?;

    let actor = format!("user:{}", identity.id);
    let store = db.transact(&actor, "store.create", |tx| {
        if let Some(owner_id) = new_store.owner_id {
            let owner = users::find_user(tx, owner_id)?
                .ok_or_else(|| RatingError::NotFound(format!("user {owner_id}")))?;
            let already: Option<i64> = tx
                .query_row(
                    "SELECT id FROM stores WHERE owner_id = ?1",
                    params![owner_id],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(existing) = already {
                return Err(RatingError::InvalidInput(format!(
                    "user {owner_id} already owns store {existing}"
                )));
            }
            if owner.role == Role::User {
                users::set_role(tx, owner_id, Role::StoreOwner)?;
            }
        }

        let ts = time::now_row_ts();
        tx.execute(
            "INSERT INTO stores(name, address, owner_id, average_rating, total_ratings, created_at, updated_at)
             VALUES(?1, ?2, ?3, 0, 0, ?4, ?4)",
            params![
                new_store.name.trim(),
                new_store.address.trim(),
                new_store.owner_id,
                ts
            ],
        )?;
        require_store(tx, tx.last_insert_rowid())
    })?;

    info!(store_id = store.id, owner_id = ?store.owner_id, "store created");
    Ok(store)
}

/// Delete a store. Its ratings cascade with it, so no aggregate state survives.
pub fn delete_store(db: &Database, identity: &Identity, store_id: i64) -> Result<(), RatingError> {
    let actor = format!("user:{}", identity.id);
    let removed = db.transact(&actor, "store.delete", |tx| {
        let store = require_store(tx, store_id)?;
        if !guard::can_manage_store(identity, &store) {
            return Err(RatingError::Forbidden(format!(
                "not authorized to delete store {store_id}"
            )));
        }
        let ratings: i64 = tx.query_row(
            "SELECT COUNT(*) FROM ratings WHERE store_id = ?1",
            params![store_id],
            |r| r.get(0),
        )?;
        tx.execute("DELETE FROM stores WHERE id = ?1", params![store_id])?;
        Ok(ratings)
    })?;

    info!(store_id, ratings_removed = removed, "store deleted");
    Ok(())
}
