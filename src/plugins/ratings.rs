//! Rating rows: one per (store, user) pair.
//!
//! Uniqueness of the pair is a table constraint. Functions here take a bare
//! `&Connection` so they can run either on a read connection or inside a unit of work;
//! the service decides which.

use crate::core::error::RatingError;
use crate::plugins::aggregate::RatingValue;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub store_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Rating {
    /// The stored value, re-validated on the way out of the database.
    pub fn value(&self) -> Result<RatingValue, RatingError> {
        RatingValue::try_from(self.rating)
    }
}

/// A store's rating joined with the rater's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRatingEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One of the caller's ratings joined with the store it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRatingEntry {
    pub id: i64,
    pub store_id: i64,
    pub store_name: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const RATING_COLUMNS: &str = "id, store_id, user_id, rating, comment, created_at, updated_at";

fn rating_from_row(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: row.get(0)?,
        store_id: row.get(1)?,
        user_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Blank comments are stored as absent.
pub fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

pub fn find_by_id(conn: &Connection, rating_id: i64) -> Result<Option<Rating>, RatingError> {
    let sql = format!("SELECT {RATING_COLUMNS} FROM ratings WHERE id = ?1");
    conn.query_row(&sql, params![rating_id], rating_from_row)
        .optional()
        .map_err(RatingError::RusqliteError)
}

pub fn find_for_pair(
    conn: &Connection,
    store_id: i64,
    user_id: i64,
) -> Result<Option<Rating>, RatingError> {
    let sql = format!("SELECT {RATING_COLUMNS} FROM ratings WHERE store_id = ?1 AND user_id = ?2");
    conn.query_row(&sql, params![store_id, user_id], rating_from_row)
        .optional()
        .map_err(RatingError::RusqliteError)
}

/// Insert a new rating. A lost race on the (store, user) pair is reported as
/// `ConflictRace`.
pub fn insert(
    conn: &Connection,
    store_id: i64,
    user_id: i64,
    value: RatingValue,
    comment: Option<&str>,
    ts: &str,
) -> Result<Rating, RatingError> {
    if let Err(e) = conn.execute(
        "INSERT INTO ratings(store_id, user_id, rating, comment, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?5)",
        params![store_id, user_id, value.get(), comment, ts],
    ) {
        let err = RatingError::RusqliteError(e);
        if err.is_unique_violation() {
            return Err(RatingError::ConflictRace(format!(
                "user {user_id} already rated store {store_id}"
            )));
        }
        return Err(err);
    }
    find_by_id(conn, conn.last_insert_rowid())?
        .ok_or_else(|| RatingError::NotFound("freshly inserted rating".into()))
}

pub fn update(
    conn: &Connection,
    rating_id: i64,
    value: RatingValue,
    comment: Option<&str>,
    ts: &str,
) -> Result<Rating, RatingError> {
    let changed = conn.execute(
        "UPDATE ratings SET rating = ?1, comment = ?2, updated_at = ?3 WHERE id = ?4",
        params![value.get(), comment, ts, rating_id],
    )?;
    if changed == 0 {
        return Err(RatingError::NotFound(format!("rating {rating_id}")));
    }
    find_by_id(conn, rating_id)?.ok_or_else(|| RatingError::NotFound(format!("rating {rating_id}")))
}

pub fn delete(conn: &Connection, rating_id: i64) -> Result<(), RatingError> {
    let changed = conn.execute("DELETE FROM ratings WHERE id = ?1", params![rating_id])?;
    if changed == 0 {
        return Err(RatingError::NotFound(format!("rating {rating_id}")));
    }
    Ok(())
}

/// Newest first.
pub fn list_for_store(
    conn: &Connection,
    store_id: i64,
) -> Result<Vec<StoreRatingEntry>, RatingError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.user_id, u.username, r.rating, r.comment, r.created_at, r.updated_at
         FROM ratings r
         JOIN users u ON u.id = r.user_id
         WHERE r.store_id = ?1
         ORDER BY r.created_at DESC, r.id DESC",
    )?;
    let rows = stmt.query_map(params![store_id], |row| {
        Ok(StoreRatingEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            rating: row.get(3)?,
            comment: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Newest first.
pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<UserRatingEntry>, RatingError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.store_id, s.name, r.rating, r.comment, r.created_at, r.updated_at
         FROM ratings r
         JOIN stores s ON s.id = r.store_id
         WHERE r.user_id = ?1
         ORDER BY r.created_at DESC, r.id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(UserRatingEntry {
            id: row.get(0)?,
            store_id: row.get(1)?,
            store_name: row.get(2)?,
            rating: row.get(3)?,
            comment: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Every rating value currently held for a store.
pub fn values_for_store(conn: &Connection, store_id: i64) -> Result<Vec<RatingValue>, RatingError> {
    let mut stmt = conn.prepare("SELECT rating FROM ratings WHERE store_id = ?1")?;
    let rows = stmt.query_map(params![store_id], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(RatingValue::try_from(r?)?);
    }
    Ok(out)
}

/// All ratings written by one user, for cascade handling.
pub fn by_user(conn: &Connection, user_id: i64) -> Result<Vec<Rating>, RatingError> {
    let sql = format!("SELECT {RATING_COLUMNS} FROM ratings WHERE user_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], rating_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Count of ratings per star value, index 0 = one star.
pub fn distribution(conn: &Connection, store_id: i64) -> Result<[i64; 5], RatingError> {
    let mut stmt =
        conn.prepare("SELECT rating, COUNT(*) FROM ratings WHERE store_id = ?1 GROUP BY rating")?;
    let rows = stmt.query_map(params![store_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = [0i64; 5];
    for r in rows {
        let (value, count) = r?;
        let value = RatingValue::try_from(value)?;
        out[(value.get() - 1) as usize] = count;
    }
    Ok(out)
}
