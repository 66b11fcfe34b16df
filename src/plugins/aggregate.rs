//! Rating aggregation engine.
//!
//! Maintains a store's `(average_rating, total_ratings)` pair incrementally from its
//! previous value and a single delta, instead of rescanning every rating row on each
//! write. The arithmetic is pure; [`persist`] is the only statement in the crate that
//! writes the aggregate columns, and callers must run it in the same transaction as the
//! matching rating-row mutation.
//!
//! Accumulated floating error is bounded but real, so [`recompute`] and [`drift`] back
//! the reconciliation path that rewrites an aggregate from the underlying rows.

use crate::core::error::RatingError;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// A validated 1..=5 star value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RatingValue(u8);

impl RatingValue {
    pub fn get(self) -> i64 {
        i64::from(self.0)
    }

    fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl TryFrom<i64> for RatingValue {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (MIN_RATING..=MAX_RATING).contains(&value) {
            Ok(RatingValue(value as u8))
        } else {
            Err(RatingError::InvalidInput(format!(
                "rating must be an integer between {MIN_RATING} and {MAX_RATING}, got {value}"
            )))
        }
    }
}

impl From<RatingValue> for i64 {
    fn from(value: RatingValue) -> Self {
        value.get()
    }
}

impl fmt::Display for RatingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The derived per-store pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub average_rating: f64,
    pub total_ratings: i64,
}

impl Aggregate {
    pub const EMPTY: Aggregate = Aggregate {
        average_rating: 0.0,
        total_ratings: 0,
    };

    pub fn new(average_rating: f64, total_ratings: i64) -> Self {
        debug_assert!(total_ratings >= 0, "negative total_ratings: {total_ratings}");
        normalize(average_rating, total_ratings)
    }

    /// Average rounded to one decimal place, for display only.
    pub fn display_average(&self) -> f64 {
        (self.average_rating * 10.0).round() / 10.0
    }

    fn sum(&self) -> f64 {
        self.average_rating * self.total_ratings as f64
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Aggregate::EMPTY
    }
}

/// Keep the pair inside its domain: `total >= 0`, `average` in `[0, 5]`, and
/// `average == 0` whenever `total == 0`.
fn normalize(average: f64, total: i64) -> Aggregate {
    let total = total.max(0);
    if total == 0 || !average.is_finite() {
        return Aggregate {
            average_rating: 0.0,
            total_ratings: total,
        };
    }
    Aggregate {
        average_rating: average.clamp(0.0, MAX_RATING as f64),
        total_ratings: total,
    }
}

pub fn apply_insert(current: Aggregate, new_value: RatingValue) -> Aggregate {
    debug_assert!(current.total_ratings >= 0);
    let current = normalize(current.average_rating, current.total_ratings);
    let new_total = current.total_ratings + 1;
    let new_average = (current.sum() + new_value.as_f64()) / new_total as f64;
    normalize(new_average, new_total)
}

pub fn apply_update(
    current: Aggregate,
    old_value: RatingValue,
    new_value: RatingValue,
) -> Aggregate {
    debug_assert!(current.total_ratings >= 0);
    let current = normalize(current.average_rating, current.total_ratings);
    // An update implies an existing row; an empty aggregate here has drifted and is left
    // for reconciliation rather than divided by zero.
    if current.total_ratings == 0 || old_value == new_value {
        return current;
    }
    let total = current.total_ratings;
    let new_average = (current.sum() - old_value.as_f64() + new_value.as_f64()) / total as f64;
    normalize(new_average, total)
}

pub fn apply_delete(current: Aggregate, removed_value: RatingValue) -> Aggregate {
    debug_assert!(current.total_ratings >= 0);
    if current.total_ratings <= 1 {
        return Aggregate::EMPTY;
    }
    let current = normalize(current.average_rating, current.total_ratings);
    let new_total = current.total_ratings - 1;
    let new_average = (current.sum() - removed_value.as_f64()) / new_total as f64;
    normalize(new_average, new_total)
}

/// Full recomputation from the underlying rating values.
pub fn recompute<I>(values: I) -> Aggregate
where
    I: IntoIterator<Item = RatingValue>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0i64, 0i64), |(s, c), v| (s + v.get(), c + 1));
    if count == 0 {
        return Aggregate::EMPTY;
    }
    normalize(sum as f64 / count as f64, count)
}

/// Absolute distance between a stored and a recomputed average.
///
/// A count mismatch is reported as infinite drift.
pub fn drift(stored: Aggregate, actual: Aggregate) -> f64 {
    if stored.total_ratings != actual.total_ratings {
        return f64::INFINITY;
    }
    (stored.average_rating - actual.average_rating).abs()
}

/// Write a store's aggregate columns.
///
/// Sole writer of `average_rating` / `total_ratings`.
pub(crate) fn persist(
    conn: &Connection,
    store_id: i64,
    aggregate: Aggregate,
    ts: &str,
) -> Result<(), RatingError> {
    let aggregate = normalize(aggregate.average_rating, aggregate.total_ratings);
    let changed = conn.execute(
        "UPDATE stores SET average_rating = ?1, total_ratings = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            aggregate.average_rating,
            aggregate.total_ratings,
            ts,
            store_id
        ],
    )?;
    if changed == 0 {
        return Err(RatingError::NotFound(format!("store {store_id}")));
    }
    Ok(())
}
