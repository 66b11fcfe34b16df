//! Rating service: the public rating operations.
//!
//! Mutations consult the guard, then run as one unit of work that pairs the rating-row
//! change with the aggregate change computed by [`crate::plugins::aggregate`]. Reads go
//! straight to the tables.
//!
//! Per (user, store) pair the only transitions are:
//!
//! ```text
//! absent  --submit--> present   (insert path, status "created")
//! present --submit--> present   (update path, status "updated")
//! present --delete--> absent
//! ```
//!
//! Deleting an absent rating is `NotFound`.

use crate::core::database::Database;
use crate::core::error::RatingError;
use crate::core::time;
use crate::plugins::aggregate::{self, Aggregate, RatingValue};
use crate::plugins::guard::{self, Identity};
use crate::plugins::ratings::{self, Rating, StoreRatingEntry, UserRatingEntry};
use crate::plugins::stores::{self, Store};
use crate::plugins::users;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    Created,
    Updated,
}

impl SubmitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitStatus::Created => "created",
            SubmitStatus::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingResult {
    pub rating: Rating,
    pub status: SubmitStatus,
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreRatingSummary {
    pub store_id: i64,
    pub store_name: String,
    pub average_rating: f64,
    pub display_average: f64,
    pub total_ratings: i64,
    pub ratings: Vec<StoreRatingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerDashboard {
    pub summary: StoreRatingSummary,
    /// Ratings per star value, index 0 = one star.
    pub distribution: [i64; 5],
    /// Mean of the listed ratings, computed independently of the stored aggregate.
    pub listed_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub store_id: i64,
    pub stored: Aggregate,
    pub actual: Aggregate,
    pub drift: f64,
    pub repaired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedUser {
    pub user_id: i64,
    pub ratings_removed: usize,
    pub stores_adjusted: Vec<i64>,
}

pub struct RatingService<'a> {
    db: &'a Database,
}

fn actor_of(identity: &Identity) -> String {
    format!("user:{}", identity.id)
}

fn summary_of(conn: &Connection, store: &Store) -> Result<StoreRatingSummary, RatingError> {
    let aggregate = store.aggregate();
    Ok(StoreRatingSummary {
        store_id: store.id,
        store_name: store.name.clone(),
        average_rating: aggregate.average_rating,
        display_average: aggregate.display_average(),
        total_ratings: aggregate.total_ratings,
        ratings: ratings::list_for_store(conn, store.id)?,
    })
}

fn check_store(conn: &Connection, store: &Store) -> Result<Reconciliation, RatingError> {
    let stored = store.aggregate();
    let actual = aggregate::recompute(ratings::values_for_store(conn, store.id)?);
    let drift = aggregate::drift(stored, actual);
    Ok(Reconciliation {
        store_id: store.id,
        stored,
        actual,
        drift,
        repaired: false,
    })
}

/// Run `attempt` again, once, when it lost the insert race on the (store, user) pair.
/// The second run finds the winner's row and takes the update path.
fn retry_once_on_conflict<F>(store_id: i64, user_id: i64, mut attempt: F) -> Result<RatingResult, RatingError>
where
    F: FnMut() -> Result<RatingResult, RatingError>,
{
    match attempt() {
        Err(e) if e.is_unique_violation() => {
            warn!(store_id, user_id, error = %e, "insert lost a race, retrying as update");
            attempt()
        }
        other => other,
    }
}

impl<'a> RatingService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create the caller's rating for a store, or update it if one exists.
    pub fn submit_rating(
        &self,
        identity: &Identity,
        store_id: i64,
        rating_value: i64,
        comment: Option<&str>,
    ) -> Result<RatingResult, RatingError> {
        let store = self
            .db
            .read(|conn| stores::find_store(conn, store_id))?
            .ok_or_else(|| RatingError::NotFound(format!("store {store_id}")))?;
        if !guard::can_rate(identity, &store) {
            return Err(RatingError::Forbidden(
                "store owners cannot rate their own store".into(),
            ));
        }
        let value = RatingValue::try_from(rating_value)?;
        let comment = ratings::normalize_comment(comment);

        retry_once_on_conflict(store_id, identity.id, || {
            self.submit_once(identity, store_id, value, comment.as_deref())
        })
    }

    fn submit_once(
        &self,
        identity: &Identity,
        store_id: i64,
        value: RatingValue,
        comment: Option<&str>,
    ) -> Result<RatingResult, RatingError> {
        let result = self.db.transact(&actor_of(identity), "rating.submit", |tx| {
            let store = stores::require_store(tx, store_id)?;
            if !guard::can_rate(identity, &store) {
                return Err(RatingError::Forbidden(
                    "store owners cannot rate their own store".into(),
                ));
            }
            let ts = time::now_row_ts();

            match ratings::find_for_pair(tx, store_id, identity.id)? {
                None => {
                    let rating = ratings::insert(tx, store_id, identity.id, value, comment, &ts)?;
                    let next = aggregate::apply_insert(store.aggregate(), value);
                    aggregate::persist(tx, store_id, next, &ts)?;
                    Ok(RatingResult {
                        rating,
                        status: SubmitStatus::Created,
                        aggregate: next,
                    })
                }
                Some(existing) => {
                    let old = existing.value()?;
                    let rating = ratings::update(tx, existing.id, value, comment, &ts)?;
                    let next = aggregate::apply_update(store.aggregate(), old, value);
                    aggregate::persist(tx, store_id, next, &ts)?;
                    Ok(RatingResult {
                        rating,
                        status: SubmitStatus::Updated,
                        aggregate: next,
                    })
                }
            }
        })?;

        info!(
            store_id,
            user_id = identity.id,
            rating_id = result.rating.id,
            status = result.status.as_str(),
            total = result.aggregate.total_ratings,
            "rating submitted"
        );
        Ok(result)
    }

    /// Delete a rating as its author or as an admin. Returns the store's new aggregate.
    pub fn delete_rating(
        &self,
        identity: &Identity,
        rating_id: i64,
    ) -> Result<Aggregate, RatingError> {
        let rating = self
            .db
            .read(|conn| ratings::find_by_id(conn, rating_id))?
            .ok_or_else(|| RatingError::NotFound(format!("rating {rating_id}")))?;
        if !guard::can_delete_rating(identity, &rating) {
            return Err(RatingError::Forbidden(
                "not authorized to delete this rating".into(),
            ));
        }

        let (store_id, next) = self.db.transact(&actor_of(identity), "rating.delete", |tx| {
            let rating = ratings::find_by_id(tx, rating_id)?
                .ok_or_else(|| RatingError::NotFound(format!("rating {rating_id}")))?;
            let store = stores::require_store(tx, rating.store_id)?;
            let next = aggregate::apply_delete(store.aggregate(), rating.value()?);
            ratings::delete(tx, rating.id)?;
            aggregate::persist(tx, store.id, next, &time::now_row_ts())?;
            Ok((store.id, next))
        })?;

        info!(store_id, rating_id, total = next.total_ratings, "rating deleted");
        Ok(next)
    }

    /// The caller's rating for a store, or `None` if they have not rated it.
    pub fn get_user_rating_for_store(
        &self,
        identity: &Identity,
        store_id: i64,
    ) -> Result<Option<Rating>, RatingError> {
        self.db
            .read(|conn| ratings::find_for_pair(conn, store_id, identity.id))
    }

    /// A store's ratings, newest first, with each rater's display name.
    pub fn list_ratings_for_store(
        &self,
        store_id: i64,
    ) -> Result<Vec<StoreRatingEntry>, RatingError> {
        self.db.read(|conn| {
            stores::require_store(conn, store_id)?;
            ratings::list_for_store(conn, store_id)
        })
    }

    /// Every rating the caller has written, newest first.
    pub fn list_ratings_for_user(
        &self,
        identity: &Identity,
    ) -> Result<Vec<UserRatingEntry>, RatingError> {
        self.db
            .read(|conn| ratings::list_for_user(conn, identity.id))
    }

    pub fn store_rating_summary(&self, store_id: i64) -> Result<StoreRatingSummary, RatingError> {
        self.db.read(|conn| {
            let store = stores::require_store(conn, store_id)?;
            summary_of(conn, &store)
        })
    }

    /// Rating overview for the store's operator (or an admin).
    pub fn owner_dashboard(
        &self,
        identity: &Identity,
        store_id: i64,
    ) -> Result<OwnerDashboard, RatingError> {
        let dashboard = self.db.read(|conn| {
            let store = stores::require_store(conn, store_id)?;
            if !guard::can_manage_store(identity, &store) {
                return Err(RatingError::Forbidden(format!(
                    "not authorized to view the dashboard of store {store_id}"
                )));
            }
            let summary = summary_of(conn, &store)?;
            let distribution = ratings::distribution(conn, store_id)?;
            let listed_average = if summary.ratings.is_empty() {
                0.0
            } else {
                summary.ratings.iter().map(|r| r.rating as f64).sum::<f64>()
                    / summary.ratings.len() as f64
            };
            Ok(OwnerDashboard {
                summary,
                distribution,
                listed_average,
            })
        })?;

        let drift = (dashboard.listed_average - dashboard.summary.average_rating).abs();
        if drift > self.db.config().drift_tolerance {
            warn!(store_id, drift, "stored average disagrees with listed ratings");
        }
        Ok(dashboard)
    }

    /// Recompute a store's aggregate from its rows and repair it if it drifted.
    pub fn reconcile_store(&self, store_id: i64) -> Result<Reconciliation, RatingError> {
        let tolerance = self.db.config().drift_tolerance;
        let report = self.db.transact("reconciler", "aggregate.reconcile", |tx| {
            let store = stores::require_store(tx, store_id)?;
            let mut report = check_store(tx, &store)?;
            if report.drift > tolerance {
                aggregate::persist(tx, store_id, report.actual, &time::now_row_ts())?;
                report.repaired = true;
            }
            Ok(report)
        })?;

        if report.repaired {
            warn!(
                store_id,
                drift = report.drift,
                stored_total = report.stored.total_ratings,
                actual_total = report.actual.total_ratings,
                "aggregate repaired"
            );
        }
        Ok(report)
    }

    pub fn reconcile_all(&self) -> Result<Vec<Reconciliation>, RatingError> {
        let mut out = Vec::new();
        for store in stores::list_stores(self.db)? {
            match self.reconcile_store(store.id) {
                Ok(report) => out.push(report),
                // deleted between listing and reconciling
                Err(RatingError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Read-only check of every store; returns the ones outside tolerance.
    pub fn verify_aggregates(&self) -> Result<Vec<Reconciliation>, RatingError> {
        let tolerance = self.db.config().drift_tolerance;
        self.db.read(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM stores ORDER BY id")?;
            let ids = stmt
                .query_map([], |r| r.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut bad = Vec::new();
            for id in ids {
                let store = stores::require_store(conn, id)?;
                let report = check_store(conn, &store)?;
                if report.drift > tolerance {
                    bad.push(report);
                }
            }
            Ok(bad)
        })
    }

    /// Remove a user from the directory.
    ///
    /// Their ratings go with them; every affected store aggregate is adjusted through
    /// the engine in the same unit of work.
    pub fn remove_user(
        &self,
        identity: &Identity,
        user_id: i64,
    ) -> Result<RemovedUser, RatingError> {
        if !guard::can_remove_user(identity, user_id) {
            return Err(RatingError::Forbidden(format!(
                "not authorized to remove user {user_id}"
            )));
        }

        let removed = self.db.transact(&actor_of(identity), "user.remove", |tx| {
            users::find_user(tx, user_id)?
                .ok_or_else(|| RatingError::NotFound(format!("user {user_id}")))?;
            let ts = time::now_row_ts();
            let owned = ratings::by_user(tx, user_id)?;
            let mut stores_adjusted = Vec::with_capacity(owned.len());
            for rating in &owned {
                let store = stores::require_store(tx, rating.store_id)?;
                let next = aggregate::apply_delete(store.aggregate(), rating.value()?);
                ratings::delete(tx, rating.id)?;
                aggregate::persist(tx, store.id, next, &ts)?;
                stores_adjusted.push(store.id);
            }
            tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
            Ok(RemovedUser {
                user_id,
                ratings_removed: owned.len(),
                stores_adjusted,
            })
        })?;

        info!(user_id, ratings_removed = removed.ratings_removed, "user removed");
        Ok(removed)
    }
}
