//! Identity and authorization guard.
//!
//! Pure decision functions over an already-resolved [`Identity`] and already-fetched
//! entities. Nothing here touches the database.

use crate::core::error::RatingError;
use crate::plugins::ratings::Rating;
use crate::plugins::stores::Store;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    StoreOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::StoreOwner => "store_owner",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "store_owner" => Ok(Role::StoreOwner),
            "admin" => Ok(Role::Admin),
            other => Err(RatingError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

/// Caller identity as resolved by the auth collaborator. Trusted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub role: Role,
}

impl Identity {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves a bearer credential into an [`Identity`].
pub trait Authenticator {
    fn authenticate(&self, credential: &str) -> Result<Identity, RatingError>;
}

pub fn is_owner_of(identity: &Identity, store: &Store) -> bool {
    store.owner_id == Some(identity.id)
}

/// Everyone may rate, except the operator of the store itself.
pub fn can_rate(identity: &Identity, store: &Store) -> bool {
    !is_owner_of(identity, store)
}

pub fn can_delete_rating(identity: &Identity, rating: &Rating) -> bool {
    identity.id == rating.user_id || identity.is_admin()
}

pub fn can_manage_store(identity: &Identity, store: &Store) -> bool {
    identity.is_admin() || is_owner_of(identity, store)
}

pub fn can_create_store(identity: &Identity) -> bool {
    identity.is_admin()
}

/// Users may remove themselves; admins may remove anyone.
pub fn can_remove_user(identity: &Identity, user_id: i64) -> bool {
    identity.is_admin() || identity.id == user_id
}
