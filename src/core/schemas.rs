//! Centralized database schema definitions.
//!
//! A single SQLite database holds three tables plus a meta table:
//! 1. users: directory projection (id, username, role) owned by the auth collaborator.
//! 2. stores: rated stores and their derived aggregate (`average_rating`, `total_ratings`).
//! 3. ratings: one row per (store, user) pair.

pub const SCHEMA_VERSION: u32 = 1;

pub const DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const DB_SCHEMA_USERS: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'store_owner', 'admin')),
        created_at TEXT NOT NULL
    )
";

pub const DB_SCHEMA_STORES: &str = "
    CREATE TABLE IF NOT EXISTS stores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        owner_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
        average_rating REAL NOT NULL DEFAULT 0 CHECK (average_rating >= 0 AND average_rating <= 5),
        total_ratings INTEGER NOT NULL DEFAULT 0 CHECK (total_ratings >= 0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const DB_SCHEMA_RATINGS: &str = "
    CREATE TABLE IF NOT EXISTS ratings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        store_id INTEGER NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        comment TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(store_id, user_id)
    )
";

pub const DB_SCHEMA_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_ratings_store_created ON ratings(store_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_user ON ratings(user_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stores_owner ON stores(owner_id) WHERE owner_id IS NOT NULL",
];
