//! CLI struct definitions for the storerate command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::plugins::guard::Role;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "storerate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Store ratings with transactionally consistent per-store aggregates"
)]
pub struct Cli {
    /// Configuration file (defaults to `<data-dir>/storerate.toml` when present).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the database and audit ledger.
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory and database schema
    Init,
    /// Directory users
    User(UserCli),
    /// Stores
    Store(StoreCli),
    /// Submit, delete and read ratings
    Rate(RateCli),
    /// Rating overview for a store's operator
    Dashboard {
        /// Caller credential (user id)
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(long)]
        store: i64,
    },
    /// Recompute aggregates from rating rows and repair drift
    Reconcile {
        /// Only this store (all stores when omitted)
        #[clap(long)]
        store: Option<i64>,
    },
    /// Report stores whose aggregate disagrees with their rating rows
    Verify,
}

#[derive(clap::Args, Debug)]
pub struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Add a user to the directory
    Add {
        #[clap(long)]
        username: String,
        #[clap(long, value_enum, default_value = "user")]
        role: Role,
    },
    /// Remove a user and their ratings
    Remove {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(value_name = "USER_ID")]
        user_id: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct StoreCli {
    #[clap(subcommand)]
    pub command: StoreCommand,
}

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Create a store (admin only)
    Add {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(long)]
        name: String,
        #[clap(long)]
        address: String,
        /// User id of the store's operator
        #[clap(long)]
        owner: Option<i64>,
    },
    /// Delete a store and its ratings (admin or owner)
    Delete {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(value_name = "STORE_ID")]
        store_id: i64,
    },
    /// List stores with their aggregates
    List,
    /// Show a store's aggregate and ratings
    Show {
        #[clap(value_name = "STORE_ID")]
        store_id: i64,
    },
}

#[derive(clap::Args, Debug)]
pub struct RateCli {
    #[clap(subcommand)]
    pub command: RateCommand,
}

#[derive(Subcommand, Debug)]
pub enum RateCommand {
    /// Rate a store 1-5, replacing any earlier rating by the same user
    Submit {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(long)]
        store: i64,
        #[clap(long, allow_negative_numbers = true)]
        rating: i64,
        #[clap(long)]
        comment: Option<String>,
    },
    /// Delete a rating (author or admin)
    Delete {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(value_name = "RATING_ID")]
        rating_id: i64,
    },
    /// Show the caller's rating for a store
    Get {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
        #[clap(long)]
        store: i64,
    },
    /// List a store's ratings, newest first
    List {
        #[clap(long)]
        store: i64,
    },
    /// List the caller's ratings, newest first
    Mine {
        #[clap(long = "as", value_name = "CREDENTIAL")]
        credential: String,
    },
}
