//! storerate: the rating core of a store-rating application.
//!
//! Users rate stores from 1 to 5 stars with an optional comment, at most once per store.
//! Each store carries a derived aggregate (`average_rating`, `total_ratings`) that is
//! maintained incrementally and always changes in the same transaction as the rating row
//! that caused it.
//!
//! # Architecture
//!
//! ## Persistence
//!
//! - One SQLite database per data directory, opened through [`core::database::Database`]
//! - Every mutation is a `BEGIN IMMEDIATE` unit of work routed through
//!   [`core::broker::DbBroker`], which also keeps an audit ledger (`broker.events.jsonl`)
//! - Busy/locked failures are retried with backoff ([`core::pool`])
//!
//! ## Subsystems
//!
//! - `guard`: roles, identities and authorization decisions
//! - `aggregate`: the incremental aggregation engine and sole aggregate writer
//! - `ratings`: rating rows, unique per (store, user)
//! - `stores`: store records and management primitives
//! - `users`: directory projection and the credential authenticator
//! - `service`: the public rating operations
//!
//! # Examples
//!
//! ```bash
//! storerate init
//! storerate user add --username admin --role admin
//! storerate user add --username ann
//! storerate store add --as 1 --name "Corner Shop" --address "1 Main Street"
//! storerate rate submit --as 2 --store 1 --rating 5 --comment "friendly"
//! storerate --format json store show 1
//! storerate verify
//! ```

pub mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{Cli, Command, OutputFormat, RateCommand, StoreCommand, UserCommand};
use crate::core::config::{self, Config};
use crate::core::database::Database;
use crate::core::error::RatingError;
use crate::core::time;
use crate::plugins::guard::{Authenticator, Identity};
use crate::plugins::service::RatingService;
use crate::plugins::stores::{self, NewStore};
use crate::plugins::users::{self, DirectoryAuthenticator};
use clap::Parser;
use colored::Colorize;
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<(), RatingError> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    init_logging(&config);

    let format = cli.format;
    let cmd_name = command_name(&cli.command);
    match execute(config, cli.command) {
        Ok(payload) => {
            emit(format, cmd_name, "ok", payload);
            Ok(())
        }
        Err(e) => {
            if format == OutputFormat::Json {
                let body = serde_json::json!({
                    "code": e.code(),
                    "http_status": e.status_code(),
                    "message": e.to_string(),
                });
                println!("{}", time::command_envelope(cmd_name, "error", body));
            }
            Err(e)
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Init => "init",
        Command::User(u) => match u.command {
            UserCommand::Add { .. } => "user.add",
            UserCommand::Remove { .. } => "user.remove",
        },
        Command::Store(s) => match s.command {
            StoreCommand::Add { .. } => "store.add",
            StoreCommand::Delete { .. } => "store.delete",
            StoreCommand::List => "store.list",
            StoreCommand::Show { .. } => "store.show",
        },
        Command::Rate(r) => match r.command {
            RateCommand::Submit { .. } => "rate.submit",
            RateCommand::Delete { .. } => "rate.delete",
            RateCommand::Get { .. } => "rate.get",
            RateCommand::List { .. } => "rate.list",
            RateCommand::Mine { .. } => "rate.mine",
        },
        Command::Dashboard { .. } => "dashboard",
        Command::Reconcile { .. } => "reconcile",
        Command::Verify => "verify",
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<JsonValue, RatingError> {
    serde_json::to_value(value).map_err(|e| RatingError::ValidationError(e.to_string()))
}

fn authenticate(db: &Database, credential: &str) -> Result<Identity, RatingError> {
    DirectoryAuthenticator::new(db).authenticate(credential)
}

fn execute(config: Config, command: Command) -> Result<JsonValue, RatingError> {
    let db = Database::open(config)?;
    let service = RatingService::new(&db);

    match command {
        Command::Init => Ok(serde_json::json!({
            "db_path": db.db_path().to_string_lossy(),
        })),
        Command::User(user_cli) => match user_cli.command {
            UserCommand::Add { username, role } => {
                let user = users::register_user(&db, &username, role)?;
                Ok(serde_json::json!({ "user": to_json(&user)? }))
            }
            UserCommand::Remove {
                credential,
                user_id,
            } => {
                let identity = authenticate(&db, &credential)?;
                let removed = service.remove_user(&identity, user_id)?;
                Ok(serde_json::json!({ "removed": to_json(&removed)? }))
            }
        },
        Command::Store(store_cli) => match store_cli.command {
            StoreCommand::Add {
                credential,
                name,
                address,
                owner,
            } => {
                let identity = authenticate(&db, &credential)?;
                let store = stores::create_store(
                    &db,
                    &identity,
                    &NewStore {
                        name,
                        address,
                        owner_id: owner,
                    },
                )?;
                Ok(serde_json::json!({ "store": to_json(&store)? }))
            }
            StoreCommand::Delete {
                credential,
                store_id,
            } => {
                let identity = authenticate(&db, &credential)?;
                stores::delete_store(&db, &identity, store_id)?;
                Ok(serde_json::json!({ "store_id": store_id, "deleted": true }))
            }
            StoreCommand::List => {
                let all = stores::list_stores(&db)?;
                Ok(serde_json::json!({ "stores": to_json(&all)? }))
            }
            StoreCommand::Show { store_id } => {
                let summary = service.store_rating_summary(store_id)?;
                Ok(serde_json::json!({ "summary": to_json(&summary)? }))
            }
        },
        Command::Rate(rate_cli) => match rate_cli.command {
            RateCommand::Submit {
                credential,
                store,
                rating,
                comment,
            } => {
                let identity = authenticate(&db, &credential)?;
                let result = service.submit_rating(&identity, store, rating, comment.as_deref())?;
                Ok(serde_json::json!({
                    "rating": to_json(&result.rating)?,
                    "rating_status": result.status.as_str(),
                    "aggregate": to_json(&result.aggregate)?,
                }))
            }
            RateCommand::Delete {
                credential,
                rating_id,
            } => {
                let identity = authenticate(&db, &credential)?;
                let aggregate = service.delete_rating(&identity, rating_id)?;
                Ok(serde_json::json!({
                    "rating_id": rating_id,
                    "deleted": true,
                    "aggregate": to_json(&aggregate)?,
                }))
            }
            RateCommand::Get { credential, store } => {
                let identity = authenticate(&db, &credential)?;
                let rating = service.get_user_rating_for_store(&identity, store)?;
                Ok(serde_json::json!({ "rating": to_json(&rating)? }))
            }
            RateCommand::List { store } => {
                let list = service.list_ratings_for_store(store)?;
                Ok(serde_json::json!({ "store_id": store, "ratings": to_json(&list)? }))
            }
            RateCommand::Mine { credential } => {
                let identity = authenticate(&db, &credential)?;
                let list = service.list_ratings_for_user(&identity)?;
                Ok(serde_json::json!({ "ratings": to_json(&list)? }))
            }
        },
        Command::Dashboard { credential, store } => {
            let identity = authenticate(&db, &credential)?;
            let dashboard = service.owner_dashboard(&identity, store)?;
            Ok(serde_json::json!({ "dashboard": to_json(&dashboard)? }))
        }
        Command::Reconcile { store } => {
            let reports = match store {
                Some(id) => vec![service.reconcile_store(id)?],
                None => service.reconcile_all()?,
            };
            let repaired = reports.iter().filter(|r| r.repaired).count();
            Ok(serde_json::json!({
                "checked": reports.len(),
                "repaired": repaired,
                "reports": to_json(&reports)?,
            }))
        }
        Command::Verify => {
            let inconsistent = service.verify_aggregates()?;
            let replay = db.verify_audit_log()?;
            Ok(serde_json::json!({
                "consistent": inconsistent.is_empty(),
                "inconsistent": to_json(&inconsistent)?,
                "unfinished_units": to_json(&replay.divergences)?,
            }))
        }
    }
}

fn emit(format: OutputFormat, cmd: &str, status: &str, payload: JsonValue) {
    match format {
        OutputFormat::Json => {
            println!("{}", time::command_envelope(cmd, status, payload));
        }
        OutputFormat::Text => {
            println!("{} {}", cmd.bold(), status.green());
            if let Some(obj) = payload.as_object() {
                for (k, v) in obj {
                    let rendered = match v {
                        JsonValue::String(s) => s.clone(),
                        other => serde_json::to_string_pretty(other).unwrap_or_default(),
                    };
                    println!("  {}: {}", k.cyan(), rendered);
                }
            }
        }
    }
}
