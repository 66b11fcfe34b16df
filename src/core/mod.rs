//! Shared primitives: configuration, errors, persistence and time helpers.

pub mod broker;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod pool;
pub mod schemas;
pub mod time;
