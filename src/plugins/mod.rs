//! Rating subsystems.
//!
//! Each subsystem owns its tables' reads and writes; the service composes them.

pub mod aggregate;
pub mod guard;
pub mod ratings;
pub mod service;
pub mod stores;
pub mod users;
