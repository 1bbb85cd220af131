//! Campus Admin API Library Crate
//!
//! This library contains the web service around `campus-core`: configuration,
//! the SQLite record store, the REST and streaming handlers, and routing.
//! The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod stream;
