//! # tatsahay-store
//!
//! Durable storage for incident reports, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`, runs schema migrations on open, and provides typed
//! helpers for creating, listing and moderating reports. Async callers are
//! expected to wrap it and hop onto a blocking thread.

pub mod database;
pub mod migrations;
pub mod models;
pub mod reports;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
