//! flowspace-core - Offline-first sync core for FlowSpace
//!
//! This crate contains the entity models, the local store that mirrors the
//! server's tables, and the sync engine that drains locally created records
//! to the REST API. Every FlowSpace client builds on it.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntityKind, LocalId, Record};
pub use state::SyncState;
