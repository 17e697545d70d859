//! Local store for FlowSpace

mod connection;
mod migrations;
mod patch;
mod store;
pub(crate) mod values;

pub use connection::Database;
pub use patch::RecordPatch;
pub use store::{LocalStore, PendingCount};
