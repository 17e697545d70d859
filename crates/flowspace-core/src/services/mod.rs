//! Shared services used by clients.

mod workspace;

pub use workspace::{Created, DataSource, Loaded, Workspace};
