pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod list;
pub mod pending;
pub mod sync;
pub mod task_status;
pub mod watch;
