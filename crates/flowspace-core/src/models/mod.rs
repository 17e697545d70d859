//! Data models for FlowSpace

mod client;
mod contact;
mod invoice;
mod note;
mod record;
mod task;

pub use client::Client;
pub use contact::Contact;
pub use invoice::{Invoice, InvoiceStatus};
pub use note::Note;
pub use record::{EntityKind, LocalId, Payload, Record, ServerRecord};
pub use task::{Task, TaskPriority, TaskStatus};
