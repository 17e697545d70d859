use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use flowspace_core::models::{InvoiceStatus, TaskPriority, TaskStatus};
use flowspace_core::EntityKind;

#[derive(Parser)]
#[command(name = "flowspace")]
#[command(about = "Track clients, invoices, tasks and notes, online or off")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a record and sync it
    #[command(alias = "new")]
    Add {
        #[command(subcommand)]
        record: AddCommands,
    },
    /// List records, falling back to local data when offline
    List {
        /// Entity type
        #[arg(value_enum)]
        entity: EntityArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show records waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push every unsynced record
    Sync {
        /// Re-queue records that stopped retrying
        #[arg(long)]
        retry_stalled: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a task's status
    TaskStatus {
        /// Task ID or unique ID prefix
        id: String,
        /// New status
        #[arg(value_enum)]
        status: TaskStatusArg,
    },
    /// Delete a record
    Delete {
        /// Entity type
        #[arg(value_enum)]
        entity: EntityArg,
        /// Record ID or unique ID prefix
        id: String,
    },
    /// Watch connectivity and sync whenever the API comes back
    Watch {
        /// Seconds between connectivity checks
        #[arg(long, default_value = "15", value_name = "SECS")]
        interval: u64,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum AddCommands {
    /// Add a client
    Client {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Add a note about a client
    Note {
        /// Server ID of the client
        #[arg(long)]
        client_id: i64,
        /// Note content (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Add an invoice
    Invoice {
        /// Server ID of the client
        #[arg(long)]
        client_id: i64,
        #[arg(long, default_value = "0")]
        amount: f64,
        #[arg(long, value_enum, default_value_t = InvoiceStatusArg::Draft)]
        status: InvoiceStatusArg,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_date: Option<String>,
    },
    /// Add a task
    Task {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_date: Option<String>,
    },
    /// Add a contact
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum EntityArg {
    #[value(alias = "clients")]
    Client,
    #[value(alias = "notes")]
    Note,
    #[value(alias = "invoices")]
    Invoice,
    #[value(alias = "tasks")]
    Task,
    #[value(alias = "contacts")]
    Contact,
}

impl From<EntityArg> for EntityKind {
    fn from(value: EntityArg) -> Self {
        match value {
            EntityArg::Client => Self::Clients,
            EntityArg::Note => Self::Notes,
            EntityArg::Invoice => Self::Invoices,
            EntityArg::Task => Self::Tasks,
            EntityArg::Contact => Self::Contacts,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum TaskStatusArg {
    Todo,
    InProgress,
    Done,
}

impl From<TaskStatusArg> for TaskStatus {
    fn from(value: TaskStatusArg) -> Self {
        match value {
            TaskStatusArg::Todo => Self::Todo,
            TaskStatusArg::InProgress => Self::InProgress,
            TaskStatusArg::Done => Self::Done,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for TaskPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Self::Low,
            PriorityArg::Medium => Self::Medium,
            PriorityArg::High => Self::High,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum InvoiceStatusArg {
    Draft,
    Sent,
    Paid,
}

impl From<InvoiceStatusArg> for InvoiceStatus {
    fn from(value: InvoiceStatusArg) -> Self {
        match value {
            InvoiceStatusArg::Draft => Self::Draft,
            InvoiceStatusArg::Sent => Self::Sent,
            InvoiceStatusArg::Paid => Self::Paid,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
