use flowspace_core::api::RemoteApi;
use flowspace_core::models::{Client, Contact, Invoice, Note, Payload, Task};
use flowspace_core::services::Workspace;

use crate::cli::AddCommands;
use crate::commands::common::{optional_text, require_text, resolve_note_content, Context};
use crate::error::CliError;

pub async fn run_add(record: AddCommands, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_workspace().await?;
    match record {
        AddCommands::Client { name, email, notes } => {
            let client = Client {
                name: require_text(&name, "Client name")?,
                email: optional_text(email),
                notes: optional_text(notes),
            };
            create_and_report(&workspace, client).await
        }
        AddCommands::Note { client_id, content } => {
            let note = Note::new(resolve_note_content(&content)?, client_id);
            create_and_report(&workspace, note).await
        }
        AddCommands::Invoice {
            client_id,
            amount,
            status,
            due_date,
        } => {
            let invoice = Invoice {
                due_date: optional_text(due_date),
                ..Invoice::new(client_id, amount).with_status(status.into())
            };
            create_and_report(&workspace, invoice).await
        }
        AddCommands::Task {
            title,
            description,
            priority,
            due_date,
        } => {
            let task = Task {
                description: optional_text(description),
                due_date: optional_text(due_date),
                ..Task::new(require_text(&title, "Task title")?).with_priority(priority.into())
            };
            create_and_report(&workspace, task).await
        }
        AddCommands::Contact {
            name,
            email,
            phone,
            company,
            notes,
        } => {
            let contact = Contact {
                name: require_text(&name, "Contact name")?,
                email: optional_text(email),
                phone: optional_text(phone),
                company: optional_text(company),
                notes: optional_text(notes),
            };
            create_and_report(&workspace, contact).await
        }
    }
}

/// Create the record, print its local ID, and say whether it reached the server
pub async fn create_and_report<A, P>(
    workspace: &Workspace<A>,
    payload: P,
) -> Result<(), CliError>
where
    A: RemoteApi + 'static,
    P: Payload,
{
    let created = workspace.create(payload).await?;
    println!("{}", created.local_id);

    let synced = created
        .records
        .iter()
        .any(|record| record.local_id == created.local_id && record.is_synced);
    if !synced {
        eprintln!("Saved locally; it will sync once the API is reachable.");
    }
    Ok(())
}
