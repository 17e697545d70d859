//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: mirrored entity tables
///
/// Every table shares the sync bookkeeping columns (`local_id` through
/// `next_attempt_at`) followed by the entity's payload columns.
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS clients (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER UNIQUE,
            user_id TEXT,
            created_at TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            next_attempt_at INTEGER,
            name TEXT NOT NULL,
            email TEXT,
            notes TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_clients_name ON clients(name)",
        "CREATE INDEX IF NOT EXISTS idx_clients_user ON clients(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_clients_synced ON clients(is_synced)",
        "CREATE TABLE IF NOT EXISTS notes (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER UNIQUE,
            user_id TEXT,
            created_at TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            next_attempt_at INTEGER,
            content TEXT NOT NULL,
            client_id INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_notes_client ON notes(client_id)",
        "CREATE INDEX IF NOT EXISTS idx_notes_synced ON notes(is_synced)",
        "CREATE TABLE IF NOT EXISTS invoices (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER UNIQUE,
            user_id TEXT,
            created_at TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            next_attempt_at INTEGER,
            client_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT',
            amount REAL NOT NULL DEFAULT 0,
            due_date TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_invoices_client ON invoices(client_id)",
        "CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status)",
        "CREATE INDEX IF NOT EXISTS idx_invoices_synced ON invoices(is_synced)",
        "CREATE TABLE IF NOT EXISTS tasks (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER UNIQUE,
            user_id TEXT,
            created_at TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            next_attempt_at INTEGER,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'TODO',
            priority TEXT NOT NULL DEFAULT 'MEDIUM',
            due_date TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_synced ON tasks(is_synced)",
        "CREATE TABLE IF NOT EXISTS contacts (
            local_id TEXT PRIMARY KEY,
            server_id INTEGER UNIQUE,
            user_id TEXT,
            created_at TEXT NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_error TEXT,
            next_attempt_at INTEGER,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            company TEXT,
            notes TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name)",
        "CREATE INDEX IF NOT EXISTS idx_contacts_user ON contacts(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_contacts_synced ON contacts(is_synced)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v1_creates_every_entity_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in ["clients", "notes", "invoices", "tasks", "contacts"] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }
}
