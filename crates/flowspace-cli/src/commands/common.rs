use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use flowspace_core::api::{HttpApiClient, RemoteApi};
use flowspace_core::config::{self, AppConfig, ENV_API_URL};
use flowspace_core::db::LocalStore;
use flowspace_core::models::{Client, Contact, Invoice, Note, Payload, Task};
use flowspace_core::services::Workspace;
use flowspace_core::Record;

use crate::error::CliError;

/// Resolved configuration for one invocation
pub struct Context {
    pub config: AppConfig,
}

impl Context {
    pub const fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Config file, then `FLOWSPACE_*` env, then command-line flags
    pub fn load(
        config_path: Option<&Path>,
        db_path: Option<PathBuf>,
        api_url: Option<String>,
    ) -> Result<Self, CliError> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(config::default_config_path);
        let mut config = match path {
            Some(path) => AppConfig::load_from_path(&path)?,
            None => AppConfig::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        if let Some(api_url) = api_url {
            config.apply_overrides(|key| (key == ENV_API_URL).then(|| api_url.clone()))?;
        }
        if let Some(db_path) = db_path {
            config.db_path = Some(db_path);
        }
        Ok(Self { config })
    }

    pub async fn open_store(&self) -> Result<LocalStore, CliError> {
        Ok(LocalStore::open(self.config.resolved_db_path()).await?)
    }

    /// The configured API client, or `None` when no URL is set
    pub fn api_client(&self) -> Result<Option<HttpApiClient>, CliError> {
        if !self.config.api.is_configured() {
            return Ok(None);
        }
        Ok(Some(HttpApiClient::from_config(&self.config.api)?))
    }

    /// Workspace for record commands. Without an API URL records are saved
    /// locally and stay pending.
    pub async fn open_workspace(&self) -> Result<Workspace<Option<HttpApiClient>>, CliError> {
        let api = self.api_client()?;
        self.workspace(api).await
    }

    /// Workspace for commands that only make sense against the server
    pub async fn open_connected_workspace(&self) -> Result<Workspace<HttpApiClient>, CliError> {
        let api = self.api_client()?.ok_or(CliError::ApiNotConfigured)?;
        self.workspace(api).await
    }

    async fn workspace<A: RemoteApi + 'static>(&self, api: A) -> Result<Workspace<A>, CliError> {
        let store = self.open_store().await?;
        Ok(
            Workspace::new(store, Arc::new(api), self.config.retry.policy())
                .with_user_id(self.config.user_id.clone()),
        )
    }
}

/// One-line rendering of a record's payload in listings
pub trait Headline {
    fn headline(&self) -> String;
}

impl Headline for Client {
    fn headline(&self) -> String {
        match &self.email {
            Some(email) => format!("{} <{email}>", self.name),
            None => self.name.clone(),
        }
    }
}

impl Headline for Note {
    fn headline(&self) -> String {
        format!("client #{}  {}", self.client_id, preview(&self.title_preview(80), 40))
    }
}

impl Headline for Invoice {
    fn headline(&self) -> String {
        let due = self
            .due_date
            .as_deref()
            .map(|due| format!("  due {due}"))
            .unwrap_or_default();
        format!(
            "client #{}  {:>10.2}  {}{due}",
            self.client_id, self.amount, self.status
        )
    }
}

impl Headline for Task {
    fn headline(&self) -> String {
        format!(
            "[{}] {} ({})",
            self.status,
            preview(&self.title, 40),
            self.priority
        )
    }
}

impl Headline for Contact {
    fn headline(&self) -> String {
        match &self.company {
            Some(company) => format!("{} @ {company}", self.name),
            None => self.name.clone(),
        }
    }
}

pub fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(13).collect()
}

/// Sync column: the server identity once synced, otherwise the pending state
pub fn sync_label<P>(record: &Record<P>) -> String {
    match record.server_id {
        Some(server_id) if record.is_synced => format!("#{server_id}"),
        _ if record.sync_attempts > 0 => format!("pending ({}x)", record.sync_attempts),
        _ => "pending".to_string(),
    }
}

pub fn format_record_lines<P: Payload + Headline>(records: &[Record<P>]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            format!(
                "{:<13}  {:<12}  {}  {}",
                short_id(&record.local_id),
                sync_label(record),
                record.payload.headline(),
                format_created_at(&record.created_at, now_ms)
            )
        })
        .collect()
}

pub fn format_created_at(created_at: &str, now_ms: i64) -> String {
    chrono::DateTime::parse_from_rfc3339(created_at).map_or_else(
        |_| created_at.to_string(),
        |date_time| format_relative_time(date_time.timestamp_millis(), now_ms),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn require_text(value: &str, field: &'static str) -> Result<String, CliError> {
    normalize_content(value).ok_or(CliError::EmptyField(field))
}

pub fn optional_text(value: Option<String>) -> Option<String> {
    value.as_deref().and_then(normalize_content)
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, "")?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program)
        .args(parts)
        .arg(file_path)
        .status()
        .map_err(|err| {
            CliError::EditorFailed(format!("`{editor}` could not be started: {err}"))
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("flowspace-note-{}-{now}.md", std::process::id()))
}
