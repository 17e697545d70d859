//! Task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::record::{EntityKind, Payload};
use crate::db::values::{get_opt_text, get_text, opt_text, text};
use crate::error::{Error, Result};

/// Progress of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }

    /// Next status in the board cycle (TODO -> IN_PROGRESS -> DONE -> TODO)
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Todo => Self::InProgress,
            Self::InProgress => Self::Done,
            Self::Done => Self::Todo,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            _ => Err(Error::InvalidInput(format!("Unknown task status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(Error::InvalidInput(format!("Unknown task priority: {s}"))),
        }
    }
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<String>,
}

impl Task {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_due_date(mut self, due_date: impl Into<String>) -> Self {
        self.due_date = Some(due_date.into());
        self
    }
}

impl Payload for Task {
    const KIND: EntityKind = EntityKind::Tasks;
    const COLUMNS: &'static [&'static str] =
        &["title", "description", "status", "priority", "due_date"];
    const INDEXED: &'static [&'static str] = &["status", "priority", "user_id"];

    fn to_values(&self) -> Vec<libsql::Value> {
        vec![
            text(&self.title),
            opt_text(self.description.as_deref()),
            text(self.status.as_str()),
            text(self.priority.as_str()),
            opt_text(self.due_date.as_deref()),
        ]
    }

    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self> {
        Ok(Self {
            title: get_text(row, offset)?,
            description: get_opt_text(row, offset + 1)?,
            status: get_text(row, offset + 2)?.parse()?,
            priority: get_text(row, offset + 3)?.parse()?,
            due_date: get_opt_text(row, offset + 4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_cycle() {
        assert_eq!(TaskStatus::Todo.next(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::InProgress.next(), TaskStatus::Done);
        assert_eq!(TaskStatus::Done.next(), TaskStatus::Todo);
    }

    #[test]
    fn test_status_parse_accepts_dashes() {
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
    }

    #[test]
    fn test_wire_format() {
        let task = Task::new("Draft proposal").with_priority(TaskPriority::High);
        let body = serde_json::to_value(&task).unwrap();
        assert_eq!(body["status"], "TODO");
        assert_eq!(body["priority"], "HIGH");
    }
}
