//! Core data model for the tally tracker
//!
//! Records are plain serde-serializable structs; they travel unchanged between
//! the store, the HTTP API, and the assistant's context snapshot. Mutation goes
//! through patch structs so callers only touch the fields they mean to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a nested-option field so that an explicit JSON `null` becomes
/// `Some(None)` while an absent field (via `#[serde(default)]`) stays `None`.
/// This is the standard serde idiom for distinguishing "cleared" from
/// "untouched" on `Option<Option<T>>` patch fields.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// A display grouping for projects. Categories have no lifecycle coupling to
/// tasks; a project references one by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub status: ProjectStatus,
    /// Derived from root tasks once any exist; see `Tracker::recalc_project`.
    pub percent_complete: u8,
    pub roadblocks: Option<String>,
    pub ai_suggestions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Task lifecycle state.
///
/// The three known states cover everything the tracker itself writes. The
/// `Custom` tail deserializes any other string verbatim so a status a user set
/// by hand (e.g. "blocked") survives round trips and is never clobbered by an
/// aggregate recomputation that lands on zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    #[serde(untagged)]
    Custom(String),
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in-progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Custom(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    /// Same-table parent reference; `None` marks a root task.
    pub parent_task_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Authoritative only on leaves; derived from children everywhere else.
    pub percent_complete: u8,
    pub is_completed: bool,
    pub status: TaskStatus,
    pub roadblocks: Option<String>,
    pub ai_suggestions: Option<String>,
    /// Sibling ordering key. Duplicates are allowed; ties keep insertion order.
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// --- Creation inputs --- //

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub project_id: String,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

// --- Partial updates --- //

/// Field-level patch for a task. `None` leaves a field alone. The nested
/// options on `roadblocks`/`ai_suggestions` distinguish "untouched" from
/// "explicitly cleared": `Some(None)` writes a null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub percent_complete: Option<u8>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub roadblocks: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ai_suggestions: Option<Option<String>>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

/// Field-level patch for a project, same conventions as [`TaskPatch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub percent_complete: Option<u8>,
    #[serde(default, deserialize_with = "double_option")]
    pub roadblocks: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ai_suggestions: Option<Option<String>>,
}
