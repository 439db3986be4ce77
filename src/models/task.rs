use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{FolderId, PageId, TaskId, UserId};

/// Completion state of a task.
///
/// Serialized with the wire strings the storage layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskStatus {
    /// Returns the storage representation of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Done => "DONE",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status from its storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DONE" => Some(TaskStatus::Done),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single task row.
///
/// Edits made through the version chain create a fresh row whose
/// `previous_version` points at the predecessor; the predecessor stays
/// live as history. `folder` is denormalized and always equals the parent
/// page's folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier from the database.
    pub id: TaskId,
    /// The task's text content.
    pub text: String,
    /// The page this task sits on.
    pub page: PageId,
    /// The page's folder, denormalized for cheap scoping queries.
    pub folder: FolderId,
    /// Completion state.
    pub status: TaskStatus,
    /// The user the task is assigned to.
    pub assignee: UserId,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// When this row was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When this row was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// The user who created this row. Immutable.
    pub created_by: UserId,
    /// The user who performed the most recent mutation.
    pub updated_by: UserId,
    /// Back-link to the row this one revised, if any.
    ///
    /// Exposed as a raw id; turning it into a client-navigable locator is
    /// the presentation layer's job.
    pub previous_version: Option<TaskId>,
}
