use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{FolderId, PageId, UserId};

/// A page of tasks inside a folder.
///
/// The parent folder is exposed as a raw id; embedding folder data into a
/// page representation is a presentation-layer concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier from the database.
    pub id: PageId,
    /// Globally unique page name.
    pub name: String,
    /// The folder this page belongs to.
    pub folder: FolderId,
    /// Whether the page (and its tasks) is publicly readable.
    pub is_public: bool,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// When this page was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When this page was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// The user who created the page. Immutable.
    pub created_by: UserId,
    /// The user who performed the most recent mutation.
    pub updated_by: UserId,
}
