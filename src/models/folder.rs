use serde::{Deserialize, Serialize};

use super::{FolderId, UserId};

/// A top-level container for pages.
///
/// Folders are the root of the containment hierarchy. The owner is set
/// once at creation from the acting principal and never changes; sharing
/// happens through grant rows and the public flag, not ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier from the database.
    pub id: FolderId,
    /// Globally unique folder name.
    pub name: String,
    /// The user who created the folder. Immutable.
    pub owner: UserId,
    /// Whether the folder (and, transitively, its contents) is publicly readable.
    pub is_public: bool,
    /// Soft-delete flag. Deleted folders are hidden from all reads.
    pub is_deleted: bool,
}
