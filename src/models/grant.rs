use serde::{Deserialize, Serialize};

use super::UserId;

/// The three per-resource permission flags a grant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrantFlags {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl GrantFlags {
    /// A view-only grant.
    pub fn view() -> Self {
        Self {
            can_view: true,
            ..Self::default()
        }
    }

    /// A grant carrying all three flags.
    pub fn all() -> Self {
        Self {
            can_view: true,
            can_edit: true,
            can_delete: true,
        }
    }
}

/// A per-user permission row on a single resource.
///
/// At most one grant exists per (resource, user) pair; re-granting
/// updates the existing row in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// The user the grant applies to.
    pub user: UserId,
    /// The flags carried by the grant.
    pub flags: GrantFlags,
}
