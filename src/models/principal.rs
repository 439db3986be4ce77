use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::UserId;

/// A blanket, model-level capability attached to a principal.
///
/// Capabilities bypass per-resource grant checks for *reads* of the
/// matching entity kind. They never grant write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// See every non-deleted folder.
    ViewAllFolders,
    /// See every non-deleted page.
    ViewAllPages,
    /// See every non-deleted task.
    ViewAllTasks,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ViewAllFolders => "view-all-folders",
            Capability::ViewAllPages => "view-all-pages",
            Capability::ViewAllTasks => "view-all-tasks",
        };
        write!(f, "{name}")
    }
}

impl Capability {
    /// Parses a capability from its kebab-case name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "view-all-folders" => Some(Capability::ViewAllFolders),
            "view-all-pages" => Some(Capability::ViewAllPages),
            "view-all-tasks" => Some(Capability::ViewAllTasks),
            _ => None,
        }
    }
}

/// The acting identity for an operation.
///
/// Authentication happens outside this crate; callers hand the service a
/// ready-made `Principal`. Anonymous principals can only read public
/// entities and can perform no writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Principal {
    /// An unauthenticated caller.
    Anonymous,
    /// An authenticated user with an optional set of blanket capabilities.
    Authenticated {
        user: UserId,
        capabilities: HashSet<Capability>,
    },
}

impl Principal {
    /// Creates an authenticated principal with no blanket capabilities.
    pub fn user(id: UserId) -> Self {
        Principal::Authenticated {
            user: id,
            capabilities: HashSet::new(),
        }
    }

    /// Creates an authenticated principal carrying the given capabilities.
    pub fn with_capabilities(id: UserId, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Principal::Authenticated {
            user: id,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Returns true for authenticated principals.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated { .. })
    }

    /// Returns the authenticated user id, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated { user, .. } => Some(*user),
        }
    }

    /// Returns true if the principal holds the given blanket capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        match self {
            Principal::Anonymous => false,
            Principal::Authenticated { capabilities, .. } => capabilities.contains(&capability),
        }
    }
}
