//! Read-visibility predicates.
//!
//! Each function returns a SQL WHERE fragment plus its positional
//! parameters, describing exactly which rows of one entity kind the given
//! principal may see. The fragments assume the aliases used by the
//! service queries: `f` for folders, `p` for pages, `t` for tasks (pages
//! and tasks are always queried joined to their ancestor rows).
//!
//! Visibility is a disjunction - any satisfied branch grants access -
//! always conjoined with `is_deleted = 0`:
//!
//! 1. a blanket `ViewAll*` capability on the principal;
//! 2. ownership of the folder at the root of the containment chain;
//! 3. an explicit grant: `can_view` on the entity itself, or membership
//!    in an ancestor's grant table (grants propagate downward);
//! 4. the public flag on the entity or any ancestor (public propagates
//!    downward exactly like grants).
//!
//! Anonymous principals get branch 4 only.
//!
//! Write eligibility is stricter and lives in [`super::access`].

use crate::models::{Capability, Principal};

/// A WHERE fragment and the parameters it binds.
///
/// The authenticated user id is bound as `?1` and may appear several
/// times in the fragment; SQLite binds a repeated `?1` once.
pub(crate) struct Filter {
    pub clause: &'static str,
    pub params: Vec<i64>,
}

impl Filter {
    fn for_user(clause: &'static str, user: i64) -> Self {
        Self {
            clause,
            params: vec![user],
        }
    }

    fn public(clause: &'static str) -> Self {
        Self {
            clause,
            params: Vec::new(),
        }
    }
}

const FOLDER_ALL: &str = "f.is_deleted = 0";

const FOLDER_FOR_USER: &str = "f.is_deleted = 0 AND (\
     f.owner_id = ?1 \
     OR EXISTS (SELECT 1 FROM folder_permissions fp \
                WHERE fp.folder_id = f.id AND fp.user_id = ?1 AND fp.can_view = 1) \
     OR f.is_public = 1)";

const FOLDER_PUBLIC: &str = "f.is_deleted = 0 AND f.is_public = 1";

/// Folder visibility for the given principal.
pub(crate) fn folder_filter(principal: &Principal) -> Filter {
    match principal.user_id() {
        _ if principal.has_capability(Capability::ViewAllFolders) => Filter::public(FOLDER_ALL),
        Some(user) => Filter::for_user(FOLDER_FOR_USER, user.get()),
        None => Filter::public(FOLDER_PUBLIC),
    }
}

const PAGE_ALL: &str = "p.is_deleted = 0";

// Grant branch: can_view on the page itself, or plain membership in the
// parent folder's grant table (ancestor grants propagate downward).
const PAGE_FOR_USER: &str = "p.is_deleted = 0 AND (\
     f.owner_id = ?1 \
     OR EXISTS (SELECT 1 FROM page_permissions pp \
                WHERE pp.page_id = p.id AND pp.user_id = ?1 AND pp.can_view = 1) \
     OR EXISTS (SELECT 1 FROM folder_permissions fp \
                WHERE fp.folder_id = p.folder_id AND fp.user_id = ?1) \
     OR p.is_public = 1 OR f.is_public = 1)";

const PAGE_PUBLIC: &str = "p.is_deleted = 0 AND (p.is_public = 1 OR f.is_public = 1)";

/// Page visibility for the given principal.
///
/// Assumes the query joins `pages p` to `folders f ON f.id = p.folder_id`.
pub(crate) fn page_filter(principal: &Principal) -> Filter {
    match principal.user_id() {
        _ if principal.has_capability(Capability::ViewAllPages) => Filter::public(PAGE_ALL),
        Some(user) => Filter::for_user(PAGE_FOR_USER, user.get()),
        None => Filter::public(PAGE_PUBLIC),
    }
}

const TASK_ALL: &str = "t.is_deleted = 0";

// Tasks have no public flag of their own; the public branch is the
// ancestor chain (page or folder).
const TASK_FOR_USER: &str = "t.is_deleted = 0 AND (\
     f.owner_id = ?1 \
     OR EXISTS (SELECT 1 FROM task_permissions tp \
                WHERE tp.task_id = t.id AND tp.user_id = ?1 AND tp.can_view = 1) \
     OR EXISTS (SELECT 1 FROM page_permissions pp \
                WHERE pp.page_id = t.page_id AND pp.user_id = ?1) \
     OR EXISTS (SELECT 1 FROM folder_permissions fp \
                WHERE fp.folder_id = t.folder_id AND fp.user_id = ?1) \
     OR p.is_public = 1 OR f.is_public = 1)";

const TASK_PUBLIC: &str = "t.is_deleted = 0 AND (p.is_public = 1 OR f.is_public = 1)";

/// Task visibility for the given principal.
///
/// Assumes the query joins `tasks t` to `pages p ON p.id = t.page_id` and
/// `folders f ON f.id = t.folder_id`.
pub(crate) fn task_filter(principal: &Principal) -> Filter {
    match principal.user_id() {
        _ if principal.has_capability(Capability::ViewAllTasks) => Filter::public(TASK_ALL),
        Some(user) => Filter::for_user(TASK_FOR_USER, user.get()),
        None => Filter::public(TASK_PUBLIC),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    #[test]
    fn anonymous_filters_bind_no_params() {
        let p = Principal::Anonymous;
        assert!(folder_filter(&p).params.is_empty());
        assert!(page_filter(&p).params.is_empty());
        assert!(task_filter(&p).params.is_empty());
    }

    #[test]
    fn blanket_capability_drops_all_branches_but_deletion() {
        let p = Principal::with_capabilities(UserId::new(3), [Capability::ViewAllTasks]);
        let filter = task_filter(&p);
        assert_eq!(filter.clause, "t.is_deleted = 0");
        assert!(filter.params.is_empty());

        // The capability is kind-scoped: folders still get the full filter
        let folder = folder_filter(&p);
        assert_eq!(folder.params, vec![3]);
    }

    #[test]
    fn authenticated_filters_bind_the_user_once() {
        let p = Principal::user(UserId::new(9));
        assert_eq!(folder_filter(&p).params, vec![9]);
        assert_eq!(page_filter(&p).params, vec![9]);
        assert_eq!(task_filter(&p).params, vec![9]);
    }
}
