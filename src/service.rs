mod access;
mod visibility;

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::error::{Result, ServiceError};
use crate::models::{
    Folder, FolderId, Grant, GrantFlags, Page, PageId, Principal, Task, TaskId, TaskStatus, UserId,
};
use crate::Database;

/// Service layer for the folder/page/task hierarchy.
///
/// `FolioService` owns a [`Database`] and enforces the full authorization
/// model on every operation: read visibility (including blanket
/// capabilities, grant propagation, and public chains), write eligibility,
/// cascading soft-delete, and task version chains. It is UI-independent
/// and driven by an externally supplied [`Principal`].
///
/// # Examples
///
/// ```
/// use folio::{Database, FolioService, Principal, UserId};
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let service = FolioService::new(db);
///
/// let alice = Principal::user(UserId::new(1));
/// let folder = service.create_folder(&alice, "Projects", false)?;
/// assert_eq!(folder.owner, UserId::new(1));
/// # Ok(())
/// # }
/// ```
pub struct FolioService {
    db: Database,
}

/// Fields for creating a page.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    /// Globally unique page name.
    pub name: String,
    /// The folder the page goes into.
    pub folder: FolderId,
    /// Whether the page is publicly readable.
    pub is_public: bool,
}

/// Fields for creating a task.
///
/// The client supplies the target page explicitly; the service resolves
/// it, validates existence, and derives the denormalized folder from the
/// page. An absent page id fails validation before any authorization
/// check runs.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// The task's text content.
    pub text: String,
    /// The page the task goes on. Required.
    pub page: Option<PageId>,
    /// Initial completion state.
    pub status: TaskStatus,
    /// Assignee; defaults to the acting user when `None`.
    pub assignee: Option<UserId>,
}

/// Partial update for a folder. Unset fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderUpdate {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

/// Partial update for a page. Unset fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageUpdate {
    pub name: Option<String>,
    pub is_public: Option<bool>,
}

/// Partial update for a task. Unset fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskUpdate {
    pub text: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<UserId>,
}

const FOLDER_COLUMNS: &str = "f.id, f.name, f.owner_id, f.is_public, f.is_deleted";

const PAGE_COLUMNS: &str = "p.id, p.name, p.folder_id, p.is_public, p.is_deleted, \
     p.created_at, p.updated_at, p.created_by, p.updated_by";

const TASK_COLUMNS: &str = "t.id, t.text, t.page_id, t.folder_id, t.status, t.user_id, \
     t.is_deleted, t.created_at, t.updated_at, t.created_by, t.updated_by, t.previous_version";

impl FolioService {
    /// Creates a new service over the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct access.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Folders ---

    /// Lists the folders visible to the principal.
    ///
    /// Soft-deleted folders never appear. Anonymous principals see only
    /// public folders; a `ViewAllFolders` capability sees everything.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::{Database, FolioService, Principal, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let service = FolioService::new(db);
    ///
    /// let alice = Principal::user(UserId::new(1));
    /// service.create_folder(&alice, "Private", false)?;
    /// service.create_folder(&alice, "Shared", true)?;
    ///
    /// assert_eq!(service.list_folders(&alice)?.len(), 2);
    /// assert_eq!(service.list_folders(&Principal::Anonymous)?.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn list_folders(&self, principal: &Principal) -> Result<Vec<Folder>> {
        let conn = self.db.connection();
        let filter = visibility::folder_filter(principal);

        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders f WHERE {} ORDER BY f.name",
            filter.clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(filter.params.iter()), map_folder)?;

        collect(rows)
    }

    /// Retrieves a single folder.
    ///
    /// Returns `NotFound` when the id does not resolve, the folder is
    /// soft-deleted, or the principal may not see it - the three cases
    /// are indistinguishable to the caller.
    pub fn get_folder(&self, principal: &Principal, id: FolderId) -> Result<Folder> {
        self.visible_folder(principal, id)?
            .ok_or(ServiceError::NotFound)
    }

    /// Creates a folder owned by the acting principal.
    ///
    /// Any authenticated user may create folders; anonymous callers get
    /// `Unauthenticated`. The folder name is globally unique.
    pub fn create_folder(
        &self,
        principal: &Principal,
        name: &str,
        is_public: bool,
    ) -> Result<Folder> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let name = valid_name(name, "folder")?;
        ensure_unique_name(conn, "folders", &name, None)?;

        conn.execute(
            "INSERT INTO folders (name, owner_id, is_public) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, user.get(), is_public],
        )?;

        Ok(Folder {
            id: FolderId::new(conn.last_insert_rowid()),
            name,
            owner: user,
            is_public,
            is_deleted: false,
        })
    }

    /// Updates a folder's name and/or public flag.
    ///
    /// Requires the owner or a `can_edit` folder grant. The owner itself
    /// is immutable.
    pub fn update_folder(
        &self,
        principal: &Principal,
        id: FolderId,
        update: FolderUpdate,
    ) -> Result<Folder> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let mut folder = self
            .visible_folder(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_update_folder(conn, id, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        if let Some(name) = update.name {
            let name = valid_name(&name, "folder")?;
            ensure_unique_name(conn, "folders", &name, Some(id.get()))?;
            folder.name = name;
        }
        if let Some(is_public) = update.is_public {
            folder.is_public = is_public;
        }

        conn.execute(
            "UPDATE folders SET name = ?1, is_public = ?2 WHERE id = ?3",
            rusqlite::params![folder.name, folder.is_public, id.get()],
        )?;

        Ok(folder)
    }

    /// Soft-deletes a folder and everything under it.
    ///
    /// Cascades to every live page in the folder and every task on those
    /// pages. The whole cascade commits atomically: readers never observe
    /// the folder deleted while children are still live.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::{Database, FolioService, NewPage, Principal, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let service = FolioService::new(db);
    /// let alice = Principal::user(UserId::new(1));
    ///
    /// let folder = service.create_folder(&alice, "Old stuff", false)?;
    /// service.create_page(&alice, NewPage {
    ///     name: "Notes".to_string(),
    ///     folder: folder.id,
    ///     is_public: false,
    /// })?;
    ///
    /// service.delete_folder(&alice, folder.id)?;
    /// assert!(service.list_folders(&alice)?.is_empty());
    /// assert!(service.list_pages(&alice)?.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn delete_folder(&self, principal: &Principal, id: FolderId) -> Result<()> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        self.visible_folder(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_delete_folder(conn, id, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        access::cascade_delete_folder(conn, id, user, now_unix())
    }

    fn visible_folder(&self, principal: &Principal, id: FolderId) -> Result<Option<Folder>> {
        let conn = self.db.connection();
        let filter = visibility::folder_filter(principal);

        let sql = format!(
            "SELECT {FOLDER_COLUMNS} FROM folders f WHERE {} AND f.id = {}",
            filter.clause,
            id.get()
        );
        let folder = conn
            .query_row(
                &sql,
                rusqlite::params_from_iter(filter.params.iter()),
                map_folder,
            )
            .optional()?;
        Ok(folder)
    }

    // --- Pages ---

    /// Lists the pages visible to the principal.
    ///
    /// Grant and public visibility propagate down from the parent folder.
    pub fn list_pages(&self, principal: &Principal) -> Result<Vec<Page>> {
        let conn = self.db.connection();
        let filter = visibility::page_filter(principal);

        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages p \
             JOIN folders f ON f.id = p.folder_id \
             WHERE {} ORDER BY p.name",
            filter.clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(filter.params.iter()), map_page)?;

        collect(rows)
    }

    /// Retrieves a single page, or `NotFound` if unresolvable or invisible.
    pub fn get_page(&self, principal: &Principal, id: PageId) -> Result<Page> {
        self.visible_page(principal, id)?
            .ok_or(ServiceError::NotFound)
    }

    /// Creates a page in a folder.
    ///
    /// The acting user must own the folder or hold a grant row on it;
    /// membership suffices for creation. The page name is globally unique.
    pub fn create_page(&self, principal: &Principal, new: NewPage) -> Result<Page> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let name = valid_name(&new.name, "page")?;

        if access::folder_owner(conn, new.folder)?.is_none() {
            return Err(ServiceError::Validation(format!(
                "folder {} does not exist",
                new.folder
            )));
        }
        if !access::can_create_in_folder(conn, new.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        ensure_unique_name(conn, "pages", &name, None)?;

        let now = now_unix();
        conn.execute(
            "INSERT INTO pages (name, folder_id, is_public, created_at, updated_at, created_by, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?5)",
            rusqlite::params![name, new.folder.get(), new.is_public, now, user.get()],
        )?;

        Ok(Page {
            id: PageId::new(conn.last_insert_rowid()),
            name,
            folder: new.folder,
            is_public: new.is_public,
            is_deleted: false,
            created_at: from_unix(now),
            updated_at: from_unix(now),
            created_by: user,
            updated_by: user,
        })
    }

    /// Updates a page's name and/or public flag.
    ///
    /// `updated_by`/`updated_at` refresh on every mutation.
    pub fn update_page(
        &self,
        principal: &Principal,
        id: PageId,
        update: PageUpdate,
    ) -> Result<Page> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let mut page = self
            .visible_page(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_update_page(conn, id, page.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        if let Some(name) = update.name {
            let name = valid_name(&name, "page")?;
            ensure_unique_name(conn, "pages", &name, Some(id.get()))?;
            page.name = name;
        }
        if let Some(is_public) = update.is_public {
            page.is_public = is_public;
        }

        let now = now_unix();
        conn.execute(
            "UPDATE pages SET name = ?1, is_public = ?2, updated_at = ?3, updated_by = ?4 WHERE id = ?5",
            rusqlite::params![page.name, page.is_public, now, user.get(), id.get()],
        )?;

        page.updated_at = from_unix(now);
        page.updated_by = user;
        Ok(page)
    }

    /// Soft-deletes a page and every task on it, atomically.
    pub fn delete_page(&self, principal: &Principal, id: PageId) -> Result<()> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let page = self
            .visible_page(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_delete_page(conn, id, page.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        access::cascade_delete_page(conn, id, user, now_unix())
    }

    fn visible_page(&self, principal: &Principal, id: PageId) -> Result<Option<Page>> {
        let conn = self.db.connection();
        let filter = visibility::page_filter(principal);

        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages p \
             JOIN folders f ON f.id = p.folder_id \
             WHERE {} AND p.id = {}",
            filter.clause,
            id.get()
        );
        let page = conn
            .query_row(
                &sql,
                rusqlite::params_from_iter(filter.params.iter()),
                map_page,
            )
            .optional()?;
        Ok(page)
    }

    // --- Tasks ---

    /// Lists the tasks visible to the principal.
    pub fn list_tasks(&self, principal: &Principal) -> Result<Vec<Task>> {
        let conn = self.db.connection();
        let filter = visibility::task_filter(principal);

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN pages p ON p.id = t.page_id \
             JOIN folders f ON f.id = t.folder_id \
             WHERE {} ORDER BY t.id",
            filter.clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(filter.params.iter()), map_task)?;

        collect(rows)
    }

    /// Retrieves a single task row, or `NotFound` if unresolvable or invisible.
    pub fn get_task(&self, principal: &Principal, id: TaskId) -> Result<Task> {
        self.visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)
    }

    /// Creates a task on a page.
    ///
    /// The page id is required and must resolve to a live page
    /// (`Validation` otherwise). The acting user must own the page's
    /// folder, hold a grant row on that folder, or the page must be
    /// public. The denormalized folder reference is derived server-side.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::{Database, FolioService, NewPage, NewTask, Principal, TaskStatus, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let service = FolioService::new(db);
    /// let alice = Principal::user(UserId::new(1));
    ///
    /// let folder = service.create_folder(&alice, "Home", false)?;
    /// let page = service.create_page(&alice, NewPage {
    ///     name: "Chores".to_string(),
    ///     folder: folder.id,
    ///     is_public: false,
    /// })?;
    ///
    /// let task = service.create_task(&alice, NewTask {
    ///     text: "Water the plants".to_string(),
    ///     page: Some(page.id),
    ///     status: TaskStatus::InProgress,
    ///     assignee: None,
    /// })?;
    /// assert_eq!(task.folder, folder.id);
    /// assert_eq!(task.assignee, UserId::new(1));
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_task(&self, principal: &Principal, new: NewTask) -> Result<Task> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        if new.text.trim().is_empty() {
            return Err(ServiceError::Validation(
                "task text cannot be empty".to_string(),
            ));
        }
        let page_id = new
            .page
            .ok_or_else(|| ServiceError::Validation("task page is required".to_string()))?;

        let target: Option<(i64, bool)> = conn
            .query_row(
                "SELECT folder_id, is_public FROM pages WHERE id = ?1 AND is_deleted = 0",
                [page_id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (folder_id, page_public) = target.ok_or_else(|| {
            ServiceError::Validation(format!("page {page_id} does not exist"))
        })?;
        let folder = FolderId::new(folder_id);

        if !(access::can_create_in_folder(conn, folder, user)? || page_public) {
            return Err(ServiceError::PermissionDenied);
        }

        let assignee = new.assignee.unwrap_or(user);
        let now = now_unix();
        conn.execute(
            "INSERT INTO tasks (text, page_id, folder_id, status, user_id, created_at, updated_at, created_by, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?7)",
            rusqlite::params![
                new.text,
                page_id.get(),
                folder.get(),
                new.status.as_str(),
                assignee.get(),
                now,
                user.get(),
            ],
        )?;

        Ok(Task {
            id: TaskId::new(conn.last_insert_rowid()),
            text: new.text,
            page: page_id,
            folder,
            status: new.status,
            assignee,
            is_deleted: false,
            created_at: from_unix(now),
            updated_at: from_unix(now),
            created_by: user,
            updated_by: user,
            previous_version: None,
        })
    }

    /// Updates a task row in place.
    ///
    /// Use [`FolioService::revise_task`] instead to keep the prior state
    /// as history.
    pub fn update_task(
        &self,
        principal: &Principal,
        id: TaskId,
        update: TaskUpdate,
    ) -> Result<Task> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let mut task = self
            .visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_update_task(conn, id, task.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        apply_task_update(&mut task, update)?;

        let now = now_unix();
        conn.execute(
            "UPDATE tasks SET text = ?1, status = ?2, user_id = ?3, updated_at = ?4, updated_by = ?5 WHERE id = ?6",
            rusqlite::params![
                task.text,
                task.status.as_str(),
                task.assignee.get(),
                now,
                user.get(),
                id.get(),
            ],
        )?;

        task.updated_at = from_unix(now);
        task.updated_by = user;
        Ok(task)
    }

    /// Applies an edit as a new version of the task.
    ///
    /// Inserts a fresh row whose `previous_version` points at the current
    /// head of the chain; the prior row stays live and unchanged. Editing
    /// any row of a chain always revises the head, keeping the chain
    /// linear.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::{Database, FolioService, NewPage, NewTask, Principal, TaskStatus, TaskUpdate, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let service = FolioService::new(db);
    /// let alice = Principal::user(UserId::new(1));
    ///
    /// let folder = service.create_folder(&alice, "Home", false)?;
    /// let page = service.create_page(&alice, NewPage {
    ///     name: "Chores".to_string(),
    ///     folder: folder.id,
    ///     is_public: false,
    /// })?;
    /// let task = service.create_task(&alice, NewTask {
    ///     text: "Water plants".to_string(),
    ///     page: Some(page.id),
    ///     status: TaskStatus::InProgress,
    ///     assignee: None,
    /// })?;
    ///
    /// let revised = service.revise_task(&alice, task.id, TaskUpdate {
    ///     status: Some(TaskStatus::Done),
    ///     ..Default::default()
    /// })?;
    /// assert_eq!(revised.previous_version, Some(task.id));
    ///
    /// let history = service.task_history(&alice, task.id)?;
    /// assert_eq!(history.len(), 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn revise_task(
        &self,
        principal: &Principal,
        id: TaskId,
        update: TaskUpdate,
    ) -> Result<Task> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let task = self
            .visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_update_task(conn, id, task.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        conn.execute("BEGIN IMMEDIATE TRANSACTION", [])?;

        let result: Result<Task> = (|| {
            let head_id = resolve_head(conn, id)?;
            let mut head = fetch_task(conn, head_id)?.ok_or(ServiceError::NotFound)?;

            apply_task_update(&mut head, update)?;

            let now = now_unix();
            conn.execute(
                "INSERT INTO tasks (text, page_id, folder_id, status, user_id, created_at, updated_at, created_by, updated_by, previous_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?7, ?8)",
                rusqlite::params![
                    head.text,
                    head.page.get(),
                    head.folder.get(),
                    head.status.as_str(),
                    head.assignee.get(),
                    now,
                    user.get(),
                    head_id.get(),
                ],
            )?;

            Ok(Task {
                id: TaskId::new(conn.last_insert_rowid()),
                text: head.text,
                page: head.page,
                folder: head.folder,
                status: head.status,
                assignee: head.assignee,
                is_deleted: false,
                created_at: from_unix(now),
                updated_at: from_unix(now),
                created_by: user,
                updated_by: user,
                previous_version: Some(head_id),
            })
        })();

        match result {
            Ok(task) => {
                conn.execute("COMMIT", [])?;
                Ok(task)
            }
            Err(e) => {
                conn.execute("ROLLBACK", []).ok();
                Err(e)
            }
        }
    }

    /// Resolves the most recent version in a task's chain.
    ///
    /// Any row of the chain can be passed in; the walk follows successor
    /// links forward until no row points past the current one.
    pub fn current_head(&self, principal: &Principal, id: TaskId) -> Result<Task> {
        let conn = self.db.connection();

        self.visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        let head_id = resolve_head(conn, id)?;
        fetch_task(conn, head_id)?.ok_or(ServiceError::NotFound)
    }

    /// Returns a task's version chain, oldest to newest.
    ///
    /// The walk starts at the chain's head (regardless of which row was
    /// passed in) and follows `previous_version` links backward.
    pub fn task_history(&self, principal: &Principal, id: TaskId) -> Result<Vec<Task>> {
        let conn = self.db.connection();

        self.visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        let head_id = resolve_head(conn, id)?;

        let mut chain = Vec::new();
        let mut cursor = Some(head_id);
        while let Some(current) = cursor {
            let task = fetch_task(conn, current)?.ok_or(ServiceError::NotFound)?;
            cursor = task.previous_version;
            chain.push(task);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Soft-deletes a task row.
    ///
    /// Earlier versions in the chain stay live; the chain itself survives
    /// deletion of its head.
    pub fn delete_task(&self, principal: &Principal, id: TaskId) -> Result<()> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        let task = self
            .visible_task(principal, id)?
            .ok_or(ServiceError::NotFound)?;

        if !access::can_delete_task(conn, id, task.folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }

        conn.execute(
            "UPDATE tasks SET is_deleted = 1, updated_at = ?1, updated_by = ?2 WHERE id = ?3",
            rusqlite::params![now_unix(), user.get(), id.get()],
        )?;
        Ok(())
    }

    fn visible_task(&self, principal: &Principal, id: TaskId) -> Result<Option<Task>> {
        let conn = self.db.connection();
        let filter = visibility::task_filter(principal);

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             JOIN pages p ON p.id = t.page_id \
             JOIN folders f ON f.id = t.folder_id \
             WHERE {} AND t.id = {}",
            filter.clause,
            id.get()
        );
        let task = conn
            .query_row(
                &sql,
                rusqlite::params_from_iter(filter.params.iter()),
                map_task,
            )
            .optional()?;
        Ok(task)
    }

    // --- Grants ---

    /// Grants a user access to a folder, or updates their existing grant.
    ///
    /// Only the folder's owner or a `can_edit` delegate may manage
    /// grants. At most one grant row exists per (folder, user) pair;
    /// re-granting overwrites the flags instead of adding a row.
    ///
    /// # Examples
    ///
    /// ```
    /// use folio::{Database, FolioService, GrantFlags, Principal, UserId};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// let service = FolioService::new(db);
    /// let alice = Principal::user(UserId::new(1));
    /// let bob = Principal::user(UserId::new(2));
    ///
    /// let folder = service.create_folder(&alice, "Team", false)?;
    /// assert!(service.list_folders(&bob)?.is_empty());
    ///
    /// service.grant_folder_access(&alice, folder.id, UserId::new(2), GrantFlags::view())?;
    /// assert_eq!(service.list_folders(&bob)?.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn grant_folder_access(
        &self,
        principal: &Principal,
        folder: FolderId,
        user: UserId,
        flags: GrantFlags,
    ) -> Result<Grant> {
        let conn = self.db.connection();
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "INSERT INTO folder_permissions (folder_id, user_id, can_view, can_edit, can_delete)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(folder_id, user_id) DO UPDATE SET
                 can_view = excluded.can_view,
                 can_edit = excluded.can_edit,
                 can_delete = excluded.can_delete",
            rusqlite::params![
                folder.get(),
                user.get(),
                flags.can_view,
                flags.can_edit,
                flags.can_delete,
            ],
        )?;

        Ok(Grant { user, flags })
    }

    /// Revokes a user's folder grant. Idempotent.
    pub fn revoke_folder_access(
        &self,
        principal: &Principal,
        folder: FolderId,
        user: UserId,
    ) -> Result<()> {
        let conn = self.db.connection();
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "DELETE FROM folder_permissions WHERE folder_id = ?1 AND user_id = ?2",
            [folder.get(), user.get()],
        )?;
        Ok(())
    }

    /// Lists the grant rows on a folder. Owner-or-delegate only.
    pub fn folder_grants(&self, principal: &Principal, folder: FolderId) -> Result<Vec<Grant>> {
        let conn = self.db.connection();
        self.authorize_grant_management(principal, folder)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, can_view, can_edit, can_delete
             FROM folder_permissions WHERE folder_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map([folder.get()], map_grant)?;

        collect(rows)
    }

    /// Grants a user access to a page, or updates their existing grant.
    ///
    /// Authorized by the containing folder's owner-or-delegate.
    pub fn grant_page_access(
        &self,
        principal: &Principal,
        page: PageId,
        user: UserId,
        flags: GrantFlags,
    ) -> Result<Grant> {
        let conn = self.db.connection();
        let folder = self.page_folder(page)?;
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "INSERT INTO page_permissions (page_id, user_id, can_view, can_edit, can_delete)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(page_id, user_id) DO UPDATE SET
                 can_view = excluded.can_view,
                 can_edit = excluded.can_edit,
                 can_delete = excluded.can_delete",
            rusqlite::params![
                page.get(),
                user.get(),
                flags.can_view,
                flags.can_edit,
                flags.can_delete,
            ],
        )?;

        Ok(Grant { user, flags })
    }

    /// Revokes a user's page grant. Idempotent.
    pub fn revoke_page_access(
        &self,
        principal: &Principal,
        page: PageId,
        user: UserId,
    ) -> Result<()> {
        let conn = self.db.connection();
        let folder = self.page_folder(page)?;
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "DELETE FROM page_permissions WHERE page_id = ?1 AND user_id = ?2",
            [page.get(), user.get()],
        )?;
        Ok(())
    }

    /// Lists the grant rows on a page. Owner-or-delegate only.
    pub fn page_grants(&self, principal: &Principal, page: PageId) -> Result<Vec<Grant>> {
        let conn = self.db.connection();
        let folder = self.page_folder(page)?;
        self.authorize_grant_management(principal, folder)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, can_view, can_edit, can_delete
             FROM page_permissions WHERE page_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map([page.get()], map_grant)?;

        collect(rows)
    }

    /// Grants a user access to a task row, or updates their existing grant.
    pub fn grant_task_access(
        &self,
        principal: &Principal,
        task: TaskId,
        user: UserId,
        flags: GrantFlags,
    ) -> Result<Grant> {
        let conn = self.db.connection();
        let folder = self.task_folder(task)?;
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "INSERT INTO task_permissions (task_id, user_id, can_view, can_edit, can_delete)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(task_id, user_id) DO UPDATE SET
                 can_view = excluded.can_view,
                 can_edit = excluded.can_edit,
                 can_delete = excluded.can_delete",
            rusqlite::params![
                task.get(),
                user.get(),
                flags.can_view,
                flags.can_edit,
                flags.can_delete,
            ],
        )?;

        Ok(Grant { user, flags })
    }

    /// Revokes a user's task grant. Idempotent.
    pub fn revoke_task_access(
        &self,
        principal: &Principal,
        task: TaskId,
        user: UserId,
    ) -> Result<()> {
        let conn = self.db.connection();
        let folder = self.task_folder(task)?;
        self.authorize_grant_management(principal, folder)?;

        conn.execute(
            "DELETE FROM task_permissions WHERE task_id = ?1 AND user_id = ?2",
            [task.get(), user.get()],
        )?;
        Ok(())
    }

    /// Lists the grant rows on a task. Owner-or-delegate only.
    pub fn task_grants(&self, principal: &Principal, task: TaskId) -> Result<Vec<Grant>> {
        let conn = self.db.connection();
        let folder = self.task_folder(task)?;
        self.authorize_grant_management(principal, folder)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, can_view, can_edit, can_delete
             FROM task_permissions WHERE task_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map([task.get()], map_grant)?;

        collect(rows)
    }

    fn authorize_grant_management(&self, principal: &Principal, folder: FolderId) -> Result<()> {
        let user = access::require_user(principal)?;
        let conn = self.db.connection();

        if access::folder_owner(conn, folder)?.is_none() {
            return Err(ServiceError::Validation(format!(
                "folder {folder} does not exist"
            )));
        }
        if !access::can_manage_grants(conn, folder, user)? {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(())
    }

    fn page_folder(&self, page: PageId) -> Result<FolderId> {
        let conn = self.db.connection();
        let folder: Option<i64> = conn
            .query_row(
                "SELECT folder_id FROM pages WHERE id = ?1 AND is_deleted = 0",
                [page.get()],
                |row| row.get(0),
            )
            .optional()?;
        folder
            .map(FolderId::new)
            .ok_or_else(|| ServiceError::Validation(format!("page {page} does not exist")))
    }

    fn task_folder(&self, task: TaskId) -> Result<FolderId> {
        let conn = self.db.connection();
        let folder: Option<i64> = conn
            .query_row(
                "SELECT folder_id FROM tasks WHERE id = ?1 AND is_deleted = 0",
                [task.get()],
                |row| row.get(0),
            )
            .optional()?;
        folder
            .map(FolderId::new)
            .ok_or_else(|| ServiceError::Validation(format!("task {task} does not exist")))
    }
}

// --- Row mapping and small helpers ---

fn map_folder(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId::new(row.get(0)?),
        name: row.get(1)?,
        owner: UserId::new(row.get(2)?),
        is_public: row.get(3)?,
        is_deleted: row.get(4)?,
    })
}

fn map_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: PageId::new(row.get(0)?),
        name: row.get(1)?,
        folder: FolderId::new(row.get(2)?),
        is_public: row.get(3)?,
        is_deleted: row.get(4)?,
        created_at: from_unix(row.get(5)?),
        updated_at: from_unix(row.get(6)?),
        created_by: UserId::new(row.get(7)?),
        updated_by: UserId::new(row.get(8)?),
    })
}

fn map_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(4)?;
    let status = TaskStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown task status: {status}").into(),
        )
    })?;

    let previous: Option<i64> = row.get(11)?;
    Ok(Task {
        id: TaskId::new(row.get(0)?),
        text: row.get(1)?,
        page: PageId::new(row.get(2)?),
        folder: FolderId::new(row.get(3)?),
        status,
        assignee: UserId::new(row.get(5)?),
        is_deleted: row.get(6)?,
        created_at: from_unix(row.get(7)?),
        updated_at: from_unix(row.get(8)?),
        created_by: UserId::new(row.get(9)?),
        updated_by: UserId::new(row.get(10)?),
        previous_version: previous.map(TaskId::new),
    })
}

fn map_grant(row: &Row<'_>) -> rusqlite::Result<Grant> {
    Ok(Grant {
        user: UserId::new(row.get(0)?),
        flags: GrantFlags {
            can_view: row.get(1)?,
            can_edit: row.get(2)?,
            can_delete: row.get(3)?,
        },
    })
}

fn fetch_task(conn: &Connection, id: TaskId) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1");
    let task = conn.query_row(&sql, [id.get()], map_task).optional()?;
    Ok(task)
}

/// Walks successor links forward to the tip of a version chain.
///
/// A successor is the row whose `previous_version` points at the current
/// one. Chains are linear by construction (revisions always attach at the
/// head); if a fork ever exists the newest branch wins.
fn resolve_head(conn: &Connection, id: TaskId) -> Result<TaskId> {
    let mut current = id;
    loop {
        let successor: Option<i64> = conn
            .query_row(
                "SELECT id FROM tasks WHERE previous_version = ?1 ORDER BY id DESC LIMIT 1",
                [current.get()],
                |row| row.get(0),
            )
            .optional()?;
        match successor {
            Some(next) => current = TaskId::new(next),
            None => return Ok(current),
        }
    }
}

fn apply_task_update(task: &mut Task, update: TaskUpdate) -> Result<()> {
    if let Some(text) = update.text {
        if text.trim().is_empty() {
            return Err(ServiceError::Validation(
                "task text cannot be empty".to_string(),
            ));
        }
        task.text = text;
    }
    if let Some(status) = update.status {
        task.status = status;
    }
    if let Some(assignee) = update.assignee {
        task.assignee = assignee;
    }
    Ok(())
}

fn valid_name(name: &str, kind: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!(
            "{kind} name cannot be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// Pre-checks global name uniqueness so duplicates surface as a
/// validation error rather than a raw constraint violation. Soft-deleted
/// rows still hold their names (the UNIQUE index covers them).
fn ensure_unique_name(
    conn: &Connection,
    table: &str,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<()> {
    let sql = match exclude_id {
        Some(id) => format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE name = ?1 AND id != {id})"
        ),
        None => format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE name = ?1)"),
    };
    let taken: bool = conn.query_row(&sql, [name], |row| row.get(0))?;
    if taken {
        return Err(ServiceError::Validation(format!(
            "{} name already in use",
            table.trim_end_matches('s')
        )));
    }
    Ok(())
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

// Timestamps are always written from now_utc, so conversion back cannot
// leave the representable range.
fn from_unix(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
#[path = "service/tests.rs"]
mod tests;
