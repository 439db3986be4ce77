//! Write and delete eligibility checks, plus the cascading soft-delete.
//!
//! Writes are stricter than reads: a public flag never grants a write
//! (with the single exception of task creation on a public page), and
//! blanket view capabilities grant nothing here.

use rusqlite::Connection;

use crate::error::{Result, ServiceError};
use crate::models::{FolderId, PageId, Principal, TaskId, UserId};

/// Rejects anonymous principals, returning the acting user otherwise.
pub(crate) fn require_user(principal: &Principal) -> Result<UserId> {
    principal.user_id().ok_or(ServiceError::Unauthenticated)
}

/// Returns the owner of a live folder, or None if the folder does not
/// exist or is soft-deleted.
pub(crate) fn folder_owner(conn: &Connection, folder: FolderId) -> Result<Option<UserId>> {
    use rusqlite::OptionalExtension;

    let owner: Option<i64> = conn
        .query_row(
            "SELECT owner_id FROM folders WHERE id = ?1 AND is_deleted = 0",
            [folder.get()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner.map(UserId::new))
}

fn has_folder_grant_row(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM folder_permissions WHERE folder_id = ?1 AND user_id = ?2)",
        [folder.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn folder_grant_can_edit(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM folder_permissions \
         WHERE folder_id = ?1 AND user_id = ?2 AND can_edit = 1)",
        [folder.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn folder_grant_can_delete(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM folder_permissions \
         WHERE folder_id = ?1 AND user_id = ?2 AND can_delete = 1)",
        [folder.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn page_grant_can_edit(conn: &Connection, page: PageId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM page_permissions \
         WHERE page_id = ?1 AND user_id = ?2 AND can_edit = 1)",
        [page.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn page_grant_can_delete(conn: &Connection, page: PageId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM page_permissions \
         WHERE page_id = ?1 AND user_id = ?2 AND can_delete = 1)",
        [page.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn task_grant_can_edit(conn: &Connection, task: TaskId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_permissions \
         WHERE task_id = ?1 AND user_id = ?2 AND can_edit = 1)",
        [task.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn task_grant_can_delete(conn: &Connection, task: TaskId, user: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_permissions \
         WHERE task_id = ?1 AND user_id = ?2 AND can_delete = 1)",
        [task.get(), user.get()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Create-in-folder eligibility: the folder's owner, or any grant row on
/// the folder. Membership suffices; `can_edit` is not re-verified at the
/// folder level for creation.
pub(crate) fn can_create_in_folder(
    conn: &Connection,
    folder: FolderId,
    user: UserId,
) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => has_folder_grant_row(conn, folder, user),
    }
}

/// Folder update eligibility: owner or a `can_edit` folder grant.
pub(crate) fn can_update_folder(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => folder_grant_can_edit(conn, folder, user),
    }
}

/// Folder delete eligibility: owner or a `can_delete` folder grant.
pub(crate) fn can_delete_folder(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => folder_grant_can_delete(conn, folder, user),
    }
}

/// Page update eligibility: root-folder owner, folder-grant membership,
/// or a `can_edit` grant on the page itself.
pub(crate) fn can_update_page(
    conn: &Connection,
    page: PageId,
    folder: FolderId,
    user: UserId,
) -> Result<bool> {
    if can_create_in_folder(conn, folder, user)? {
        return Ok(true);
    }
    page_grant_can_edit(conn, page, user)
}

/// Page delete eligibility: root-folder owner, a `can_delete` grant on
/// the page, or a `can_delete` folder grant.
pub(crate) fn can_delete_page(
    conn: &Connection,
    page: PageId,
    folder: FolderId,
    user: UserId,
) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => {
            Ok(page_grant_can_delete(conn, page, user)?
                || folder_grant_can_delete(conn, folder, user)?)
        }
    }
}

/// Task update eligibility: root-folder owner, folder-grant membership,
/// or a `can_edit` grant on the task itself.
pub(crate) fn can_update_task(
    conn: &Connection,
    task: TaskId,
    folder: FolderId,
    user: UserId,
) -> Result<bool> {
    if can_create_in_folder(conn, folder, user)? {
        return Ok(true);
    }
    task_grant_can_edit(conn, task, user)
}

/// Task delete eligibility: root-folder owner, a `can_delete` grant on
/// the task, or a `can_delete` folder grant.
pub(crate) fn can_delete_task(
    conn: &Connection,
    task: TaskId,
    folder: FolderId,
    user: UserId,
) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => {
            Ok(task_grant_can_delete(conn, task, user)?
                || folder_grant_can_delete(conn, folder, user)?)
        }
    }
}

/// Grant management eligibility: the containing folder's owner, or a
/// delegate holding a `can_edit` grant on that folder.
pub(crate) fn can_manage_grants(conn: &Connection, folder: FolderId, user: UserId) -> Result<bool> {
    match folder_owner(conn, folder)? {
        None => Ok(false),
        Some(owner) if owner == user => Ok(true),
        Some(_) => folder_grant_can_edit(conn, folder, user),
    }
}

/// Soft-deletes a folder and every live page and task under it.
///
/// Descendant ids are collected first, then every flag is flipped inside
/// one transaction, so a concurrent reader never observes the folder
/// deleted while children are still live. On any failure the transaction
/// rolls back and no flag sticks.
pub(crate) fn cascade_delete_folder(
    conn: &Connection,
    folder: FolderId,
    actor: UserId,
    now: i64,
) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE TRANSACTION", [])?;

    let result: Result<()> = (|| {
        let page_ids = collect_ids(
            conn,
            "SELECT id FROM pages WHERE folder_id = ?1 AND is_deleted = 0",
            folder.get(),
        )?;
        let task_ids = collect_ids(
            conn,
            "SELECT id FROM tasks WHERE folder_id = ?1 AND is_deleted = 0",
            folder.get(),
        )?;

        flag_deleted(conn, "tasks", &task_ids, actor, now)?;
        flag_deleted(conn, "pages", &page_ids, actor, now)?;
        conn.execute(
            "UPDATE folders SET is_deleted = 1 WHERE id = ?1",
            [folder.get()],
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute("COMMIT", [])?;
            Ok(())
        }
        Err(e) => {
            conn.execute("ROLLBACK", []).ok();
            Err(e)
        }
    }
}

/// Soft-deletes a page and every live task on it, atomically.
pub(crate) fn cascade_delete_page(
    conn: &Connection,
    page: PageId,
    actor: UserId,
    now: i64,
) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE TRANSACTION", [])?;

    let result: Result<()> = (|| {
        let task_ids = collect_ids(
            conn,
            "SELECT id FROM tasks WHERE page_id = ?1 AND is_deleted = 0",
            page.get(),
        )?;

        flag_deleted(conn, "tasks", &task_ids, actor, now)?;
        flag_deleted(conn, "pages", &[page.get()], actor, now)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute("COMMIT", [])?;
            Ok(())
        }
        Err(e) => {
            conn.execute("ROLLBACK", []).ok();
            Err(e)
        }
    }
}

fn collect_ids(conn: &Connection, sql: &str, param: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([param], |row| row.get::<_, i64>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn flag_deleted(
    conn: &Connection,
    table: &str,
    ids: &[i64],
    actor: UserId,
    now: i64,
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "UPDATE {} SET is_deleted = 1, updated_at = ?, updated_by = ? WHERE id IN ({})",
        table,
        placeholders.join(", ")
    );

    let mut params: Vec<i64> = vec![now, actor.get()];
    params.extend_from_slice(ids);
    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
    Ok(())
}
