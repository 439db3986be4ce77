/// Complete database schema for the folder/page/task store.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
/// All statements are designed to be run in a single transaction.
///
/// Deletion is always soft: rows carry an `is_deleted` flag and are never
/// physically removed, so version chains and grant rows keep their
/// referential integrity. The composite primary keys on the permission
/// tables enforce at most one grant per (resource, user) pair.
pub const INITIAL_SCHEMA: &str = r#"
-- Folders: roots of the containment hierarchy
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    owner_id INTEGER NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0
);

-- Pages: belong to exactly one folder
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    folder_id INTEGER NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by INTEGER NOT NULL,
    updated_by INTEGER NOT NULL,
    FOREIGN KEY (folder_id) REFERENCES folders(id)
);

-- Tasks: folder_id is denormalized and always equals the page's folder
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    page_id INTEGER NOT NULL,
    folder_id INTEGER NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('DONE', 'IN_PROGRESS', 'CANCELLED')),
    user_id INTEGER NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by INTEGER NOT NULL,
    updated_by INTEGER NOT NULL,
    previous_version INTEGER,
    FOREIGN KEY (page_id) REFERENCES pages(id),
    FOREIGN KEY (folder_id) REFERENCES folders(id),
    FOREIGN KEY (previous_version) REFERENCES tasks(id)
);

-- Per-user grants, one table per resource kind
CREATE TABLE IF NOT EXISTS folder_permissions (
    folder_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    can_view INTEGER NOT NULL DEFAULT 0,
    can_edit INTEGER NOT NULL DEFAULT 0,
    can_delete INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (folder_id, user_id),
    FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS page_permissions (
    page_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    can_view INTEGER NOT NULL DEFAULT 0,
    can_edit INTEGER NOT NULL DEFAULT 0,
    can_delete INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (page_id, user_id),
    FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS task_permissions (
    task_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    can_view INTEGER NOT NULL DEFAULT 0,
    can_edit INTEGER NOT NULL DEFAULT 0,
    can_delete INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (task_id, user_id),
    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
);

-- Containment lookups
CREATE INDEX IF NOT EXISTS idx_pages_folder ON pages(folder_id);
CREATE INDEX IF NOT EXISTS idx_tasks_page ON tasks(page_id);
CREATE INDEX IF NOT EXISTS idx_tasks_folder ON tasks(folder_id);

-- Version chain walks (head resolution queries by previous_version)
CREATE INDEX IF NOT EXISTS idx_tasks_previous_version ON tasks(previous_version);

-- Grant lookups by user
CREATE INDEX IF NOT EXISTS idx_folder_permissions_user ON folder_permissions(user_id);
CREATE INDEX IF NOT EXISTS idx_page_permissions_user ON page_permissions(user_id);
CREATE INDEX IF NOT EXISTS idx_task_permissions_user ON task_permissions(user_id);
"#;
