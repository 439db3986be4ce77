pub mod db;
pub mod error;
pub mod models;
pub mod service;

pub use db::Database;
pub use error::{Result, ServiceError};
pub use models::{
    Capability, Folder, FolderId, Grant, GrantFlags, Page, PageId, Principal, Task, TaskId,
    TaskStatus, UserId,
};
pub use service::{FolioService, FolderUpdate, NewPage, NewTask, PageUpdate, TaskUpdate};
