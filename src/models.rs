mod folder;
mod grant;
mod ids;
mod page;
mod principal;
mod task;

pub use folder::Folder;
pub use grant::{Grant, GrantFlags};
pub use ids::{FolderId, PageId, TaskId, UserId};
pub use page::Page;
pub use principal::{Capability, Principal};
pub use task::{Task, TaskStatus};
