use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folio::{
    Capability, Database, FolderId, FolderUpdate, FolioService, GrantFlags, NewPage, NewTask,
    PageId, Principal, ServiceError, TaskId, TaskStatus, TaskUpdate, UserId,
};

/// folio - a shared folder/page/task backend, driven from the command line
#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folders contain pages, pages contain tasks; everything is shareable")]
#[command(version)]
struct Cli {
    /// Act as this user id; omit to act anonymously
    #[arg(long, global = true, value_name = "ID")]
    user: Option<i64>,

    /// Comma-separated blanket capabilities
    /// (view-all-folders, view-all-pages, view-all-tasks)
    #[arg(long, global = true, value_name = "CAPS")]
    caps: Option<String>,

    /// Database file path (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Folder operations
    #[command(subcommand)]
    Folder(FolderCommand),
    /// Page operations
    #[command(subcommand)]
    Page(PageCommand),
    /// Task operations
    #[command(subcommand)]
    Task(TaskCommand),
    /// Permission grant operations
    #[command(subcommand)]
    Grant(GrantCommand),
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Create a folder
    Add {
        name: String,
        #[arg(long)]
        public: bool,
    },
    /// List visible folders
    List,
    /// Rename a folder or toggle its public flag
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        public: Option<bool>,
    },
    /// Soft-delete a folder and everything under it
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum PageCommand {
    /// Create a page in a folder
    Add {
        name: String,
        #[arg(long, value_name = "FOLDER_ID")]
        folder: i64,
        #[arg(long)]
        public: bool,
    },
    /// List visible pages
    List,
    /// Rename a page or toggle its public flag
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        public: Option<bool>,
    },
    /// Soft-delete a page and its tasks
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task on a page
    Add {
        text: String,
        #[arg(long, value_name = "PAGE_ID")]
        page: i64,
        #[arg(long, default_value = "in-progress")]
        status: StatusArg,
        #[arg(long, value_name = "USER_ID")]
        assignee: Option<i64>,
    },
    /// List visible tasks
    List,
    /// Edit a task in place
    Update {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        status: Option<StatusArg>,
        #[arg(long, value_name = "USER_ID")]
        assignee: Option<i64>,
    },
    /// Edit a task as a new version, keeping the old row as history
    Revise {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        status: Option<StatusArg>,
    },
    /// Show a task's version chain, oldest to newest
    History { id: i64 },
    /// Soft-delete a task row
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum GrantCommand {
    /// Grant or update a user's access to a folder
    Folder {
        id: i64,
        #[command(flatten)]
        grant: GrantArgs,
    },
    /// Grant or update a user's access to a page
    Page {
        id: i64,
        #[command(flatten)]
        grant: GrantArgs,
    },
    /// Grant or update a user's access to a task
    Task {
        id: i64,
        #[command(flatten)]
        grant: GrantArgs,
    },
    /// Revoke a user's folder grant
    RevokeFolder {
        id: i64,
        #[arg(long, value_name = "USER_ID")]
        from: i64,
    },
    /// Revoke a user's page grant
    RevokePage {
        id: i64,
        #[arg(long, value_name = "USER_ID")]
        from: i64,
    },
    /// Revoke a user's task grant
    RevokeTask {
        id: i64,
        #[arg(long, value_name = "USER_ID")]
        from: i64,
    },
}

#[derive(Args)]
struct GrantArgs {
    /// The user to grant access to
    #[arg(long, value_name = "USER_ID")]
    to: i64,
    #[arg(long)]
    view: bool,
    #[arg(long)]
    edit: bool,
    #[arg(long)]
    delete: bool,
}

impl GrantArgs {
    fn flags(&self) -> GrantFlags {
        GrantFlags {
            can_view: self.view,
            can_edit: self.edit,
            can_delete: self.delete,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StatusArg {
    Done,
    InProgress,
    Cancelled,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Done => TaskStatus::Done,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::Cancelled => TaskStatus::Cancelled,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        // User-facing failures exit 1, internal failures exit 2
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e}");
        std::process::exit(exit_code);
    }
}

/// Determines if an error is a user error (vs internal error).
fn is_user_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ServiceError>(),
        Some(
            ServiceError::NotFound
                | ServiceError::PermissionDenied
                | ServiceError::Unauthenticated
                | ServiceError::Validation(_)
        )
    )
}

fn run(cli: &Cli) -> Result<()> {
    let principal = build_principal(cli)?;

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_database_path()?,
    };
    ensure_database_directory(&db_path)?;
    let db = Database::open(&db_path).context("Failed to open database")?;
    let service = FolioService::new(db);

    match &cli.command {
        Commands::Folder(cmd) => run_folder(cli, &service, &principal, cmd),
        Commands::Page(cmd) => run_page(cli, &service, &principal, cmd),
        Commands::Task(cmd) => run_task(cli, &service, &principal, cmd),
        Commands::Grant(cmd) => run_grant(&service, &principal, cmd),
    }
}

fn build_principal(cli: &Cli) -> Result<Principal> {
    let Some(user) = cli.user else {
        if cli.caps.is_some() {
            anyhow::bail!("--caps requires --user");
        }
        return Ok(Principal::Anonymous);
    };

    let mut capabilities = Vec::new();
    if let Some(caps) = &cli.caps {
        for name in caps.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let cap = Capability::parse(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown capability: {name}"))?;
            capabilities.push(cap);
        }
    }

    Ok(Principal::with_capabilities(UserId::new(user), capabilities))
}

fn run_folder(
    cli: &Cli,
    service: &FolioService,
    principal: &Principal,
    cmd: &FolderCommand,
) -> Result<()> {
    match cmd {
        FolderCommand::Add { name, public } => {
            let folder = service.create_folder(principal, name, *public)?;
            emit(cli, &folder, || {
                println!("Folder created (id: {})", folder.id)
            })
        }
        FolderCommand::List => {
            let folders = service.list_folders(principal)?;
            emit(cli, &folders, || {
                for f in &folders {
                    let flag = if f.is_public { " [public]" } else { "" };
                    println!("{}  {}{}", f.id, f.name, flag);
                }
            })
        }
        FolderCommand::Update { id, name, public } => {
            let update = FolderUpdate {
                name: name.clone(),
                is_public: *public,
            };
            let folder = service.update_folder(principal, FolderId::new(*id), update)?;
            emit(cli, &folder, || {
                println!("Folder updated (id: {})", folder.id)
            })
        }
        FolderCommand::Rm { id } => {
            service.delete_folder(principal, FolderId::new(*id))?;
            println!("Folder deleted (id: {id})");
            Ok(())
        }
    }
}

fn run_page(
    cli: &Cli,
    service: &FolioService,
    principal: &Principal,
    cmd: &PageCommand,
) -> Result<()> {
    match cmd {
        PageCommand::Add {
            name,
            folder,
            public,
        } => {
            let page = service.create_page(
                principal,
                NewPage {
                    name: name.clone(),
                    folder: FolderId::new(*folder),
                    is_public: *public,
                },
            )?;
            emit(cli, &page, || println!("Page created (id: {})", page.id))
        }
        PageCommand::List => {
            let pages = service.list_pages(principal)?;
            emit(cli, &pages, || {
                for p in &pages {
                    let flag = if p.is_public { " [public]" } else { "" };
                    println!("{}  {} (folder {}){}", p.id, p.name, p.folder, flag);
                }
            })
        }
        PageCommand::Update { id, name, public } => {
            let update = folio::PageUpdate {
                name: name.clone(),
                is_public: *public,
            };
            let page = service.update_page(principal, PageId::new(*id), update)?;
            emit(cli, &page, || println!("Page updated (id: {})", page.id))
        }
        PageCommand::Rm { id } => {
            service.delete_page(principal, PageId::new(*id))?;
            println!("Page deleted (id: {id})");
            Ok(())
        }
    }
}

fn run_task(
    cli: &Cli,
    service: &FolioService,
    principal: &Principal,
    cmd: &TaskCommand,
) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            text,
            page,
            status,
            assignee,
        } => {
            let task = service.create_task(
                principal,
                NewTask {
                    text: text.clone(),
                    page: Some(PageId::new(*page)),
                    status: (*status).into(),
                    assignee: assignee.map(UserId::new),
                },
            )?;
            emit(cli, &task, || println!("Task created (id: {})", task.id))
        }
        TaskCommand::List => {
            let tasks = service.list_tasks(principal)?;
            emit(cli, &tasks, || {
                for t in &tasks {
                    println!("{}  [{}] {} (page {})", t.id, t.status, t.text, t.page);
                }
            })
        }
        TaskCommand::Update {
            id,
            text,
            status,
            assignee,
        } => {
            let update = TaskUpdate {
                text: text.clone(),
                status: status.map(Into::into),
                assignee: assignee.map(UserId::new),
            };
            let task = service.update_task(principal, TaskId::new(*id), update)?;
            emit(cli, &task, || println!("Task updated (id: {})", task.id))
        }
        TaskCommand::Revise { id, text, status } => {
            let update = TaskUpdate {
                text: text.clone(),
                status: status.map(Into::into),
                assignee: None,
            };
            let task = service.revise_task(principal, TaskId::new(*id), update)?;
            emit(cli, &task, || {
                println!(
                    "Task revised (id: {}, previous: {})",
                    task.id,
                    task.previous_version
                        .map(|p| p.to_string())
                        .unwrap_or_default()
                )
            })
        }
        TaskCommand::History { id } => {
            let history = service.task_history(principal, TaskId::new(*id))?;
            emit(cli, &history, || {
                for t in &history {
                    println!("{}  [{}] {}", t.id, t.status, t.text);
                }
            })
        }
        TaskCommand::Rm { id } => {
            service.delete_task(principal, TaskId::new(*id))?;
            println!("Task deleted (id: {id})");
            Ok(())
        }
    }
}

fn run_grant(service: &FolioService, principal: &Principal, cmd: &GrantCommand) -> Result<()> {
    match cmd {
        GrantCommand::Folder { id, grant } => {
            service.grant_folder_access(
                principal,
                FolderId::new(*id),
                UserId::new(grant.to),
                grant.flags(),
            )?;
            println!("Granted user {} access to folder {id}", grant.to);
        }
        GrantCommand::Page { id, grant } => {
            service.grant_page_access(
                principal,
                PageId::new(*id),
                UserId::new(grant.to),
                grant.flags(),
            )?;
            println!("Granted user {} access to page {id}", grant.to);
        }
        GrantCommand::Task { id, grant } => {
            service.grant_task_access(
                principal,
                TaskId::new(*id),
                UserId::new(grant.to),
                grant.flags(),
            )?;
            println!("Granted user {} access to task {id}", grant.to);
        }
        GrantCommand::RevokeFolder { id, from } => {
            service.revoke_folder_access(principal, FolderId::new(*id), UserId::new(*from))?;
            println!("Revoked user {from} from folder {id}");
        }
        GrantCommand::RevokePage { id, from } => {
            service.revoke_page_access(principal, PageId::new(*id), UserId::new(*from))?;
            println!("Revoked user {from} from page {id}");
        }
        GrantCommand::RevokeTask { id, from } => {
            service.revoke_task_access(principal, TaskId::new(*id), UserId::new(*from))?;
            println!("Revoked user {from} from task {id}");
        }
    }
    Ok(())
}

/// Prints JSON when `--json` was passed, otherwise the plain rendering.
fn emit<T: serde::Serialize>(cli: &Cli, value: &T, plain: impl FnOnce()) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain();
    }
    Ok(())
}

/// Gets the cross-platform database path.
///
/// Returns `{data_dir}/folio/folio.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
fn default_database_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;

    Ok(data_dir.join("folio").join("folio.db"))
}

/// Ensures the parent directory of the database file exists.
fn ensure_database_directory(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn anonymous_principal_without_user_flag() {
        let cli = parse(&["folio", "folder", "list"]);
        let principal = build_principal(&cli).unwrap();
        assert_eq!(principal, Principal::Anonymous);
    }

    #[test]
    fn user_flag_builds_authenticated_principal() {
        let cli = parse(&["folio", "--user", "7", "folder", "list"]);
        let principal = build_principal(&cli).unwrap();
        assert_eq!(principal.user_id(), Some(UserId::new(7)));
    }

    #[test]
    fn caps_flag_parses_capability_names() {
        let cli = parse(&[
            "folio",
            "--user",
            "7",
            "--caps",
            "view-all-folders, view-all-tasks",
            "task",
            "list",
        ]);
        let principal = build_principal(&cli).unwrap();
        assert!(principal.has_capability(Capability::ViewAllFolders));
        assert!(principal.has_capability(Capability::ViewAllTasks));
        assert!(!principal.has_capability(Capability::ViewAllPages));
    }

    #[test]
    fn caps_without_user_is_rejected() {
        let cli = parse(&["folio", "--caps", "view-all-folders", "folder", "list"]);
        assert!(build_principal(&cli).is_err());
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let cli = parse(&["folio", "--user", "1", "--caps", "see-everything", "folder", "list"]);
        assert!(build_principal(&cli).is_err());
    }
}
