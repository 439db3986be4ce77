use super::*;
use crate::models::Capability;

fn service() -> FolioService {
    let db = Database::in_memory().expect("failed to create in-memory database");
    FolioService::new(db)
}

fn alice() -> Principal {
    Principal::user(UserId::new(1))
}

fn bob() -> Principal {
    Principal::user(UserId::new(2))
}

fn new_page(name: &str, folder: FolderId) -> NewPage {
    NewPage {
        name: name.to_string(),
        folder,
        is_public: false,
    }
}

fn new_task(text: &str, page: PageId) -> NewTask {
    NewTask {
        text: text.to_string(),
        page: Some(page),
        status: TaskStatus::InProgress,
        assignee: None,
    }
}

// --- Folder CRUD and ownership ---

#[test]
fn create_folder_sets_owner_from_principal() {
    let service = service();

    let folder = service
        .create_folder(&alice(), "Projects", false)
        .expect("failed to create folder");

    assert!(folder.id.get() > 0);
    assert_eq!(folder.owner, UserId::new(1));
    assert!(!folder.is_public);
    assert!(!folder.is_deleted);
}

#[test]
fn anonymous_cannot_create_folder() {
    let service = service();

    let result = service.create_folder(&Principal::Anonymous, "Projects", false);
    assert!(matches!(result, Err(ServiceError::Unauthenticated)));
}

#[test]
fn duplicate_folder_name_fails_validation() {
    let service = service();

    service.create_folder(&alice(), "Projects", false).unwrap();
    let result = service.create_folder(&bob(), "Projects", false);

    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn blank_folder_name_fails_validation() {
    let service = service();

    let result = service.create_folder(&alice(), "   ", false);
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn owner_sees_own_private_folder() {
    let service = service();

    let folder = service.create_folder(&alice(), "Private", false).unwrap();

    let listed = service.list_folders(&alice()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, folder.id);

    let fetched = service.get_folder(&alice(), folder.id).unwrap();
    assert_eq!(fetched.name, "Private");
}

#[test]
fn other_user_cannot_see_private_folder() {
    let service = service();

    let folder = service.create_folder(&alice(), "Private", false).unwrap();

    assert!(service.list_folders(&bob()).unwrap().is_empty());
    assert!(matches!(
        service.get_folder(&bob(), folder.id),
        Err(ServiceError::NotFound)
    ));
}

#[test]
fn get_unknown_folder_is_not_found() {
    let service = service();

    let result = service.get_folder(&alice(), FolderId::new(999));
    assert!(matches!(result, Err(ServiceError::NotFound)));
}

#[test]
fn update_folder_rename_and_publish() {
    let service = service();

    let folder = service.create_folder(&alice(), "Draft", false).unwrap();
    let updated = service
        .update_folder(
            &alice(),
            folder.id,
            FolderUpdate {
                name: Some("Final".to_string()),
                is_public: Some(true),
            },
        )
        .unwrap();

    assert_eq!(updated.name, "Final");
    assert!(updated.is_public);

    // Renaming onto an existing name is rejected
    service.create_folder(&alice(), "Other", false).unwrap();
    let result = service.update_folder(
        &alice(),
        folder.id,
        FolderUpdate {
            name: Some("Other".to_string()),
            is_public: None,
        },
    );
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn update_requires_edit_rights_not_just_visibility() {
    let service = service();

    // Public folder: Bob can see it but not touch it
    let folder = service.create_folder(&alice(), "Public", true).unwrap();
    assert!(service.get_folder(&bob(), folder.id).is_ok());

    let result = service.update_folder(
        &bob(),
        folder.id,
        FolderUpdate {
            name: None,
            is_public: Some(false),
        },
    );
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));
}

#[test]
fn can_edit_folder_grant_allows_update() {
    let service = service();

    let folder = service.create_folder(&alice(), "Team", false).unwrap();
    service
        .grant_folder_access(
            &alice(),
            folder.id,
            UserId::new(2),
            GrantFlags {
                can_view: true,
                can_edit: true,
                can_delete: false,
            },
        )
        .unwrap();

    let updated = service
        .update_folder(
            &bob(),
            folder.id,
            FolderUpdate {
                name: Some("Team v2".to_string()),
                is_public: None,
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Team v2");

    // Edit does not imply delete
    let result = service.delete_folder(&bob(), folder.id);
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));
}

// --- Visibility: grants, public chains, blanket capabilities ---

#[test]
fn folder_grant_propagates_visibility_to_pages() {
    let service = service();

    // Folder F1 owned by Alice, private; page P1 inside; Bob has no grant
    let f1 = service.create_folder(&alice(), "F1", false).unwrap();
    let p1 = service.create_page(&alice(), new_page("P1", f1.id)).unwrap();

    assert!(service.list_folders(&bob()).unwrap().is_empty());
    assert!(service.list_pages(&bob()).unwrap().is_empty());

    // Alice grants Bob can_view on F1
    service
        .grant_folder_access(&alice(), f1.id, UserId::new(2), GrantFlags::view())
        .unwrap();

    let folders = service.list_folders(&bob()).unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].id, f1.id);

    let pages = service.list_pages(&bob()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id, p1.id);
}

#[test]
fn folder_grant_propagates_visibility_to_tasks() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let task = service.create_task(&alice(), new_task("t", page.id)).unwrap();

    assert!(service.list_tasks(&bob()).unwrap().is_empty());

    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();

    let tasks = service.list_tasks(&bob()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
}

#[test]
fn page_grant_propagates_to_its_tasks_only() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let shared = service.create_page(&alice(), new_page("Shared", folder.id)).unwrap();
    let hidden = service.create_page(&alice(), new_page("Hidden", folder.id)).unwrap();
    let on_shared = service.create_task(&alice(), new_task("a", shared.id)).unwrap();
    service.create_task(&alice(), new_task("b", hidden.id)).unwrap();

    service
        .grant_page_access(&alice(), shared.id, UserId::new(2), GrantFlags::view())
        .unwrap();

    // Bob sees the granted page and its task, but not the sibling page
    let pages = service.list_pages(&bob()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id, shared.id);

    let tasks = service.list_tasks(&bob()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, on_shared.id);

    // The folder itself stays invisible
    assert!(service.list_folders(&bob()).unwrap().is_empty());
}

#[test]
fn entity_grant_without_can_view_does_not_reveal_it() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    // An edit-only grant directly on the page carries no view flag
    service
        .grant_page_access(
            &alice(),
            page.id,
            UserId::new(2),
            GrantFlags {
                can_view: false,
                can_edit: true,
                can_delete: false,
            },
        )
        .unwrap();

    assert!(matches!(
        service.get_page(&bob(), page.id),
        Err(ServiceError::NotFound)
    ));
}

#[test]
fn public_folder_is_visible_to_everyone() {
    let service = service();

    // Folder F2 public, owned by Alice, with a page and a task
    let f2 = service.create_folder(&alice(), "F2", true).unwrap();
    let page = service.create_page(&alice(), new_page("P", f2.id)).unwrap();
    service.create_task(&alice(), new_task("t", page.id)).unwrap();

    let anon = Principal::Anonymous;
    assert_eq!(service.list_folders(&anon).unwrap().len(), 1);
    assert_eq!(service.list_pages(&anon).unwrap().len(), 1);
    assert_eq!(service.list_tasks(&anon).unwrap().len(), 1);

    assert_eq!(service.list_folders(&bob()).unwrap().len(), 1);
    assert_eq!(service.list_tasks(&bob()).unwrap().len(), 1);
}

#[test]
fn public_page_in_private_folder_is_visible() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service
        .create_page(
            &alice(),
            NewPage {
                name: "Open".to_string(),
                folder: folder.id,
                is_public: true,
            },
        )
        .unwrap();
    let task = service.create_task(&alice(), new_task("t", page.id)).unwrap();

    let anon = Principal::Anonymous;

    // The page and its tasks are public; the folder is not
    assert!(service.list_folders(&anon).unwrap().is_empty());
    assert_eq!(service.list_pages(&anon).unwrap().len(), 1);
    assert_eq!(service.list_tasks(&anon).unwrap().len(), 1);
    assert!(service.get_task(&anon, task.id).is_ok());
}

#[test]
fn blanket_capability_reveals_all_of_one_kind() {
    let service = service();

    service.create_folder(&alice(), "A", false).unwrap();
    service.create_folder(&alice(), "B", false).unwrap();

    let auditor = Principal::with_capabilities(UserId::new(9), [Capability::ViewAllFolders]);
    assert_eq!(service.list_folders(&auditor).unwrap().len(), 2);

    // The capability is kind-scoped: no pages leak through it
    let folder = service.create_folder(&alice(), "C", false).unwrap();
    service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    assert!(service.list_pages(&auditor).unwrap().is_empty());
}

#[test]
fn blanket_capability_excludes_deleted_rows() {
    let service = service();

    let keep = service.create_folder(&alice(), "Keep", false).unwrap();
    let gone = service.create_folder(&alice(), "Gone", false).unwrap();
    service.delete_folder(&alice(), gone.id).unwrap();

    let auditor = Principal::with_capabilities(UserId::new(9), [Capability::ViewAllFolders]);
    let folders = service.list_folders(&auditor).unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].id, keep.id);
}

#[test]
fn blanket_capability_grants_no_writes() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();

    let auditor = Principal::with_capabilities(UserId::new(9), [Capability::ViewAllFolders]);
    let result = service.delete_folder(&auditor, folder.id);
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));
}

// --- Pages: creation rights ---

#[test]
fn page_creation_requires_folder_membership() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();

    // No grant: denied
    let result = service.create_page(&bob(), new_page("P", folder.id));
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));

    // Any grant row on the folder suffices for creation
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();
    let page = service.create_page(&bob(), new_page("P", folder.id)).unwrap();
    assert_eq!(page.created_by, UserId::new(2));
    assert_eq!(page.updated_by, UserId::new(2));
}

#[test]
fn page_creation_in_missing_folder_fails_validation() {
    let service = service();

    let result = service.create_page(&alice(), new_page("P", FolderId::new(404)));
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn public_folder_does_not_permit_page_creation() {
    let service = service();

    // Public grants reads, never writes
    let folder = service.create_folder(&alice(), "F", true).unwrap();
    let result = service.create_page(&bob(), new_page("P", folder.id));
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));
}

#[test]
fn duplicate_page_name_fails_across_folders() {
    let service = service();

    let f1 = service.create_folder(&alice(), "F1", false).unwrap();
    let f2 = service.create_folder(&alice(), "F2", false).unwrap();

    service.create_page(&alice(), new_page("Inbox", f1.id)).unwrap();
    let result = service.create_page(&alice(), new_page("Inbox", f2.id));

    // Page names are globally unique, not per-folder
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn page_update_refreshes_audit_fields() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();

    let updated = service
        .update_page(
            &bob(),
            page.id,
            PageUpdate {
                name: Some("P2".to_string()),
                is_public: None,
            },
        )
        .unwrap();

    assert_eq!(updated.created_by, UserId::new(1));
    assert_eq!(updated.updated_by, UserId::new(2));
    assert!(updated.updated_at >= updated.created_at);
}

// --- Tasks: creation rights and validation ---

#[test]
fn task_creation_without_page_fails_validation() {
    let service = service();

    let result = service.create_task(
        &alice(),
        NewTask {
            text: "orphan".to_string(),
            page: None,
            status: TaskStatus::InProgress,
            assignee: None,
        },
    );
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn task_creation_on_missing_page_fails_validation() {
    let service = service();

    let result = service.create_task(&alice(), new_task("t", PageId::new(404)));
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn task_creation_without_rights_is_denied() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    let result = service.create_task(&bob(), new_task("t", page.id));
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));
}

#[test]
fn task_creation_allowed_on_public_page() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service
        .create_page(
            &alice(),
            NewPage {
                name: "Open".to_string(),
                folder: folder.id,
                is_public: true,
            },
        )
        .unwrap();

    // Public page is the one place a write is granted by the public flag
    let task = service.create_task(&bob(), new_task("drive-by", page.id)).unwrap();
    assert_eq!(task.created_by, UserId::new(2));
    assert_eq!(task.assignee, UserId::new(2));
    assert_eq!(task.folder, folder.id);
}

#[test]
fn task_folder_is_derived_from_page() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    let task = service.create_task(&alice(), new_task("t", page.id)).unwrap();
    assert_eq!(task.page, page.id);
    assert_eq!(task.folder, folder.id);
}

#[test]
fn task_assignee_can_be_someone_else() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    let task = service
        .create_task(
            &alice(),
            NewTask {
                text: "delegated".to_string(),
                page: Some(page.id),
                status: TaskStatus::InProgress,
                assignee: Some(UserId::new(5)),
            },
        )
        .unwrap();

    assert_eq!(task.assignee, UserId::new(5));
    assert_eq!(task.created_by, UserId::new(1));
}

#[test]
fn anonymous_cannot_write_anywhere() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", true).unwrap();
    let page = service
        .create_page(
            &alice(),
            NewPage {
                name: "Open".to_string(),
                folder: folder.id,
                is_public: true,
            },
        )
        .unwrap();
    let task = service.create_task(&alice(), new_task("t", page.id)).unwrap();

    let anon = Principal::Anonymous;
    assert!(matches!(
        service.create_page(&anon, new_page("P2", folder.id)),
        Err(ServiceError::Unauthenticated)
    ));
    assert!(matches!(
        service.create_task(&anon, new_task("t2", page.id)),
        Err(ServiceError::Unauthenticated)
    ));
    assert!(matches!(
        service.update_task(&anon, task.id, TaskUpdate::default()),
        Err(ServiceError::Unauthenticated)
    ));
    assert!(matches!(
        service.delete_folder(&anon, folder.id),
        Err(ServiceError::Unauthenticated)
    ));
}

// --- Soft delete and cascade ---

#[test]
fn deleted_folder_disappears_from_all_reads() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    service.delete_folder(&alice(), folder.id).unwrap();

    assert!(service.list_folders(&alice()).unwrap().is_empty());
    assert!(matches!(
        service.get_folder(&alice(), folder.id),
        Err(ServiceError::NotFound)
    ));
}

#[test]
fn folder_delete_cascades_to_pages_and_tasks() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let p1 = service.create_page(&alice(), new_page("P1", folder.id)).unwrap();
    let p2 = service.create_page(&alice(), new_page("P2", folder.id)).unwrap();
    service.create_task(&alice(), new_task("a", p1.id)).unwrap();
    service.create_task(&alice(), new_task("b", p1.id)).unwrap();
    service.create_task(&alice(), new_task("c", p2.id)).unwrap();

    // An unrelated folder survives the cascade
    let other = service.create_folder(&alice(), "Other", false).unwrap();
    let other_page = service.create_page(&alice(), new_page("OP", other.id)).unwrap();
    service.create_task(&alice(), new_task("keep", other_page.id)).unwrap();

    service.delete_folder(&alice(), folder.id).unwrap();

    let folders = service.list_folders(&alice()).unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].id, other.id);

    let pages = service.list_pages(&alice()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id, other_page.id);

    let tasks = service.list_tasks(&alice()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "keep");
}

#[test]
fn cascade_flips_every_flag_in_storage() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    service.create_task(&alice(), new_task("t", page.id)).unwrap();

    service.delete_folder(&alice(), folder.id).unwrap();

    // Rows survive physically with the flag set - no physical deletes
    let conn = service.database().connection();
    let (folders, pages, tasks): (i64, i64, i64) = conn
        .query_row(
            "SELECT (SELECT COUNT(*) FROM folders WHERE is_deleted = 1),
                    (SELECT COUNT(*) FROM pages WHERE is_deleted = 1),
                    (SELECT COUNT(*) FROM tasks WHERE is_deleted = 1)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!((folders, pages, tasks), (1, 1, 1));

    let live: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pages WHERE is_deleted = 0",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(live, 0);
}

#[test]
fn page_delete_cascades_to_its_tasks_only() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let doomed = service.create_page(&alice(), new_page("Doomed", folder.id)).unwrap();
    let safe = service.create_page(&alice(), new_page("Safe", folder.id)).unwrap();
    service.create_task(&alice(), new_task("gone", doomed.id)).unwrap();
    let kept = service.create_task(&alice(), new_task("kept", safe.id)).unwrap();

    service.delete_page(&alice(), doomed.id).unwrap();

    let tasks = service.list_tasks(&alice()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, kept.id);
}

#[test]
fn delete_requires_delete_rights() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();

    // View+edit grant is not enough to delete
    service
        .grant_folder_access(
            &alice(),
            folder.id,
            UserId::new(2),
            GrantFlags {
                can_view: true,
                can_edit: true,
                can_delete: false,
            },
        )
        .unwrap();
    assert!(matches!(
        service.delete_page(&bob(), page.id),
        Err(ServiceError::PermissionDenied)
    ));

    // can_delete on the folder grant unlocks it
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::all())
        .unwrap();
    service.delete_page(&bob(), page.id).unwrap();
}

// --- Version chain ---

#[test]
fn revise_preserves_prior_row_and_links_back() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let original = service.create_task(&alice(), new_task("draft", page.id)).unwrap();

    let revised = service
        .revise_task(
            &alice(),
            original.id,
            TaskUpdate {
                text: Some("final".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_ne!(revised.id, original.id);
    assert_eq!(revised.previous_version, Some(original.id));
    assert_eq!(revised.text, "final");

    // The prior row is untouched and still reachable
    let prior = service.get_task(&alice(), original.id).unwrap();
    assert_eq!(prior.text, "draft");
    assert!(!prior.is_deleted);
    assert_eq!(prior.previous_version, None);
}

#[test]
fn current_head_resolves_from_any_node() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let v1 = service.create_task(&alice(), new_task("v1", page.id)).unwrap();
    let v2 = service
        .revise_task(&alice(), v1.id, TaskUpdate {
            text: Some("v2".to_string()),
            ..Default::default()
        })
        .unwrap();
    let v3 = service
        .revise_task(&alice(), v2.id, TaskUpdate {
            text: Some("v3".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(service.current_head(&alice(), v1.id).unwrap().id, v3.id);
    assert_eq!(service.current_head(&alice(), v2.id).unwrap().id, v3.id);
    assert_eq!(service.current_head(&alice(), v3.id).unwrap().id, v3.id);
}

#[test]
fn history_runs_oldest_to_newest() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let v1 = service.create_task(&alice(), new_task("v1", page.id)).unwrap();
    let v2 = service
        .revise_task(&alice(), v1.id, TaskUpdate {
            text: Some("v2".to_string()),
            ..Default::default()
        })
        .unwrap();
    let v3 = service
        .revise_task(&alice(), v1.id, TaskUpdate {
            text: Some("v3".to_string()),
            ..Default::default()
        })
        .unwrap();

    // Revising via the old id still attaches at the head
    assert_eq!(v3.previous_version, Some(v2.id));

    let history = service.task_history(&alice(), v2.id).unwrap();
    let ids: Vec<TaskId> = history.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![v1.id, v2.id, v3.id]);
    let texts: Vec<&str> = history.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["v1", "v2", "v3"]);
}

#[test]
fn chain_survives_deletion_of_its_head() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let v1 = service.create_task(&alice(), new_task("v1", page.id)).unwrap();
    let v2 = service
        .revise_task(&alice(), v1.id, TaskUpdate {
            text: Some("v2".to_string()),
            ..Default::default()
        })
        .unwrap();

    service.delete_task(&alice(), v2.id).unwrap();

    // The deleted head is gone from listings but v1 is still live
    let tasks = service.list_tasks(&alice()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, v1.id);

    // History through the live node still walks the full chain
    let history = service.task_history(&alice(), v1.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, v2.id);
    assert!(history[1].is_deleted);
}

#[test]
fn in_place_update_does_not_grow_the_chain() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let task = service.create_task(&alice(), new_task("t", page.id)).unwrap();

    let updated = service
        .update_task(&alice(), task.id, TaskUpdate {
            status: Some(TaskStatus::Done),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(updated.id, task.id);
    assert_eq!(updated.status, TaskStatus::Done);
    assert_eq!(updated.previous_version, None);
    assert_eq!(service.task_history(&alice(), task.id).unwrap().len(), 1);
}

// --- Grants: uniqueness, upsert, authorization ---

#[test]
fn regrant_updates_the_existing_row() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::all())
        .unwrap();

    let grants = service.folder_grants(&alice(), folder.id).unwrap();
    assert_eq!(grants.len(), 1, "exactly one row per (resource, user) pair");
    assert_eq!(grants[0].user, UserId::new(2));
    assert!(grants[0].flags.can_delete);
}

#[test]
fn only_owner_or_delegate_may_manage_grants() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();

    // Bob holds a view grant: not enough to grant others access
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();
    let result = service.grant_folder_access(&bob(), folder.id, UserId::new(3), GrantFlags::view());
    assert!(matches!(result, Err(ServiceError::PermissionDenied)));

    // A can_edit grant makes Bob a delegate
    service
        .grant_folder_access(
            &alice(),
            folder.id,
            UserId::new(2),
            GrantFlags {
                can_view: true,
                can_edit: true,
                can_delete: false,
            },
        )
        .unwrap();
    service
        .grant_folder_access(&bob(), folder.id, UserId::new(3), GrantFlags::view())
        .unwrap();

    let grants = service.folder_grants(&alice(), folder.id).unwrap();
    assert_eq!(grants.len(), 2);
}

#[test]
fn grant_on_missing_resource_fails_validation() {
    let service = service();

    let result =
        service.grant_folder_access(&alice(), FolderId::new(404), UserId::new(2), GrantFlags::view());
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let result = service.grant_page_access(&alice(), PageId::new(404), UserId::new(2), GrantFlags::view());
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[test]
fn revoke_restores_invisibility() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    service
        .grant_folder_access(&alice(), folder.id, UserId::new(2), GrantFlags::view())
        .unwrap();
    assert_eq!(service.list_folders(&bob()).unwrap().len(), 1);

    service
        .revoke_folder_access(&alice(), folder.id, UserId::new(2))
        .unwrap();
    assert!(service.list_folders(&bob()).unwrap().is_empty());

    // Revoking again is idempotent
    service
        .revoke_folder_access(&alice(), folder.id, UserId::new(2))
        .unwrap();
}

#[test]
fn task_grant_reveals_single_task() {
    let service = service();

    let folder = service.create_folder(&alice(), "F", false).unwrap();
    let page = service.create_page(&alice(), new_page("P", folder.id)).unwrap();
    let shared = service.create_task(&alice(), new_task("shared", page.id)).unwrap();
    service.create_task(&alice(), new_task("private", page.id)).unwrap();

    service
        .grant_task_access(&alice(), shared.id, UserId::new(2), GrantFlags::view())
        .unwrap();

    let tasks = service.list_tasks(&bob()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, shared.id);

    // Neither the page nor the folder leak through a task grant
    assert!(service.list_pages(&bob()).unwrap().is_empty());
    assert!(service.list_folders(&bob()).unwrap().is_empty());
}
