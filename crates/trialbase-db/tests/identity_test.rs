//! Integration tests for identity repositories.
//!
//! This test suite validates:
//! - User CRUD and patch semantics
//! - Protected system roles refuse rename/delete
//! - Assignment uniqueness and joined listings
//! - Audit log append, filtering, and the non-fatal wrapper
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use serde_json::json;
use trialbase_db::test_fixtures::TestDatabase;
use trialbase_db::{
    ActionType, ActivityLogRepository, Error, NewActivityEntry, RoleRepository, UserPatch,
    UserRepository, UserRoleRepository,
};

#[tokio::test]
async fn test_user_patch_updates_only_given_fields() {
    let test_db = TestDatabase::new().await;
    let user = test_db.seed_user("patch_target").await;

    let updated = test_db
        .db
        .users
        .update(
            user.id,
            UserPatch {
                company: Some("Nordic CRO".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("user exists");

    assert_eq!(updated.company.as_deref(), Some("Nordic CRO"));
    assert_eq!(updated.email, user.email);
    assert_eq!(updated.username, user.username);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_find_by_username_matches_exact_name() {
    let test_db = TestDatabase::new().await;
    let user = test_db.seed_user("lookup").await;

    let found = test_db
        .db
        .users
        .find_by_username(&user.username)
        .await
        .unwrap()
        .expect("user exists");
    assert_eq!(found.id, user.id);

    let missing = test_db
        .db
        .users
        .find_by_username("no_such_user")
        .await
        .unwrap();
    assert!(missing.is_none());

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_protected_roles_refuse_mutation() {
    let test_db = TestDatabase::new().await;

    let admin = test_db
        .db
        .roles
        .find_by_name("Admin")
        .await
        .unwrap()
        .expect("seeded system role");

    let rename = test_db.db.roles.update(admin.id, "Superuser").await;
    assert!(matches!(rename, Err(Error::Protected(_))));

    let delete = test_db.db.roles.delete(admin.id).await;
    assert!(matches!(delete, Err(Error::Protected(_))));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_custom_role_lifecycle_and_assignment() {
    let test_db = TestDatabase::new().await;
    let user = test_db.seed_user("assignee").await;

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let role_name = format!("Analyst_{suffix}");
    let role = test_db.db.roles.create(&role_name).await.unwrap();

    let assigned = test_db
        .db
        .user_roles
        .assign(user.id, role.id)
        .await
        .unwrap();
    assert!(assigned.is_some());

    // Duplicate assignment is a no-op.
    let duplicate = test_db
        .db
        .user_roles
        .assign(user.id, role.id)
        .await
        .unwrap();
    assert!(duplicate.is_none());

    let roles = test_db.db.user_roles.roles_for_user(user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].role_name, role_name);

    let removed = test_db.db.user_roles.delete_all_for_user(user.id).await.unwrap();
    assert_eq!(removed, 1);
    assert!(test_db.db.roles.delete(role.id).await.unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_role_replacement_clears_previous_assignments() {
    let test_db = TestDatabase::new().await;
    let user = test_db.seed_user("replaced").await;

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let old_a = test_db
        .db
        .roles
        .create(&format!("Reviewer_{suffix}"))
        .await
        .unwrap();
    let old_b = test_db
        .db
        .roles
        .create(&format!("Editor_{suffix}"))
        .await
        .unwrap();
    let new_role = test_db
        .db
        .roles
        .create(&format!("Curator_{suffix}"))
        .await
        .unwrap();

    test_db.db.user_roles.assign(user.id, old_a.id).await.unwrap();
    test_db.db.user_roles.assign(user.id, old_b.id).await.unwrap();

    // Replacement: wipe every existing assignment, then grant the new role.
    let removed = test_db.db.user_roles.delete_all_for_user(user.id).await.unwrap();
    assert_eq!(removed, 2);
    let granted = test_db
        .db
        .user_roles
        .assign(user.id, new_role.id)
        .await
        .unwrap();
    assert!(granted.is_some());

    let roles = test_db.db.user_roles.roles_for_user(user.id).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].role_id, new_role.id);

    test_db.db.user_roles.delete_all_for_user(user.id).await.unwrap();
    for role in [old_a, old_b, new_role] {
        assert!(test_db.db.roles.delete(role.id).await.unwrap());
    }

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_activity_log_append_and_filters() {
    let test_db = TestDatabase::new().await;
    let user = test_db.seed_user("auditor").await;

    for (table, action) in [
        ("trial_overview", ActionType::Insert),
        ("trial_overview", ActionType::Update),
        ("drug_overview", ActionType::Insert),
    ] {
        test_db
            .db
            .activity
            .log(NewActivityEntry {
                user_id: user.id,
                table_name: table.to_string(),
                record_id: None,
                action_type: action,
                change_details: Some(json!({"via": "test"})),
            })
            .await
            .expect("append audit entry");
    }

    let for_user = test_db.db.activity.list_for_user(user.id).await.unwrap();
    assert_eq!(for_user.len(), 3);

    let trial_inserts = test_db
        .db
        .activity
        .list_all(Some("trial_overview"), Some("INSERT"))
        .await
        .unwrap();
    assert!(trial_inserts
        .iter()
        .filter(|e| e.user_id == user.id)
        .all(|e| e.table_name == "trial_overview" && e.action_type == "INSERT"));
    assert_eq!(
        trial_inserts.iter().filter(|e| e.user_id == user.id).count(),
        1
    );

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_non_fatal_logging_swallows_failures() {
    let test_db = TestDatabase::new().await;

    // Violates the users FK, so the append fails; the wrapper returns None.
    let result = test_db
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: uuid::Uuid::new_v4(),
            table_name: "trial_overview".to_string(),
            record_id: None,
            action_type: ActionType::Insert,
            change_details: None,
        })
        .await;
    assert!(result.is_none());

    test_db.cleanup().await;
}
