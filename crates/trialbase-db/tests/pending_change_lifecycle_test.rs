//! Integration tests for the approval queue lifecycle.
//!
//! This test suite validates:
//! - Submit creates a pending, undecided change
//! - Approve and reject flip the decision flags exactly as documented
//! - Decisions never touch the target table
//! - Listing filters by decision state
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use serde_json::json;
use trialbase_db::test_fixtures::{row_id, TestDatabase};
use trialbase_db::{
    ChangeType, PendingChangeFilter, PendingChangeRepository, SubmitChangeRequest,
};

#[tokio::test]
async fn test_submit_approve_lifecycle() {
    let test_db = TestDatabase::new().await;
    let submitter = test_db.seed_user("submitter").await;
    let approver = test_db.seed_user("approver").await;

    let change = test_db
        .db
        .pending_changes
        .submit(SubmitChangeRequest {
            target_table: "trial_overview".to_string(),
            target_record_id: None,
            proposed_data: json!({"status": "Completed"}),
            change_type: ChangeType::Update,
            submitted_by: submitter.id,
        })
        .await
        .expect("submit change");

    assert!(!change.is_approved);
    assert!(!change.rejected);
    assert!(change.approved_by.is_none());

    let approved = test_db
        .db
        .pending_changes
        .approve(change.id, approver.id)
        .await
        .unwrap()
        .expect("change exists");
    assert!(approved.is_approved);
    assert!(!approved.rejected);
    assert_eq!(approved.approved_by, Some(approver.id));
    assert!(approved.approved_at.is_some());

    assert!(test_db.db.pending_changes.delete(change.id).await.unwrap());
    test_db.cleanup().await;
}

#[tokio::test]
async fn test_reject_records_reason_and_clears_approval() {
    let test_db = TestDatabase::new().await;
    let submitter = test_db.seed_user("submitter").await;
    let reviewer = test_db.seed_user("reviewer").await;

    let change = test_db
        .db
        .pending_changes
        .submit(SubmitChangeRequest {
            target_table: "drug_overview".to_string(),
            target_record_id: None,
            proposed_data: json!({"global_status": "Discontinued"}),
            change_type: ChangeType::Update,
            submitted_by: submitter.id,
        })
        .await
        .unwrap();

    // Approve first, then reject: the later decision wins outright.
    test_db
        .db
        .pending_changes
        .approve(change.id, reviewer.id)
        .await
        .unwrap();
    let rejected = test_db
        .db
        .pending_changes
        .reject(change.id, reviewer.id, Some("insufficient evidence"))
        .await
        .unwrap()
        .expect("change exists");

    assert!(rejected.rejected);
    assert!(!rejected.is_approved);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("insufficient evidence")
    );

    assert!(test_db.db.pending_changes.delete(change.id).await.unwrap());
    test_db.cleanup().await;
}

#[tokio::test]
async fn test_decisions_never_apply_proposed_data() {
    let test_db = TestDatabase::new().await;
    let submitter = test_db.seed_user("submitter").await;
    let approver = test_db.seed_user("approver").await;
    let trial = test_db.seed_trial("Untouched trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let change = test_db
        .db
        .pending_changes
        .submit(SubmitChangeRequest {
            target_table: "trial_overview".to_string(),
            target_record_id: Some(trial_uuid),
            proposed_data: json!({"status": "Terminated"}),
            change_type: ChangeType::Update,
            submitted_by: submitter.id,
        })
        .await
        .unwrap();

    test_db
        .db
        .pending_changes
        .approve(change.id, approver.id)
        .await
        .unwrap();

    // The approval is a recorded decision only.
    let row = test_db
        .db
        .trials
        .find_by_id(trial_uuid)
        .await
        .unwrap()
        .expect("trial still present");
    assert_eq!(row["status"], json!("Ongoing"));

    assert!(test_db.db.pending_changes.delete(change.id).await.unwrap());
    test_db.cleanup().await;
}

#[tokio::test]
async fn test_find_all_filters_by_decision_state() {
    let test_db = TestDatabase::new().await;
    let submitter = test_db.seed_user("submitter").await;
    let reviewer = test_db.seed_user("reviewer").await;

    let mut ids = Vec::new();
    for n in 0..3 {
        let change = test_db
            .db
            .pending_changes
            .submit(SubmitChangeRequest {
                target_table: "trial_overview".to_string(),
                target_record_id: None,
                proposed_data: json!({"n": n}),
                change_type: ChangeType::Insert,
                submitted_by: submitter.id,
            })
            .await
            .unwrap();
        ids.push(change.id);
    }
    test_db
        .db
        .pending_changes
        .approve(ids[0], reviewer.id)
        .await
        .unwrap();
    test_db
        .db
        .pending_changes
        .reject(ids[1], reviewer.id, None)
        .await
        .unwrap();

    let approved = test_db
        .db
        .pending_changes
        .find_all(PendingChangeFilter {
            is_approved: Some(true),
            rejected: None,
        })
        .await
        .unwrap();
    assert!(approved.iter().any(|c| c.id == ids[0]));
    assert!(!approved.iter().any(|c| c.id == ids[1] || c.id == ids[2]));

    let undecided = test_db
        .db
        .pending_changes
        .find_all(PendingChangeFilter {
            is_approved: Some(false),
            rejected: Some(false),
        })
        .await
        .unwrap();
    assert!(undecided.iter().any(|c| c.id == ids[2]));

    for id in ids {
        test_db.db.pending_changes.delete(id).await.unwrap();
    }
    test_db.cleanup().await;
}
