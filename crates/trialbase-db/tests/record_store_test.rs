//! Integration tests for the JSON record store.
//!
//! This test suite validates:
//! - Insert/read/update/delete round trips through JSON rows
//! - Whitelist filtering drops unknown payload keys
//! - Parent-scoped reads, updates, and deletes
//! - Type coercion lands correctly in typed columns
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use serde_json::json;
use trialbase_db::tables::{TRIAL_SITES, TRIAL_TIMING};
use trialbase_db::test_fixtures::{row_id, TestDatabase};

#[tokio::test]
async fn test_child_row_lifecycle() {
    let test_db = TestDatabase::new().await;
    let trial = test_db.seed_trial("Store lifecycle trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let sites = test_db.db.record_store(&TRIAL_SITES);

    let payload = json!({
        "trial_id": trial_uuid.to_string(),
        "total": "12",
        "notes": "First pass",
        "study_sites": "Mayo Clinic, Johns Hopkins",
        "site_notes": {"monitor": "on-site"},
        "bogus_column": "must be dropped",
    });
    let row = sites
        .insert(payload.as_object().unwrap())
        .await
        .expect("insert site row");

    // Coercions: numeric string to INT, comma string to TEXT[].
    assert_eq!(row["total"], json!(12));
    assert_eq!(row["study_sites"], json!(["Mayo Clinic", "Johns Hopkins"]));
    assert_eq!(row["site_notes"]["monitor"], json!("on-site"));
    assert!(row.get("bogus_column").is_none());

    let site_id = row_id(&row).unwrap();
    let fetched = sites.find_by_id(site_id).await.unwrap().expect("row exists");
    assert_eq!(fetched["notes"], json!("First pass"));

    let updated = sites
        .update(site_id, json!({"notes": "Second pass"}).as_object().unwrap())
        .await
        .unwrap()
        .expect("update matched");
    assert_eq!(updated["notes"], json!("Second pass"));
    // Untouched columns survive a partial patch.
    assert_eq!(updated["total"], json!(12));

    let by_parent = sites.find_by_parent(trial_uuid).await.unwrap();
    assert_eq!(by_parent.len(), 1);

    assert!(sites.delete(site_id).await.unwrap());
    assert!(sites.find_by_id(site_id).await.unwrap().is_none());

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_update_by_parent_and_delete_by_parent() {
    let test_db = TestDatabase::new().await;
    let trial = test_db.seed_trial("Parent-scoped trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let timing = test_db.db.record_store(&TRIAL_TIMING);

    let inserted = timing
        .insert(
            json!({
                "trial_id": trial_uuid.to_string(),
                "start_date_actual": "2024-05-01",
                "inclusion_period_actual": "6 months",
            })
            .as_object()
            .unwrap(),
        )
        .await
        .expect("insert timing row");
    assert_eq!(inserted["start_date_actual"], json!("2024-05-01"));

    let updated = timing
        .update_by_parent(
            trial_uuid,
            json!({"start_date_actual": "2024-06-15T00:00:00Z"})
                .as_object()
                .unwrap(),
        )
        .await
        .unwrap()
        .expect("a timing row exists for the trial");
    assert_eq!(updated["start_date_actual"], json!("2024-06-15"));

    let removed = timing.delete_by_parent(trial_uuid).await.unwrap();
    assert_eq!(removed, 1);
    assert!(timing.find_by_parent(trial_uuid).await.unwrap().is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_update_by_parent_touches_only_first_sibling() {
    let test_db = TestDatabase::new().await;
    let trial = test_db.seed_trial("Sibling patch trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let sites = test_db.db.record_store(&TRIAL_SITES);
    for label in ["alpha", "beta"] {
        sites
            .insert(
                json!({
                    "trial_id": trial_uuid.to_string(),
                    "notes": label,
                })
                .as_object()
                .unwrap(),
            )
            .await
            .expect("insert site row");
    }

    let patched = sites
        .update_by_parent(
            trial_uuid,
            json!({"notes": "patched"}).as_object().unwrap(),
        )
        .await
        .unwrap()
        .expect("a site row exists for the trial");
    assert_eq!(patched["notes"], json!("patched"));

    let rows = sites.find_by_parent(trial_uuid).await.unwrap();
    assert_eq!(rows.len(), 2);
    let patched_count = rows
        .iter()
        .filter(|r| r["notes"] == json!("patched"))
        .count();
    assert_eq!(patched_count, 1, "exactly one sibling row gets the patch");
    assert!(rows.iter().any(|r| {
        r["notes"] == json!("alpha") || r["notes"] == json!("beta")
    }));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_invalid_date_rejected() {
    let test_db = TestDatabase::new().await;
    let trial = test_db.seed_trial("Bad date trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let timing = test_db.db.record_store(&TRIAL_TIMING);
    let err = timing
        .insert(
            json!({
                "trial_id": trial_uuid.to_string(),
                "start_date_actual": "next spring",
            })
            .as_object()
            .unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, trialbase_db::Error::Validation(_)));

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_root_delete_cascades_to_children() {
    let test_db = TestDatabase::new().await;
    let trial = test_db.seed_trial("Cascade trial").await;
    let trial_uuid = row_id(&trial).unwrap();

    let sites = test_db.db.record_store(&TRIAL_SITES);
    for n in 0..3 {
        sites
            .insert(
                json!({
                    "trial_id": trial_uuid.to_string(),
                    "notes": format!("site {n}"),
                })
                .as_object()
                .unwrap(),
            )
            .await
            .expect("insert site row");
    }

    assert!(test_db.db.trials.delete(trial_uuid).await.unwrap());
    assert!(sites.find_by_parent(trial_uuid).await.unwrap().is_empty());

    test_db.cleanup().await;
}
