//! Integration tests for sequential trial identifier allocation.
//!
//! This test suite validates:
//! - Generated codes match the `TB-######` shape
//! - Concurrent creators never receive the same code
//! - Allocation probes past manually inserted codes
//!
//! **IMPORTANT**: These tests require a fully migrated PostgreSQL database.
//! Run migrations first: `sqlx migrate run`

use serde_json::json;
use trialbase_db::test_fixtures::{row_id, TestDatabase};

#[tokio::test]
async fn test_generated_code_shape() {
    let test_db = TestDatabase::new().await;

    let trial = test_db.seed_trial("Code shape trial").await;
    let code = trial["trial_id"].as_str().expect("trial_id must be set");

    let re = regex::Regex::new(r"^TB-[0-9]{6,}$").unwrap();
    assert!(re.is_match(code), "unexpected code shape: {code}");

    // Default trial_identifier carries the generated code.
    let identifiers = trial["trial_identifier"]
        .as_array()
        .expect("trial_identifier must default to an array");
    assert_eq!(identifiers, &[json!(code)]);

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_codes() {
    let test_db = TestDatabase::new().await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let trials = test_db.db.trials.clone();
        handles.push(tokio::spawn(async move {
            let payload = json!({"title": format!("Concurrent trial {i}")});
            trials.create(payload.as_object().unwrap()).await
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        let trial = handle
            .await
            .expect("task panicked")
            .expect("create must succeed under contention");
        codes.push(trial["trial_id"].as_str().unwrap().to_string());
        test_db.track_trial(&trial);
    }

    let mut unique = codes.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), codes.len(), "duplicate codes: {codes:?}");

    test_db.cleanup().await;
}

#[tokio::test]
async fn test_allocation_skips_manually_taken_codes() {
    let test_db = TestDatabase::new().await;

    // Occupy the code right after the current maximum.
    let first = test_db.seed_trial("Anchor trial").await;
    let anchor = first["trial_id"].as_str().unwrap();
    let anchor_n: i64 = anchor.trim_start_matches("TB-").parse().unwrap();
    let blocked = format!("TB-{:06}", anchor_n + 1);

    let manual = test_db
        .db
        .trials
        .create(
            json!({"title": "Manually coded trial", "trial_id": blocked})
                .as_object()
                .unwrap(),
        )
        .await
        .expect("manual code insert");
    test_db.track_trial(&manual);
    assert_eq!(manual["trial_id"].as_str().unwrap(), blocked);

    let next = test_db.seed_trial("Probed trial").await;
    let next_code = next["trial_id"].as_str().unwrap();
    assert_ne!(next_code, blocked);
    let next_n: i64 = next_code.trim_start_matches("TB-").parse().unwrap();
    assert!(next_n > anchor_n + 1, "expected probe past {blocked}, got {next_code}");

    assert!(row_id(&next).is_some());
    test_db.cleanup().await;
}
