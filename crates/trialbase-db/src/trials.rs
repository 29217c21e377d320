//! Trial aggregate root repository.

use rand::Rng;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgPool;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use trialbase_core::{Error, Result, TrialSnapshot};

use crate::records::RecordStore;
use crate::tables::TRIAL_OVERVIEW;
use crate::trial_id::TrialIdAllocator;

/// Attempts at allocating a code and inserting the row before giving up.
const MAX_CREATE_ATTEMPTS: u32 = 20;

/// Repository for `trial_overview` rows.
///
/// Wraps the record store with trial-specific intake: every created trial
/// gets a unique `TB-######` code. When the client did not supply one, the
/// code is allocated and the row inserted in a single transaction under the
/// sequence lock, so the code cannot be taken between allocation and insert.
#[derive(Clone)]
pub struct PgTrialRepository {
    pool: PgPool,
    store: RecordStore,
    allocator: TrialIdAllocator,
}

impl PgTrialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: RecordStore::new(pool.clone(), &TRIAL_OVERVIEW),
            allocator: TrialIdAllocator::for_trials(),
            pool,
        }
    }

    /// Insert a trial root. Allocates a `trial_id` code when the payload has
    /// none, and defaults `trial_identifier` to a one-element array holding
    /// that code.
    pub async fn create(&self, payload: &Map<String, JsonValue>) -> Result<JsonValue> {
        let supplied = payload
            .get("trial_id")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        match supplied {
            Some(code) => {
                let payload = with_code(payload, code);
                self.store.insert(&payload).await
            }
            None => self.create_with_generated_code(payload).await,
        }
    }

    /// Allocate a code and insert the row in one transaction. Transient
    /// allocation failures retry with exponential backoff and jitter; insert
    /// failures roll back and propagate.
    async fn create_with_generated_code(
        &self,
        payload: &Map<String, JsonValue>,
    ) -> Result<JsonValue> {
        let mut last_error: Option<Error> = None;
        for attempt in 0..MAX_CREATE_ATTEMPTS {
            if attempt > 0 {
                let base = 10u64 * (1 << attempt.min(10));
                let jitter = rand::thread_rng().gen_range(0..10);
                tokio::time::sleep(Duration::from_millis(base + jitter)).await;
            }
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            let code = match self.allocator.allocate_in_tx(&mut tx).await {
                Ok(code) => code,
                Err(err) => {
                    warn!(
                        subsystem = "database",
                        component = "trials",
                        attempt,
                        error = %err,
                        "Trial identifier allocation attempt failed"
                    );
                    last_error = Some(err);
                    continue;
                }
            };
            let payload = with_code(payload, code.clone());
            let row = self.store.insert_tx(&mut tx, &payload).await?;
            tx.commit().await.map_err(Error::Database)?;
            debug!(
                subsystem = "database",
                component = "trials",
                op = "create",
                trial_code = %code,
                attempt,
                "Assigned generated trial identifier"
            );
            return Ok(row);
        }
        Err(Error::IdentifierAllocation(format!(
            "exhausted {MAX_CREATE_ATTEMPTS} attempts: {}",
            last_error.map_or_else(|| "no free candidate".to_string(), |e| e.to_string())
        )))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<JsonValue>> {
        self.store.find_by_id(id).await
    }

    pub async fn list_all(&self) -> Result<Vec<JsonValue>> {
        self.store.list_all().await
    }

    pub async fn update(
        &self,
        id: Uuid,
        payload: &Map<String, JsonValue>,
    ) -> Result<Option<JsonValue>> {
        self.store.update(id, payload).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.store.delete(id).await
    }

    /// Identifying fields of a trial, captured before destructive operations.
    pub async fn snapshot(&self, id: Uuid) -> Result<Option<TrialSnapshot>> {
        sqlx::query_as::<_, TrialSnapshot>(
            "SELECT id, trial_id, trial_identifier, title, therapeutic_area \
             FROM trial_overview WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

/// Copy the payload with `trial_id` set and `trial_identifier` defaulted to
/// a one-element array holding the code.
fn with_code(payload: &Map<String, JsonValue>, code: String) -> Map<String, JsonValue> {
    let mut payload = payload.clone();
    payload.insert("trial_id".to_string(), JsonValue::String(code.clone()));
    let identifier_missing = payload
        .get("trial_identifier")
        .map_or(true, JsonValue::is_null);
    if identifier_missing {
        payload.insert(
            "trial_identifier".to_string(),
            JsonValue::Array(vec![JsonValue::String(code)]),
        );
    }
    payload
}
