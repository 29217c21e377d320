//! Drug aggregate root repository.

use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use trialbase_core::{DrugSnapshot, Error, Result};

use crate::records::RecordStore;
use crate::tables::DRUG_OVERVIEW;

/// Repository for `drug_overview` rows. Drugs carry no generated code, so
/// this is a thin veneer over the record store plus the snapshot query the
/// cascade delete needs.
#[derive(Clone)]
pub struct PgDrugRepository {
    pool: PgPool,
    store: RecordStore,
}

impl PgDrugRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: RecordStore::new(pool.clone(), &DRUG_OVERVIEW),
            pool,
        }
    }

    pub async fn create(&self, payload: &Map<String, JsonValue>) -> Result<JsonValue> {
        self.store.insert(payload).await
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

    /// Identifying fields of a drug, captured before destructive operations.
    pub async fn snapshot(&self, id: Uuid) -> Result<Option<DrugSnapshot>> {
        sqlx::query_as::<_, DrugSnapshot>(
            "SELECT id, drug_name, primary_name, therapeutic_area \
             FROM drug_overview WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
