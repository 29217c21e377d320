//! PostgreSQL approval queue repository.
//!
//! Pending changes record a proposed mutation plus the decision made on it.
//! Approving or rejecting flips the decision flags only; nothing here ever
//! applies `proposed_data` to the target table.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use trialbase_core::{
    Error, PendingChange, PendingChangeFilter, PendingChangeRepository, Result,
    SubmitChangeRequest,
};

const COLUMNS: &str = "id, target_table, target_record_id, proposed_data, change_type, \
     submitted_by, submitted_at, is_approved, approved_by, approved_at, rejected, \
     rejection_reason";

/// Approval queue backed by the `pending_changes` table.
#[derive(Clone)]
pub struct PgPendingChangeRepository {
    pool: PgPool,
}

impl PgPendingChangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingChangeRepository for PgPendingChangeRepository {
    async fn submit(&self, req: SubmitChangeRequest) -> Result<PendingChange> {
        let sql = format!(
            "INSERT INTO pending_changes \
             (target_table, target_record_id, proposed_data, change_type, submitted_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingChange>(&sql)
            .bind(&req.target_table)
            .bind(req.target_record_id)
            .bind(&req.proposed_data)
            .bind(req.change_type.as_str())
            .bind(req.submitted_by)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_all(&self, filter: PendingChangeFilter) -> Result<Vec<PendingChange>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM pending_changes \
             WHERE ($1::BOOLEAN IS NULL OR is_approved = $1) \
               AND ($2::BOOLEAN IS NULL OR rejected = $2) \
             ORDER BY submitted_at DESC"
        );
        sqlx::query_as::<_, PendingChange>(&sql)
            .bind(filter.is_approved)
            .bind(filter.rejected)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PendingChange>> {
        let sql = format!("SELECT {COLUMNS} FROM pending_changes WHERE id = $1");
        sqlx::query_as::<_, PendingChange>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn approve(&self, id: Uuid, approved_by: Uuid) -> Result<Option<PendingChange>> {
        let sql = format!(
            "UPDATE pending_changes SET \
             is_approved = TRUE, rejected = FALSE, rejection_reason = NULL, \
             approved_by = $2, approved_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingChange>(&sql)
            .bind(id)
            .bind(approved_by)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn reject(
        &self,
        id: Uuid,
        approved_by: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<PendingChange>> {
        let sql = format!(
            "UPDATE pending_changes SET \
             rejected = TRUE, is_approved = FALSE, rejection_reason = $3, \
             approved_by = $2, approved_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingChange>(&sql)
            .bind(id)
            .bind(approved_by)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_changes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
