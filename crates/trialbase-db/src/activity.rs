//! PostgreSQL audit log repository.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::warn;
use uuid::Uuid;

use trialbase_core::{
    ActivityLogEntry, ActivityLogRepository, Error, NewActivityEntry, Result,
};

const INSERT_SQL: &str = "INSERT INTO user_activity \
     (user_id, table_name, record_id, action_type, change_details) \
     VALUES ($1, $2, $3, $4, $5) \
     RETURNING id, user_id, table_name, record_id, action_type, change_details, created_at";

/// Append-only audit log backed by the `user_activity` table.
#[derive(Clone)]
pub struct PgActivityLogRepository {
    pool: PgPool,
}

impl PgActivityLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogRepository for PgActivityLogRepository {
    async fn log(&self, entry: NewActivityEntry) -> Result<ActivityLogEntry> {
        sqlx::query_as::<_, ActivityLogEntry>(INSERT_SQL)
            .bind(entry.user_id)
            .bind(&entry.table_name)
            .bind(entry.record_id)
            .bind(entry.action_type.as_str())
            .bind(&entry.change_details)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn log_non_fatal(&self, entry: NewActivityEntry) -> Option<ActivityLogEntry> {
        let table_name = entry.table_name.clone();
        let action = entry.action_type;
        match self.log(entry).await {
            Ok(logged) => Some(logged),
            Err(err) => {
                warn!(
                    subsystem = "database",
                    component = "activity",
                    op = "log",
                    table_name = %table_name,
                    action_type = %action,
                    error = %err,
                    "Activity log append failed; continuing without audit entry"
                );
                None
            }
        }
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ActivityLogEntry>> {
        sqlx::query_as::<_, ActivityLogEntry>(
            "SELECT id, user_id, table_name, record_id, action_type, change_details, created_at \
             FROM user_activity WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn list_all(
        &self,
        table_name: Option<&str>,
        action_type: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>> {
        sqlx::query_as::<_, ActivityLogEntry>(
            "SELECT id, user_id, table_name, record_id, action_type, change_details, created_at \
             FROM user_activity \
             WHERE ($1::TEXT IS NULL OR table_name = $1) \
               AND ($2::TEXT IS NULL OR action_type = $2) \
             ORDER BY created_at DESC",
        )
        .bind(table_name)
        .bind(action_type)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_activity WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
