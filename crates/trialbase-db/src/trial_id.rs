//! Sequential trial identifier allocation under a PostgreSQL advisory lock.
//!
//! Identifiers look like `TB-000123`: a fixed prefix, a dash, and a
//! zero-padded sequence number. Allocation runs inside the caller's
//! transaction under `pg_advisory_xact_lock`, so concurrent creators
//! serialize on the sequence and the lock covers the insert that consumes
//! the code.

use sqlx::postgres::{PgConnection, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use trialbase_core::{Error, Result};

/// Advisory lock key guarding the trial identifier sequence.
const SEQUENCE_LOCK_KEY: i64 = 823_501;

/// Consecutive candidates probed for uniqueness within one locked section.
const PROBE_LIMIT: u32 = 100;

/// Zero-padded width of the numeric suffix.
const SUFFIX_WIDTH: usize = 6;

/// Allocates unique sequential codes for one table column.
#[derive(Clone)]
pub struct TrialIdAllocator {
    table: &'static str,
    column: &'static str,
    prefix: &'static str,
}

impl TrialIdAllocator {
    /// Allocator for `trial_overview.trial_id` codes (`TB-######`).
    pub fn for_trials() -> Self {
        Self {
            table: "trial_overview",
            column: "trial_id",
            prefix: "TB",
        }
    }

    fn format_code(&self, n: i64) -> String {
        format!("{}-{:0width$}", self.prefix, n, width = SUFFIX_WIDTH)
    }

    /// Allocate within an open transaction using `pg_advisory_xact_lock`.
    ///
    /// The lock persists until the surrounding transaction commits or rolls
    /// back, which also covers the insert that consumes the code.
    pub async fn allocate_in_tx(&self, tx: &mut Transaction<'_, Postgres>) -> Result<String> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEQUENCE_LOCK_KEY)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        self.next_free_code(&mut *tx).await
    }

    /// Read the highest existing suffix and probe forward for a free code.
    /// Caller must hold the sequence lock.
    async fn next_free_code(&self, conn: &mut PgConnection) -> Result<String> {
        let pattern = format!("^{}-[0-9]+$", self.prefix);
        let sql = format!(
            "SELECT COALESCE(MAX(CAST(SUBSTRING({col} FROM '{prefix}-([0-9]+)') AS BIGINT)), 0) \
             FROM {table} WHERE {col} ~ $1",
            col = self.column,
            prefix = self.prefix,
            table = self.table,
        );
        let max_suffix: i64 = sqlx::query_scalar(&sql)
            .bind(&pattern)
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::Database)?;

        let exists_sql = format!(
            "SELECT id FROM {table} WHERE {col} = $1 LIMIT 1",
            table = self.table,
            col = self.column,
        );
        let mut next = max_suffix + 1;
        for _ in 0..PROBE_LIMIT {
            let candidate = self.format_code(next);
            let taken: Option<Uuid> = sqlx::query_scalar(&exists_sql)
                .bind(&candidate)
                .fetch_optional(&mut *conn)
                .await
                .map_err(Error::Database)?;
            if taken.is_none() {
                return Ok(candidate);
            }
            next += 1;
        }
        Err(Error::IdentifierAllocation(format!(
            "no free code within {PROBE_LIMIT} candidates after {}",
            self.format_code(max_suffix)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> TrialIdAllocator {
        TrialIdAllocator::for_trials()
    }

    #[test]
    fn test_code_format_zero_pads_to_six_digits() {
        let a = allocator();
        assert_eq!(a.format_code(1), "TB-000001");
        assert_eq!(a.format_code(123), "TB-000123");
        assert_eq!(a.format_code(999_999), "TB-999999");
    }

    #[test]
    fn test_code_format_grows_past_padding_width() {
        let a = allocator();
        assert_eq!(a.format_code(1_234_567), "TB-1234567");
    }

    #[test]
    fn test_codes_match_public_pattern() {
        let re = regex::Regex::new(r"^TB-[0-9]{6,}$").unwrap();
        let a = allocator();
        for n in [1, 42, 100_000, 10_000_000] {
            assert!(re.is_match(&a.format_code(n)));
        }
    }
}
