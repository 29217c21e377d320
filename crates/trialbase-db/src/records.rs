//! Generic JSON record store for the wide trial/drug aggregate tables.
//!
//! The aggregate tables are wide, sparsely populated, and almost entirely
//! optional, so rows move through this layer as JSON objects instead of one
//! struct per table. Every table is described by a static [`TableSpec`] whose
//! column whitelist is the only source of identifiers that ever reach a SQL
//! string; payload keys not in the whitelist are dropped, and values bind as
//! typed parameters. Rows come back as JSON via `to_jsonb` so handlers can
//! return them untouched.

use chrono::NaiveDate;
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::{PgArguments, PgPool, Postgres};
use sqlx::query::Query;
use sqlx::{Row, Transaction};
use uuid::Uuid;

use trialbase_core::{normalize::scalar_to_string, Error, Result};

/// Storage type of a whitelisted column, driving payload coercion and
/// parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// TEXT. Arrays join with `", "`, scalars stringify.
    Text,
    /// TEXT[]. Comma-separated strings split, scalars wrap.
    TextArray,
    /// INT4. Numeric strings parse; anything unparseable stores NULL.
    Int,
    /// BOOLEAN. Accepts booleans, common string spellings, and 0/1.
    Bool,
    /// DATE. `YYYY-MM-DD`, or the date part of an ISO-8601 timestamp.
    Date,
    /// UUID foreign keys.
    Uuid,
    /// JSONB, stored verbatim.
    Jsonb,
}

/// Static description of one aggregate table.
#[derive(Debug)]
pub struct TableSpec {
    /// SQL table name.
    pub table: &'static str,
    /// Foreign-key column pointing at the aggregate root, if this is a
    /// child table.
    pub parent_fk: Option<&'static str>,
    /// Writable columns. Only names listed here ever appear in generated SQL.
    pub columns: &'static [(&'static str, ColumnKind)],
    /// Whether the table carries `created_at`/`updated_at` columns.
    pub has_timestamps: bool,
}

impl TableSpec {
    fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, kind)| *kind)
    }
}

/// An owned, typed value ready to bind as a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(Option<String>),
    TextArray(Option<Vec<String>>),
    Int(Option<i32>),
    Bool(Option<bool>),
    Date(Option<NaiveDate>),
    Uuid(Option<Uuid>),
    Jsonb(Option<JsonValue>),
}

impl BindValue {
    fn bind_to<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            BindValue::Text(v) => query.bind(v),
            BindValue::TextArray(v) => query.bind(v),
            BindValue::Int(v) => query.bind(v),
            BindValue::Bool(v) => query.bind(v),
            BindValue::Date(v) => query.bind(v),
            BindValue::Uuid(v) => query.bind(v),
            BindValue::Jsonb(v) => query.bind(v),
        }
    }
}

/// Coerce one payload value to the column's storage type.
///
/// Mirrors the lenient intake the aggregate endpoints promise: clients may
/// send strings for arrays, arrays for strings, numbers for text, and so on.
/// Only malformed dates and foreign keys are rejected outright.
pub fn coerce(column: &str, kind: ColumnKind, value: &JsonValue) -> Result<BindValue> {
    if value.is_null() {
        return Ok(match kind {
            ColumnKind::Text => BindValue::Text(None),
            ColumnKind::TextArray => BindValue::TextArray(None),
            ColumnKind::Int => BindValue::Int(None),
            ColumnKind::Bool => BindValue::Bool(None),
            ColumnKind::Date => BindValue::Date(None),
            ColumnKind::Uuid => BindValue::Uuid(None),
            ColumnKind::Jsonb => BindValue::Jsonb(None),
        });
    }

    match kind {
        ColumnKind::Text => {
            let s = match value {
                JsonValue::Array(items) => items
                    .iter()
                    .map(scalar_to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => scalar_to_string(other),
            };
            Ok(BindValue::Text(Some(s)))
        }
        ColumnKind::TextArray => {
            let items = match value {
                JsonValue::String(s) => {
                    s.split(',').map(|i| i.trim().to_string()).collect()
                }
                JsonValue::Array(items) => items.iter().map(scalar_to_string).collect(),
                other => vec![scalar_to_string(other)],
            };
            Ok(BindValue::TextArray(Some(items)))
        }
        ColumnKind::Int => Ok(BindValue::Int(parse_int(value))),
        ColumnKind::Bool => Ok(BindValue::Bool(parse_bool(value))),
        ColumnKind::Date => match value {
            JsonValue::String(s) if s.trim().is_empty() => Ok(BindValue::Date(None)),
            JsonValue::String(s) => parse_date(s)
                .map(|d| BindValue::Date(Some(d)))
                .ok_or_else(|| {
                    Error::Validation(format!("invalid date value for column `{column}`: {s}"))
                }),
            other => Err(Error::Validation(format!(
                "invalid date value for column `{column}`: {other}"
            ))),
        },
        ColumnKind::Uuid => match value {
            JsonValue::String(s) => Uuid::parse_str(s.trim())
                .map(|u| BindValue::Uuid(Some(u)))
                .map_err(|_| {
                    Error::Validation(format!("invalid UUID value for column `{column}`: {s}"))
                }),
            other => Err(Error::Validation(format!(
                "invalid UUID value for column `{column}`: {other}"
            ))),
        },
        ColumnKind::Jsonb => Ok(BindValue::Jsonb(Some(value.clone()))),
    }
}

fn parse_int(value: &JsonValue) -> Option<i32> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|i| i32::try_from(i).ok()),
        JsonValue::String(s) => s.trim().parse::<i32>().ok(),
        JsonValue::Bool(b) => Some(i32::from(*b)),
        _ => None,
    }
}

fn parse_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_i64().map(|i| i != 0),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some(true),
            "false" | "f" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(d);
    }
    // Timestamps keep their date part (e.g. "2024-05-01T00:00:00Z").
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Payload columns filtered against the whitelist, with coerced bind values.
struct PreparedColumns {
    names: Vec<&'static str>,
    values: Vec<BindValue>,
}

/// CRUD over one whitelisted aggregate table, rows as JSON.
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
    spec: &'static TableSpec,
}

impl RecordStore {
    pub fn new(pool: PgPool, spec: &'static TableSpec) -> Self {
        Self { pool, spec }
    }

    pub fn spec(&self) -> &'static TableSpec {
        self.spec
    }

    pub fn table(&self) -> &'static str {
        self.spec.table
    }

    /// Filter the payload to whitelisted columns (whitelist order) and coerce
    /// each value. Unknown keys and `id` are dropped silently.
    fn prepare(&self, payload: &Map<String, JsonValue>, skip_fk: bool) -> Result<PreparedColumns> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for (name, kind) in self.spec.columns {
            if skip_fk && Some(*name) == self.spec.parent_fk {
                continue;
            }
            let Some(value) = payload.get(*name) else {
                continue;
            };
            names.push(*name);
            values.push(coerce(name, *kind, value)?);
        }
        Ok(PreparedColumns { names, values })
    }

    fn build_insert_sql(&self, columns: &[&'static str]) -> String {
        if columns.is_empty() {
            return format!(
                "WITH inserted AS (INSERT INTO {} DEFAULT VALUES RETURNING *) \
                 SELECT to_jsonb(inserted) AS row FROM inserted",
                self.spec.table
            );
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        format!(
            "WITH inserted AS (INSERT INTO {} ({}) VALUES ({}) RETURNING *) \
             SELECT to_jsonb(inserted) AS row FROM inserted",
            self.spec.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn build_update_sql(&self, columns: &[&'static str], where_column: &str) -> String {
        let mut assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name} = ${}", i + 1))
            .collect();
        if self.spec.has_timestamps {
            assignments.push("updated_at = NOW()".to_string());
        }
        format!(
            "WITH updated AS (UPDATE {} SET {} WHERE {} = ${} RETURNING *) \
             SELECT to_jsonb(updated) AS row FROM updated",
            self.spec.table,
            assignments.join(", "),
            where_column,
            columns.len() + 1
        )
    }

    fn parent_fk(&self) -> Result<&'static str> {
        self.spec.parent_fk.ok_or_else(|| {
            Error::Internal(format!(
                "table `{}` has no parent relation",
                self.spec.table
            ))
        })
    }

    /// Insert one row from a JSON payload, returning the stored row.
    pub async fn insert(&self, payload: &Map<String, JsonValue>) -> Result<JsonValue> {
        let prepared = self.prepare(payload, false)?;
        let sql = self.build_insert_sql(&prepared.names);
        let mut query = sqlx::query(&sql);
        for value in prepared.values {
            query = value.bind_to(query);
        }
        let row = query.fetch_one(&self.pool).await.map_err(Error::Database)?;
        row.try_get("row").map_err(Error::Database)
    }

    /// Insert within an open transaction.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: &Map<String, JsonValue>,
    ) -> Result<JsonValue> {
        let prepared = self.prepare(payload, false)?;
        let sql = self.build_insert_sql(&prepared.names);
        let mut query = sqlx::query(&sql);
        for value in prepared.values {
            query = value.bind_to(query);
        }
        let row = query.fetch_one(&mut **tx).await.map_err(Error::Database)?;
        row.try_get("row").map_err(Error::Database)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<JsonValue>> {
        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE t.id = $1",
            self.spec.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(|r| r.try_get("row").map_err(Error::Database))
            .transpose()
    }

    /// All rows, newest first when the table is timestamped.
    pub async fn list_all(&self) -> Result<Vec<JsonValue>> {
        let order = if self.spec.has_timestamps {
            " ORDER BY t.created_at DESC"
        } else {
            ""
        };
        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t{order}",
            self.spec.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter()
            .map(|r| r.try_get("row").map_err(Error::Database))
            .collect()
    }

    /// All rows belonging to one aggregate root.
    pub async fn find_by_parent(&self, parent_id: Uuid) -> Result<Vec<JsonValue>> {
        let fk = self.parent_fk()?;
        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {} t WHERE t.{fk} = $1",
            self.spec.table
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter()
            .map(|r| r.try_get("row").map_err(Error::Database))
            .collect()
    }

    /// Patch one row by primary key. Returns `None` when no row matched.
    /// An empty patch (no whitelisted keys) reads the row back unchanged.
    pub async fn update(
        &self,
        id: Uuid,
        payload: &Map<String, JsonValue>,
    ) -> Result<Option<JsonValue>> {
        let prepared = self.prepare(payload, true)?;
        if prepared.names.is_empty() {
            return self.find_by_id(id).await;
        }
        let sql = self.build_update_sql(&prepared.names, "id");
        let mut query = sqlx::query(&sql);
        for value in prepared.values {
            query = value.bind_to(query);
        }
        let row = query
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(|r| r.try_get("row").map_err(Error::Database))
            .transpose()
    }

    /// Patch the first existing child row of one aggregate root, leaving any
    /// sibling rows untouched. Returns `None` when the root has no child row
    /// yet.
    pub async fn update_by_parent(
        &self,
        parent_id: Uuid,
        payload: &Map<String, JsonValue>,
    ) -> Result<Option<JsonValue>> {
        let fk = self.parent_fk()?;
        let sql = format!(
            "SELECT id FROM {} WHERE {fk} = $1 ORDER BY id LIMIT 1",
            self.spec.table
        );
        let first: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        match first {
            Some(id) => self.update(id, payload).await,
            None => Ok(None),
        }
    }

    /// Delete one row by primary key.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.spec.table);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every child row of one aggregate root, returning the count.
    pub async fn delete_by_parent(&self, parent_id: Uuid) -> Result<u64> {
        let fk = self.parent_fk()?;
        let sql = format!("DELETE FROM {} WHERE {fk} = $1", self.spec.table);
        let result = sqlx::query(&sql)
            .bind(parent_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TEST_SPEC: TableSpec = TableSpec {
        table: "trial_sites",
        parent_fk: Some("trial_id"),
        columns: &[
            ("trial_id", ColumnKind::Uuid),
            ("total", ColumnKind::Int),
            ("notes", ColumnKind::Text),
            ("study_sites", ColumnKind::TextArray),
            ("site_notes", ColumnKind::Jsonb),
        ],
        has_timestamps: false,
    };

    fn store() -> RecordStore {
        // Connect lazily so SQL-shape tests never touch a server.
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        RecordStore::new(pool, &TEST_SPEC)
    }

    #[tokio::test]
    async fn test_insert_sql_uses_whitelist_order_and_placeholders() {
        let s = store();
        let payload = json!({
            "notes": "a",
            "total": 3,
            "hax": "DROP TABLE trial_sites",
        });
        let prepared = s.prepare(payload.as_object().unwrap(), false).unwrap();
        assert_eq!(prepared.names, vec!["total", "notes"]);
        let sql = s.build_insert_sql(&prepared.names);
        assert_eq!(
            sql,
            "WITH inserted AS (INSERT INTO trial_sites (total, notes) VALUES ($1, $2) \
             RETURNING *) SELECT to_jsonb(inserted) AS row FROM inserted"
        );
        assert!(!sql.contains("hax"));
        assert!(!sql.contains("DROP"));
    }

    #[tokio::test]
    async fn test_insert_sql_empty_payload_uses_default_values() {
        let s = store();
        let sql = s.build_insert_sql(&[]);
        assert!(sql.contains("INSERT INTO trial_sites DEFAULT VALUES"));
    }

    #[tokio::test]
    async fn test_update_sql_appends_where_param() {
        let s = store();
        let sql = s.build_update_sql(&["total", "notes"], "id");
        assert_eq!(
            sql,
            "WITH updated AS (UPDATE trial_sites SET total = $1, notes = $2 WHERE id = $3 \
             RETURNING *) SELECT to_jsonb(updated) AS row FROM updated"
        );
    }

    #[tokio::test]
    async fn test_update_skips_parent_fk_column() {
        let s = store();
        let payload = json!({
            "trial_id": "2c0f6f4e-3f93-4b2f-8c08-44f56b4c98ad",
            "notes": "keep",
        });
        let prepared = s.prepare(payload.as_object().unwrap(), true).unwrap();
        assert_eq!(prepared.names, vec!["notes"]);
    }

    #[test]
    fn test_coerce_text_from_array_and_number() {
        assert_eq!(
            coerce("notes", ColumnKind::Text, &json!(["a", "b"])).unwrap(),
            BindValue::Text(Some("a, b".to_string()))
        );
        assert_eq!(
            coerce("notes", ColumnKind::Text, &json!(42)).unwrap(),
            BindValue::Text(Some("42".to_string()))
        );
    }

    #[test]
    fn test_coerce_text_array_from_comma_string() {
        assert_eq!(
            coerce("study_sites", ColumnKind::TextArray, &json!("Mayo, Hopkins")).unwrap(),
            BindValue::TextArray(Some(vec!["Mayo".to_string(), "Hopkins".to_string()]))
        );
    }

    #[test]
    fn test_coerce_int_lenient() {
        assert_eq!(
            coerce("total", ColumnKind::Int, &json!("12")).unwrap(),
            BindValue::Int(Some(12))
        );
        // Unparseable numerics store NULL rather than failing the request.
        assert_eq!(
            coerce("total", ColumnKind::Int, &json!("a lot")).unwrap(),
            BindValue::Int(None)
        );
    }

    #[test]
    fn test_coerce_bool_spellings() {
        for v in [json!(true), json!("TRUE"), json!("yes"), json!(1)] {
            assert_eq!(
                coerce("flag", ColumnKind::Bool, &v).unwrap(),
                BindValue::Bool(Some(true)),
                "value: {v}"
            );
        }
        assert_eq!(
            coerce("flag", ColumnKind::Bool, &json!("nope")).unwrap(),
            BindValue::Bool(None)
        );
    }

    #[test]
    fn test_coerce_date_accepts_iso_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            coerce("start", ColumnKind::Date, &json!("2024-05-01")).unwrap(),
            BindValue::Date(Some(expected))
        );
        assert_eq!(
            coerce("start", ColumnKind::Date, &json!("2024-05-01T00:00:00Z")).unwrap(),
            BindValue::Date(Some(expected))
        );
        assert_eq!(
            coerce("start", ColumnKind::Date, &json!("")).unwrap(),
            BindValue::Date(None)
        );
        assert!(coerce("start", ColumnKind::Date, &json!("May 1st")).is_err());
    }

    #[test]
    fn test_coerce_invalid_uuid_rejected() {
        let err = coerce("trial_id", ColumnKind::Uuid, &json!("not-a-uuid")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_coerce_null_binds_null_for_every_kind() {
        assert_eq!(
            coerce("x", ColumnKind::Int, &JsonValue::Null).unwrap(),
            BindValue::Int(None)
        );
        assert_eq!(
            coerce("x", ColumnKind::Jsonb, &JsonValue::Null).unwrap(),
            BindValue::Jsonb(None)
        );
    }
}
