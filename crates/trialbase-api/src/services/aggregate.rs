//! Aggregate workflow orchestrator.
//!
//! Coordinates multi-table creates, updates, and cascading deletes for the
//! trial and drug aggregates. The orchestration is deliberately
//! non-transactional: once the root row exists the operation keeps going,
//! and whatever failed afterwards is reported instead of rolled back. Audit
//! entries for a create are accumulated and flushed at the end with bounded
//! retries so a flaky audit table cannot abort the business write.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use trialbase_core::{
    ensure_array_fields, ensure_string_fields, ActionType, ActivityLogRepository, Error,
    NewActivityEntry, Result,
};
use trialbase_db::tables::{
    DRUG_CHILDREN, DRUG_OVERVIEW, DRUG_STRING_FIELDS, TRIAL_ARRAY_FIELDS, TRIAL_CHILDREN,
    TRIAL_OVERVIEW, TRIAL_STRING_FIELDS,
};
use trialbase_db::{Database, RecordStore, TableSpec};

/// Attempts per audit entry during the post-create flush.
const LOG_FLUSH_ATTEMPTS: u32 = 3;

/// Which aggregate a service instance orchestrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Trial,
    Drug,
}

impl AggregateKind {
    fn label(self) -> &'static str {
        match self {
            AggregateKind::Trial => "Trial",
            AggregateKind::Drug => "Drug",
        }
    }

    fn root_spec(self) -> &'static TableSpec {
        match self {
            AggregateKind::Trial => &TRIAL_OVERVIEW,
            AggregateKind::Drug => &DRUG_OVERVIEW,
        }
    }

    fn children(self) -> &'static [(&'static str, &'static TableSpec)] {
        match self {
            AggregateKind::Trial => TRIAL_CHILDREN,
            AggregateKind::Drug => DRUG_CHILDREN,
        }
    }

    fn normalize_overview(self, overview: &mut Map<String, JsonValue>) {
        match self {
            AggregateKind::Trial => {
                ensure_array_fields(overview, TRIAL_ARRAY_FIELDS);
                ensure_string_fields(overview, TRIAL_STRING_FIELDS);
            }
            AggregateKind::Drug => {
                ensure_string_fields(overview, DRUG_STRING_FIELDS);
            }
        }
    }
}

/// One entry in the post-create audit flush report.
#[derive(Debug, Clone, Serialize)]
pub struct LogResult {
    pub table: String,
    pub status: &'static str,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of the audit flush attached to aggregate-create responses.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub status: &'static str,
    pub total_logs: usize,
    pub log_results: Vec<LogResult>,
}

/// A child-table step that failed during orchestration.
#[derive(Debug, Clone, Serialize)]
pub struct SectionFailure {
    pub section: String,
    pub error: String,
}

/// Result of an aggregate create.
#[derive(Debug, Serialize)]
pub struct CreateOutcome {
    pub root: JsonValue,
    pub created: Map<String, JsonValue>,
    pub failures: Vec<SectionFailure>,
    pub activity_logging: ActivitySummary,
}

/// Result of an aggregate update.
#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub updated: Map<String, JsonValue>,
    pub failures: Vec<SectionFailure>,
}

/// Result of a cascading delete.
#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub snapshot: JsonValue,
    pub deleted: Map<String, JsonValue>,
    pub total: u64,
}

/// Orchestrates one aggregate family (trials or drugs).
#[derive(Clone)]
pub struct AggregateService {
    db: Database,
    kind: AggregateKind,
}

impl AggregateService {
    pub fn new(db: Database, kind: AggregateKind) -> Self {
        Self { db, kind }
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    fn root_store(&self) -> RecordStore {
        self.db.record_store(self.kind.root_spec())
    }

    fn child_store(&self, spec: &'static TableSpec) -> RecordStore {
        self.db.record_store(spec)
    }

    fn not_found(&self) -> Error {
        Error::NotFound(self.kind.label().to_string())
    }

    /// Create the root and every supplied child section, then flush the
    /// accumulated audit entries. Child failures after the root insert do
    /// not abort the operation; they are reported in the outcome.
    pub async fn create_with_all_data(
        &self,
        user_id: Uuid,
        overview: Map<String, JsonValue>,
        sections: &Map<String, JsonValue>,
    ) -> Result<CreateOutcome> {
        let mut overview = overview;
        self.kind.normalize_overview(&mut overview);

        let root = match self.kind {
            AggregateKind::Trial => self.db.trials.create(&overview).await?,
            AggregateKind::Drug => self.db.drugs.create(&overview).await?,
        };
        let root_id = row_uuid(&root).ok_or_else(|| {
            Error::Internal(format!("{} insert returned no id", self.kind.label()))
        })?;

        let mut pending_logs = vec![NewActivityEntry {
            user_id,
            table_name: self.kind.root_spec().table.to_string(),
            record_id: Some(root_id),
            action_type: ActionType::Insert,
            change_details: Some(JsonValue::Object(overview)),
        }];
        let mut created = Map::new();
        created.insert("overview".to_string(), root.clone());
        let mut failures = Vec::new();

        for (section, spec) in self.kind.children() {
            let Some(supplied) = sections.get(*section) else {
                continue;
            };
            let store = self.child_store(spec);
            let mut rows = Vec::new();
            for payload in section_payloads(supplied) {
                let mut payload = payload;
                inject_parent_fk(&mut payload, spec, root_id);
                match store.insert(&payload).await {
                    Ok(row) => {
                        pending_logs.push(NewActivityEntry {
                            user_id,
                            table_name: spec.table.to_string(),
                            record_id: row_uuid(&row),
                            action_type: ActionType::Insert,
                            change_details: Some(JsonValue::Object(payload)),
                        });
                        rows.push(row);
                    }
                    Err(err) => {
                        warn!(
                            subsystem = "api",
                            component = "aggregate",
                            op = "create",
                            section = *section,
                            error = %err,
                            "Child insert failed; continuing with remaining sections"
                        );
                        failures.push(SectionFailure {
                            section: section.to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
            if !rows.is_empty() {
                created.insert(section.to_string(), JsonValue::Array(rows));
            }
        }

        let activity_logging = self.flush_logs(pending_logs, failures.is_empty()).await;

        info!(
            subsystem = "api",
            component = "aggregate",
            op = "create",
            kind = self.kind.label(),
            root_id = %root_id,
            sections_created = created.len(),
            sections_failed = failures.len(),
            "Aggregate created"
        );
        Ok(CreateOutcome {
            root,
            created,
            failures,
            activity_logging,
        })
    }

    /// Flush pending audit entries, retrying each up to
    /// [`LOG_FLUSH_ATTEMPTS`] times with linear backoff. A failed entry is
    /// recorded but never aborts the remaining entries.
    async fn flush_logs(
        &self,
        entries: Vec<NewActivityEntry>,
        sections_clean: bool,
    ) -> ActivitySummary {
        let total_logs = entries.len();
        let mut log_results = Vec::with_capacity(total_logs);

        for entry in entries {
            let table = entry.table_name.clone();
            let mut last_error = None;
            let mut attempts = 0;
            for attempt in 1..=LOG_FLUSH_ATTEMPTS {
                attempts = attempt;
                match self.db.activity.log(entry.clone()).await {
                    Ok(_) => {
                        last_error = None;
                        break;
                    }
                    Err(err) => {
                        last_error = Some(err.to_string());
                        if attempt < LOG_FLUSH_ATTEMPTS {
                            tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 1000))
                                .await;
                        }
                    }
                }
            }
            match last_error {
                None => log_results.push(LogResult {
                    table,
                    status: "success",
                    attempts,
                    error: None,
                }),
                Some(error) => {
                    warn!(
                        subsystem = "api",
                        component = "aggregate",
                        op = "log_flush",
                        table = %table,
                        attempts,
                        error = %error,
                        "Audit entry could not be written"
                    );
                    log_results.push(LogResult {
                        table,
                        status: "failed",
                        attempts,
                        error: Some(error),
                    });
                }
            }
        }

        let all_logged = log_results.iter().all(|r| r.status == "success");
        ActivitySummary {
            status: if all_logged && sections_clean {
                "success"
            } else {
                "partial_failure"
            },
            total_logs,
            log_results,
        }
    }

    /// Update the root and upsert each supplied child section: sections with
    /// existing rows are patched in place, missing ones are inserted.
    pub async fn update_all_data(
        &self,
        root_id: Uuid,
        user_id: Uuid,
        overview: Option<Map<String, JsonValue>>,
        sections: &Map<String, JsonValue>,
    ) -> Result<UpdateOutcome> {
        let root_store = self.root_store();
        if root_store.find_by_id(root_id).await?.is_none() {
            return Err(self.not_found());
        }

        let mut updated = Map::new();
        let mut failures = Vec::new();

        if let Some(mut overview) = overview {
            self.kind.normalize_overview(&mut overview);
            match root_store.update(root_id, &overview).await? {
                Some(row) => {
                    self.db
                        .activity
                        .log_non_fatal(NewActivityEntry {
                            user_id,
                            table_name: self.kind.root_spec().table.to_string(),
                            record_id: Some(root_id),
                            action_type: ActionType::Update,
                            change_details: Some(JsonValue::Object(overview)),
                        })
                        .await;
                    updated.insert("overview".to_string(), row);
                }
                None => return Err(self.not_found()),
            }
        }

        for (section, spec) in self.kind.children() {
            let Some(supplied) = sections.get(*section) else {
                continue;
            };
            let store = self.child_store(spec);
            let Some(payload) = section_payloads(supplied).into_iter().next() else {
                continue;
            };

            let outcome = self
                .upsert_child(&store, spec, root_id, user_id, payload)
                .await;
            match outcome {
                Ok(row) => {
                    updated.insert(section.to_string(), row);
                }
                Err(err) => {
                    warn!(
                        subsystem = "api",
                        component = "aggregate",
                        op = "update",
                        section = *section,
                        error = %err,
                        "Child upsert failed; continuing with remaining sections"
                    );
                    failures.push(SectionFailure {
                        section: section.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(UpdateOutcome { updated, failures })
    }

    async fn upsert_child(
        &self,
        store: &RecordStore,
        spec: &'static TableSpec,
        root_id: Uuid,
        user_id: Uuid,
        mut payload: Map<String, JsonValue>,
    ) -> Result<JsonValue> {
        let existing = store.update_by_parent(root_id, &payload).await?;
        let (row, action) = match existing {
            Some(row) => (row, ActionType::Update),
            None => {
                inject_parent_fk(&mut payload, spec, root_id);
                (store.insert(&payload).await?, ActionType::Insert)
            }
        };
        self.db
            .activity
            .log_non_fatal(NewActivityEntry {
                user_id,
                table_name: spec.table.to_string(),
                record_id: row_uuid(&row),
                action_type: action,
                change_details: Some(JsonValue::Object(payload)),
            })
            .await;
        Ok(row)
    }

    /// Delete every child row table-by-table, then the root, and write one
    /// consolidated audit entry carrying the root snapshot and counts.
    pub async fn delete_cascade(&self, root_id: Uuid, user_id: Uuid) -> Result<DeleteOutcome> {
        let snapshot = match self.kind {
            AggregateKind::Trial => self
                .db
                .trials
                .snapshot(root_id)
                .await?
                .map(|s| serde_json::to_value(s))
                .transpose()?,
            AggregateKind::Drug => self
                .db
                .drugs
                .snapshot(root_id)
                .await?
                .map(|s| serde_json::to_value(s))
                .transpose()?,
        };
        let snapshot = snapshot.ok_or_else(|| self.not_found())?;

        let mut deleted = Map::new();
        let mut total: u64 = 0;
        for (section, spec) in self.kind.children() {
            let count = self.child_store(spec).delete_by_parent(root_id).await?;
            total += count;
            deleted.insert(section.to_string(), json!(count));
        }
        if self.root_store().delete(root_id).await? {
            total += 1;
            deleted.insert("overview".to_string(), json!(1));
        }

        self.db
            .activity
            .log_non_fatal(NewActivityEntry {
                user_id,
                table_name: self.kind.root_spec().table.to_string(),
                record_id: Some(root_id),
                action_type: ActionType::Delete,
                change_details: Some(json!({
                    "snapshot": snapshot,
                    "deleted": deleted,
                    "total": total,
                })),
            })
            .await;

        info!(
            subsystem = "api",
            component = "aggregate",
            op = "delete",
            kind = self.kind.label(),
            root_id = %root_id,
            total_deleted = total,
            "Aggregate deleted"
        );
        Ok(DeleteOutcome {
            snapshot,
            deleted,
            total,
        })
    }

    /// Cascade-delete every root. The production gate lives at the handler.
    pub async fn delete_all(&self, user_id: Uuid) -> Result<u64> {
        let roots = self.root_store().list_all().await?;
        let mut removed = 0;
        for root in &roots {
            if let Some(id) = row_uuid(root) {
                self.delete_cascade(id, user_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Root row plus every child collection in one response, or `None` when
    /// the root does not exist.
    pub async fn read_all_data(&self, root_id: Uuid) -> Result<Option<JsonValue>> {
        let Some(root) = self.root_store().find_by_id(root_id).await? else {
            return Ok(None);
        };
        let mut out = Map::new();
        out.insert("overview".to_string(), root);
        for (section, spec) in self.kind.children() {
            let rows = self.child_store(spec).find_by_parent(root_id).await?;
            out.insert(section.to_string(), JsonValue::Array(rows));
        }
        Ok(Some(JsonValue::Object(out)))
    }

    /// Every root with all of its children, assembled from one bulk query
    /// per table and grouped in memory.
    pub async fn list_all_with_data(&self) -> Result<Vec<JsonValue>> {
        let roots = self.root_store().list_all().await?;
        let mut grouped: Vec<(&'static str, HashMap<Uuid, Vec<JsonValue>>)> = Vec::new();

        for (section, spec) in self.kind.children() {
            let rows = self.child_store(spec).list_all().await?;
            let fk = spec.parent_fk.ok_or_else(|| {
                Error::Internal(format!("table `{}` has no parent relation", spec.table))
            })?;
            let mut by_parent: HashMap<Uuid, Vec<JsonValue>> = HashMap::new();
            for row in rows {
                let parent = row
                    .get(fk)
                    .and_then(JsonValue::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                if let Some(parent) = parent {
                    by_parent.entry(parent).or_default().push(row);
                }
            }
            grouped.push((section, by_parent));
        }

        let mut out = Vec::with_capacity(roots.len());
        for root in roots {
            let Some(id) = row_uuid(&root) else { continue };
            let mut entry = Map::new();
            entry.insert("overview".to_string(), root);
            for (section, by_parent) in &mut grouped {
                let rows = by_parent.remove(&id).unwrap_or_default();
                entry.insert(section.to_string(), JsonValue::Array(rows));
            }
            out.push(JsonValue::Object(entry));
        }
        Ok(out)
    }
}

/// Accept a section value as one object or an array of objects.
fn section_payloads(value: &JsonValue) -> Vec<Map<String, JsonValue>> {
    match value {
        JsonValue::Object(map) => vec![map.clone()],
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

fn inject_parent_fk(payload: &mut Map<String, JsonValue>, spec: &'static TableSpec, root_id: Uuid) {
    if let Some(fk) = spec.parent_fk {
        payload.insert(fk.to_string(), JsonValue::String(root_id.to_string()));
    }
}

/// Parse the `id` column out of a JSON row.
pub fn row_uuid(row: &JsonValue) -> Option<Uuid> {
    row.get("id")
        .and_then(JsonValue::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_payloads_accepts_object_or_array() {
        let single = json!({"notes": "one"});
        assert_eq!(section_payloads(&single).len(), 1);

        let many = json!([{"notes": "a"}, {"notes": "b"}, "skipped"]);
        let payloads = section_payloads(&many);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1]["notes"], json!("b"));

        assert!(section_payloads(&json!("scalar")).is_empty());
    }

    #[test]
    fn test_inject_parent_fk_overwrites_client_value() {
        let spec = &trialbase_db::tables::TRIAL_SITES;
        let id = Uuid::new_v4();
        let mut payload = json!({"trial_id": "spoofed", "notes": "x"})
            .as_object()
            .unwrap()
            .clone();
        inject_parent_fk(&mut payload, spec, id);
        assert_eq!(payload["trial_id"], json!(id.to_string()));
    }

    #[test]
    fn test_row_uuid_parses_only_valid_ids() {
        let id = Uuid::new_v4();
        assert_eq!(row_uuid(&json!({"id": id.to_string()})), Some(id));
        assert_eq!(row_uuid(&json!({"id": "nope"})), None);
        assert_eq!(row_uuid(&json!({})), None);
    }
}
