//! Core data models for trialbase.
//!
//! These types are shared across the trialbase crates and represent the
//! identity, audit, and approval-queue entities. Trial and drug aggregate
//! rows are handled as JSON records by the record store (their tables are
//! wide and almost entirely optional); the snapshot types here carry the
//! identifying fields that the audit log and cascade summaries need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// AUDIT LOG
// =============================================================================

/// Kind of mutation recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Insert,
    Update,
    Delete,
    Approve,
    Reject,
}

impl ActionType {
    /// Database representation (matches the `user_activity.action_type` check).
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Insert => "INSERT",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Approve => "APPROVE",
            ActionType::Reject => "REJECT",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub table_name: String,
    pub record_id: Option<Uuid>,
    pub action_type: String,
    pub change_details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for appending an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivityEntry {
    pub user_id: Uuid,
    pub table_name: String,
    #[serde(default)]
    pub record_id: Option<Uuid>,
    pub action_type: ActionType,
    #[serde(default)]
    pub change_details: Option<JsonValue>,
}

// =============================================================================
// PENDING CHANGES
// =============================================================================

/// Kind of proposed mutation in the approval queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "INSERT",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

/// A proposed mutation awaiting an approve/reject decision.
///
/// Lifecycle: created pending; transitions exactly once to approved or
/// rejected; deletable afterward. The decision is recorded only — the
/// proposed payload is never applied to the target table by this workflow.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingChange {
    pub id: Uuid,
    pub target_table: String,
    pub target_record_id: Option<Uuid>,
    pub proposed_data: JsonValue,
    pub change_type: String,
    pub submitted_by: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub is_approved: bool,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
}

/// Submission payload for the approval queue.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitChangeRequest {
    pub target_table: String,
    #[serde(default)]
    pub target_record_id: Option<Uuid>,
    pub proposed_data: JsonValue,
    pub change_type: ChangeType,
    pub submitted_by: Uuid,
}

/// Filters for listing pending changes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PendingChangeFilter {
    pub is_approved: Option<bool>,
    pub rejected: Option<bool>,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// A registered user. The password column is stored opaquely; hashing and
/// token issuance live outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub plan: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub plan: Option<String>,
}

/// Mutable user fields for patch updates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub company: Option<String>,
    pub designation: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub plan: Option<String>,
}

/// A role.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub role_name: String,
    pub created_at: DateTime<Utc>,
}

/// One user-role assignment row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

/// Assignment row joined with the role name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleWithName {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
}

/// Assignment row joined with both user and role details (admin listing).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRoleDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub username: String,
    pub email: String,
    pub role_name: String,
}

// =============================================================================
// AGGREGATE SNAPSHOTS
// =============================================================================

/// Identifying fields of a trial root, captured before a cascading delete so
/// the consolidated audit entry can describe what was removed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrialSnapshot {
    pub id: Uuid,
    pub trial_id: Option<String>,
    pub trial_identifier: Option<Vec<String>>,
    pub title: Option<String>,
    pub therapeutic_area: Option<String>,
}

/// Identifying fields of a drug root.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DrugSnapshot {
    pub id: Uuid,
    pub drug_name: Option<String>,
    pub primary_name: Option<String>,
    pub therapeutic_area: Option<String>,
}
