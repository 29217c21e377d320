//! Approval queue endpoints, mounted under `/pending-changes`.
//!
//! The workflow records decisions only: approving or rejecting a change
//! never applies its `proposed_data` to the target table.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use trialbase_core::{
    ActionType, ActivityLogRepository, ChangeType, NewActivityEntry, PendingChangeFilter,
    PendingChangeRepository, SubmitChangeRequest,
};

use crate::error::{ApiError, ApiResult};
use crate::handlers::records::body_object;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submitChange", post(submit_change))
        .route("/listChanges", get(list_changes))
        .route("/getChange/:id", get(get_change))
        .route("/approveChange/:id", post(approve_change))
        .route("/rejectChange/:id", post(reject_change))
        .route("/deleteChange/:id/:user_id", delete(delete_change))
}

fn required_str<'a>(body: &'a serde_json::Map<String, JsonValue>, field: &str) -> ApiResult<&'a str> {
    body.get(field)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
}

fn required_uuid(body: &serde_json::Map<String, JsonValue>, field: &str) -> ApiResult<Uuid> {
    let raw = required_str(body, field)?;
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("{field} must be a valid UUID")))
}

async fn submit_change(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let body = body_object(body)?;
    let target_table = required_str(&body, "target_table")?.to_string();
    let change_type = match required_str(&body, "change_type")? {
        "INSERT" => ChangeType::Insert,
        "UPDATE" => ChangeType::Update,
        "DELETE" => ChangeType::Delete,
        other => {
            return Err(ApiError::BadRequest(format!(
                "change_type must be INSERT, UPDATE, or DELETE (got {other})"
            )))
        }
    };
    let submitted_by = required_uuid(&body, "submitted_by")?;
    let proposed_data = body
        .get("proposed_data")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("proposed_data is required".to_string()))?;
    let target_record_id = match body.get("target_record_id").and_then(JsonValue::as_str) {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            ApiError::BadRequest("target_record_id must be a valid UUID".to_string())
        })?),
        None => None,
    };

    let change = state
        .db
        .pending_changes
        .submit(SubmitChangeRequest {
            target_table,
            target_record_id,
            proposed_data,
            change_type,
            submitted_by,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!(change))))
}

async fn list_changes(
    State(state): State<AppState>,
    Query(filter): Query<PendingChangeFilter>,
) -> ApiResult<Json<JsonValue>> {
    let changes = state.db.pending_changes.find_all(filter).await?;
    Ok(Json(json!(changes)))
}

async fn get_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let change = state
        .db
        .pending_changes
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pending change not found".to_string()))?;
    Ok(Json(json!(change)))
}

async fn approve_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let approved_by = required_uuid(&body, "approved_by")?;

    let change = state
        .db
        .pending_changes
        .approve(id, approved_by)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pending change not found".to_string()))?;

    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: approved_by,
            table_name: change.target_table.clone(),
            record_id: change.target_record_id,
            action_type: ActionType::Approve,
            change_details: Some(json!({"pending_change_id": id})),
        })
        .await;
    Ok(Json(json!(change)))
}

async fn reject_change(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let approved_by = required_uuid(&body, "approved_by")?;
    let reason = body
        .get("reason")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let change = state
        .db
        .pending_changes
        .reject(id, approved_by, reason)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pending change not found".to_string()))?;

    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: approved_by,
            table_name: change.target_table.clone(),
            record_id: change.target_record_id,
            action_type: ActionType::Reject,
            change_details: Some(json!({
                "pending_change_id": id,
                "reason": reason,
            })),
        })
        .await;
    Ok(Json(json!(change)))
}

async fn delete_change(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<JsonValue>> {
    let change = state
        .db
        .pending_changes
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pending change not found".to_string()))?;
    state.db.pending_changes.delete(id).await?;

    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id,
            table_name: change.target_table.clone(),
            record_id: change.target_record_id,
            action_type: ActionType::Delete,
            change_details: Some(json!({"pending_change_id": id})),
        })
        .await;
    Ok(Json(json!({"message": "Pending change deleted"})))
}
