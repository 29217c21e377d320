//! Audit log endpoints, mounted under `/user-activity`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use trialbase_core::{ActivityLogRepository, NewActivityEntry};

use crate::error::{ApiError, ApiResult};
use crate::handlers::records::{body_object, require_user_id};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logActivity", post(log_activity))
        .route("/listUserActivity/:user_id", get(list_user_activity))
        .route("/listAllActivity", get(list_all_activity))
}

async fn log_activity(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let fields = body_object(body)?;
    require_user_id(&fields)?;
    let has_table = fields
        .get("table_name")
        .and_then(JsonValue::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_table {
        return Err(ApiError::BadRequest("table_name is required".to_string()));
    }
    if fields.get("action_type").map_or(true, JsonValue::is_null) {
        return Err(ApiError::BadRequest("action_type is required".to_string()));
    }
    let entry: NewActivityEntry = serde_json::from_value(JsonValue::Object(fields))
        .map_err(|e| ApiError::BadRequest(format!("invalid activity entry: {e}")))?;
    let logged = state.db.activity.log(entry).await?;
    Ok((StatusCode::CREATED, Json(json!(logged))))
}

async fn list_user_activity(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let entries = state.db.activity.list_for_user(user_id).await?;
    Ok(Json(json!(entries)))
}

#[derive(Debug, Default, Deserialize)]
struct ActivityFilter {
    table_name: Option<String>,
    action_type: Option<String>,
}

async fn list_all_activity(
    State(state): State<AppState>,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Json<JsonValue>> {
    let entries = state
        .db
        .activity
        .list_all(filter.table_name.as_deref(), filter.action_type.as_deref())
        .await?;
    Ok(Json(json!(entries)))
}
