//! Trial aggregate endpoints.
//!
//! Mounted under `/therapeutic`: the aggregate workflows (create, read,
//! update, cascade delete) plus the per-table CRUD family for the overview
//! and every child table.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use trialbase_db::tables::{TRIAL_CHILDREN, TRIAL_OVERVIEW};

use crate::error::{ApiError, ApiResult};
use crate::handlers::records::{self, body_object, require_user_id};
use crate::AppState;

pub fn router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/create-therapeutic", post(create_with_all_data))
        .route("/trials", get(list_all_with_data))
        .route("/trial/:trial_id/all-data", get(read_all_data))
        .route("/trial/:trial_id/update-all-data", put(update_all_data))
        .route("/trial/:trial_id/:user_id/delete-all", delete(delete_all_data))
        .route("/all-trials/dev", delete(delete_every_trial));

    router = router.merge(overview_router());
    for (section, spec) in TRIAL_CHILDREN {
        router = router.merge(records::record_router(section, spec, Some("trial")));
    }
    router
}

/// The overview CRUD family. Creation goes through the trial repository so
/// every row gets its `TB-######` code; the rest is the generic record
/// family.
fn overview_router() -> Router<AppState> {
    Router::new()
        .route(
            "/overview",
            post(create_overview).get(|State(state): State<AppState>| {
                records::list_records(state, &TRIAL_OVERVIEW)
            }),
        )
        .route(
            "/overview/:id",
            get(|State(state): State<AppState>, Path(id): Path<Uuid>| {
                records::get_record(state, &TRIAL_OVERVIEW, id)
            })
            .patch(
                |State(state): State<AppState>,
                 Path(id): Path<Uuid>,
                 Json(body): Json<JsonValue>| {
                    records::patch_record(state, &TRIAL_OVERVIEW, id, body)
                },
            ),
        )
        .route(
            "/overview/:id/:user_id",
            delete(
                |State(state): State<AppState>, Path((id, user_id)): Path<(Uuid, Uuid)>| {
                    records::delete_record(state, &TRIAL_OVERVIEW, id, user_id)
                },
            ),
        )
}

async fn create_overview(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let mut payload = body_object(body)?;
    let user_id = require_user_id(&payload)?;
    payload.remove("user_id");

    let row = state.db.trials.create(&payload).await?;
    records::log_write(
        &state,
        &TRIAL_OVERVIEW,
        user_id,
        crate::services::aggregate::row_uuid(&row),
        trialbase_db::ActionType::Insert,
        JsonValue::Object(payload),
    )
    .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Trial overview created",
            "overview": row,
        })),
    ))
}

async fn create_with_all_data(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let body = body_object(body)?;
    let user_id = require_user_id(&body)?;
    let overview = body
        .get("overview")
        .and_then(JsonValue::as_object)
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("overview payload is required".to_string()))?;

    let outcome = state
        .trial_aggregates
        .create_with_all_data(user_id, overview, &body)
        .await?;

    let trial_code = outcome.root.get("trial_id").cloned().unwrap_or(JsonValue::Null);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Trial created",
            "trial_id": trial_code,
            "created": outcome.created,
            "failures": outcome.failures,
            "activity_logging": outcome.activity_logging,
        })),
    ))
}

async fn read_all_data(
    State(state): State<AppState>,
    Path(trial_id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    state
        .trial_aggregates
        .read_all_data(trial_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Trial not found".to_string()))
}

async fn list_all_with_data(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let trials = state.trial_aggregates.list_all_with_data().await?;
    Ok(Json(JsonValue::Array(trials)))
}

async fn update_all_data(
    State(state): State<AppState>,
    Path(trial_id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let user_id = require_user_id(&body)?;
    let overview = body.get("overview").and_then(JsonValue::as_object).cloned();

    let outcome = state
        .trial_aggregates
        .update_all_data(trial_id, user_id, overview, &body)
        .await?;
    Ok(Json(json!({
        "message": "Trial updated",
        "updated": outcome.updated,
        "failures": outcome.failures,
    })))
}

async fn delete_all_data(
    State(state): State<AppState>,
    Path((trial_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<JsonValue>> {
    let outcome = state.trial_aggregates.delete_cascade(trial_id, user_id).await?;
    Ok(Json(json!({
        "message": "Trial and all related data deleted",
        "snapshot": outcome.snapshot,
        "deleted": outcome.deleted,
        "total": outcome.total,
    })))
}

/// Wipe every trial aggregate. Development convenience, refused outright
/// when `APP_ENV` is `production`.
async fn delete_every_trial(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    if state.app_env == "production" {
        return Err(ApiError::Forbidden(
            "Bulk trial deletion is not available in production".to_string(),
        ));
    }
    let body = body_object(body)?;
    let user_id = require_user_id(&body)?;

    let removed = state.trial_aggregates.delete_all(user_id).await?;
    Ok(Json(json!({
        "message": "All trials deleted",
        "trials_removed": removed,
    })))
}
