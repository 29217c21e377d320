//! Drug aggregate endpoints, mounted under `/drug`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use trialbase_db::tables::{DRUG_CHILDREN, DRUG_OVERVIEW};

use crate::error::{ApiError, ApiResult};
use crate::handlers::records::{self, body_object, require_user_id};
use crate::AppState;

pub fn router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/create-drug", post(create_with_all_data))
        .route("/drug/:drug_over_id/all-data", get(read_all_data))
        .route("/drug/:drug_over_id/update-all-data", put(update_all_data))
        .route("/:drug_over_id/:user_id/delete-all", delete(delete_all_data));

    router = router.merge(records::record_router("overview", &DRUG_OVERVIEW, None));
    for (section, spec) in DRUG_CHILDREN {
        router = router.merge(records::record_router(section, spec, Some("drug")));
    }
    router
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
        .drug_aggregates
        .create_with_all_data(user_id, overview, &body)
        .await?;

    let drug_id = outcome.root.get("id").cloned().unwrap_or(JsonValue::Null);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Drug created",
            "drug_over_id": drug_id,
            "created": outcome.created,
            "failures": outcome.failures,
            "activity_logging": outcome.activity_logging,
        })),
    ))
}

async fn read_all_data(
    State(state): State<AppState>,
    Path(drug_over_id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    state
        .drug_aggregates
        .read_all_data(drug_over_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Drug not found".to_string()))
}

async fn update_all_data(
    State(state): State<AppState>,
    Path(drug_over_id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let user_id = require_user_id(&body)?;
    let overview = body.get("overview").and_then(JsonValue::as_object).cloned();

    let outcome = state
        .drug_aggregates
        .update_all_data(drug_over_id, user_id, overview, &body)
        .await?;
    Ok(Json(json!({
        "message": "Drug updated",
        "updated": outcome.updated,
        "failures": outcome.failures,
    })))
}

async fn delete_all_data(
    State(state): State<AppState>,
    Path((drug_over_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<JsonValue>> {
    let outcome = state
        .drug_aggregates
        .delete_cascade(drug_over_id, user_id)
        .await?;
    Ok(Json(json!({
        "message": "Drug and all related data deleted",
        "snapshot": outcome.snapshot,
        "deleted": outcome.deleted,
        "total": outcome.total,
    })))
}
