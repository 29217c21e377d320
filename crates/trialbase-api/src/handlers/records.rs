//! Generic per-entity CRUD over record-store tables.
//!
//! Every aggregate table gets the same route family, built by
//! [`record_router`] from its static spec. Writes require an acting
//! `user_id` and append an audit entry through the non-fatal logger; a
//! broken audit table degrades to a WARN, never a failed request.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use trialbase_core::{ActionType, ActivityLogRepository, Error, NewActivityEntry};
use trialbase_db::{RecordStore, TableSpec};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Require a JSON object body.
pub fn body_object(body: JsonValue) -> Result<Map<String, JsonValue>, ApiError> {
    match body {
        JsonValue::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
    }
}

/// Extract the required acting-user id from a request body.
pub fn require_user_id(body: &Map<String, JsonValue>) -> Result<Uuid, ApiError> {
    let value = body
        .get("user_id")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::from(Error::user_id_required()))?;
    Uuid::parse_str(value)
        .map_err(|_| ApiError::BadRequest("user_id must be a valid UUID".to_string()))
}

fn record_label(spec: &'static TableSpec) -> String {
    format!("{} record", spec.table)
}

pub(crate) async fn log_write(
    state: &AppState,
    spec: &'static TableSpec,
    user_id: Uuid,
    record_id: Option<Uuid>,
    action: ActionType,
    details: JsonValue,
) {
    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id,
            table_name: spec.table.to_string(),
            record_id,
            action_type: action,
            change_details: Some(details),
        })
        .await;
}

async fn create_record(
    state: AppState,
    spec: &'static TableSpec,
    body: JsonValue,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let mut payload = body_object(body)?;
    let user_id = require_user_id(&payload)?;
    payload.remove("user_id");

    let store = RecordStore::new(state.db.pool.clone(), spec);
    let row = store.insert(&payload).await?;
    let record_id = crate::services::aggregate::row_uuid(&row);
    log_write(
        &state,
        spec,
        user_id,
        record_id,
        ActionType::Insert,
        JsonValue::Object(payload),
    )
    .await;
    Ok((StatusCode::CREATED, Json(row)))
}

pub(crate) async fn list_records(state: AppState, spec: &'static TableSpec) -> ApiResult<Json<JsonValue>> {
    let store = RecordStore::new(state.db.pool.clone(), spec);
    Ok(Json(JsonValue::Array(store.list_all().await?)))
}

pub(crate) async fn get_record(
    state: AppState,
    spec: &'static TableSpec,
    id: Uuid,
) -> ApiResult<Json<JsonValue>> {
    let store = RecordStore::new(state.db.pool.clone(), spec);
    let row = store
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", record_label(spec))))?;
    Ok(Json(row))
}

pub(crate) async fn patch_record(
    state: AppState,
    spec: &'static TableSpec,
    id: Uuid,
    body: JsonValue,
) -> ApiResult<Json<JsonValue>> {
    let mut payload = body_object(body)?;
    let user_id = require_user_id(&payload)?;
    payload.remove("user_id");

    let store = RecordStore::new(state.db.pool.clone(), spec);
    let row = store
        .update(id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", record_label(spec))))?;
    log_write(
        &state,
        spec,
        user_id,
        Some(id),
        ActionType::Update,
        JsonValue::Object(payload),
    )
    .await;
    Ok(Json(row))
}

pub(crate) async fn delete_record(
    state: AppState,
    spec: &'static TableSpec,
    id: Uuid,
    user_id: Uuid,
) -> ApiResult<Json<JsonValue>> {
    let store = RecordStore::new(state.db.pool.clone(), spec);
    if !store.delete(id).await? {
        return Err(ApiError::NotFound(format!(
            "{} not found",
            record_label(spec)
        )));
    }
    log_write(
        &state,
        spec,
        user_id,
        Some(id),
        ActionType::Delete,
        json!({"id": id}),
    )
    .await;
    Ok(Json(json!({"message": format!("{} deleted", record_label(spec))})))
}

async fn list_by_parent(
    state: AppState,
    spec: &'static TableSpec,
    parent_id: Uuid,
) -> ApiResult<Json<JsonValue>> {
    let store = RecordStore::new(state.db.pool.clone(), spec);
    Ok(Json(JsonValue::Array(store.find_by_parent(parent_id).await?)))
}

async fn put_by_parent(
    state: AppState,
    spec: &'static TableSpec,
    parent_id: Uuid,
    body: JsonValue,
) -> ApiResult<Json<JsonValue>> {
    let mut payload = body_object(body)?;
    let user_id = require_user_id(&payload)?;
    payload.remove("user_id");

    let store = RecordStore::new(state.db.pool.clone(), spec);
    let row = store
        .update_by_parent(parent_id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", record_label(spec))))?;
    log_write(
        &state,
        spec,
        user_id,
        crate::services::aggregate::row_uuid(&row),
        ActionType::Update,
        JsonValue::Object(payload),
    )
    .await;
    Ok(Json(row))
}

async fn delete_by_parent(
    state: AppState,
    spec: &'static TableSpec,
    parent_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Json<JsonValue>> {
    let store = RecordStore::new(state.db.pool.clone(), spec);
    let count = store.delete_by_parent(parent_id).await?;
    log_write(
        &state,
        spec,
        user_id,
        Some(parent_id),
        ActionType::Delete,
        json!({"deleted": count}),
    )
    .await;
    Ok(Json(json!({"deleted": count})))
}

/// Build the CRUD route family for one table spec.
///
/// `section` is the URL segment (`/overview`, `/timing`, ...); `parent_word`
/// adds the by-parent variants (`/{section}/{parent_word}/:parent_id`) for
/// child tables.
pub fn record_router(
    section: &'static str,
    spec: &'static TableSpec,
    parent_word: Option<&'static str>,
) -> Router<AppState> {
    let base = format!("/{section}");
    let by_id = format!("/{section}/:id");
    let delete_path = format!("/{section}/:id/:user_id");

    let mut router = Router::new()
        .route(
            &base,
            post(move |State(state): State<AppState>, Json(body): Json<JsonValue>| {
                create_record(state, spec, body)
            })
            .get(move |State(state): State<AppState>| list_records(state, spec)),
        )
        .route(
            &by_id,
            get(move |State(state): State<AppState>, Path(id): Path<Uuid>| {
                get_record(state, spec, id)
            })
            .patch(
                move |State(state): State<AppState>,
                      Path(id): Path<Uuid>,
                      Json(body): Json<JsonValue>| {
                    patch_record(state, spec, id, body)
                },
            ),
        )
        .route(
            &delete_path,
            delete(
                move |State(state): State<AppState>, Path((id, user_id)): Path<(Uuid, Uuid)>| {
                    delete_record(state, spec, id, user_id)
                },
            ),
        );

    if let Some(word) = parent_word {
        let by_parent = format!("/{section}/{word}/:parent_id");
        let delete_parent = format!("/{section}/{word}/:parent_id/:user_id");
        router = router
            .route(
                &by_parent,
                get(
                    move |State(state): State<AppState>, Path(parent_id): Path<Uuid>| {
                        list_by_parent(state, spec, parent_id)
                    },
                )
                .put(
                    move |State(state): State<AppState>,
                          Path(parent_id): Path<Uuid>,
                          Json(body): Json<JsonValue>| {
                        put_by_parent(state, spec, parent_id, body)
                    },
                ),
            )
            .route(
                &delete_parent,
                delete(
                    move |State(state): State<AppState>,
                          Path((parent_id, user_id)): Path<(Uuid, Uuid)>| {
                        delete_by_parent(state, spec, parent_id, user_id)
                    },
                ),
            );
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_user_id_missing_matches_contract() {
        let body = json!({"notes": "no actor"}).as_object().unwrap().clone();
        match require_user_id(&body) {
            Err(ApiError::BadRequest(msg)) => {
                let lower = msg.to_lowercase();
                assert!(lower.contains("user_id") && lower.contains("required"));
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_require_user_id_rejects_malformed_uuid() {
        let body = json!({"user_id": "not-a-uuid"}).as_object().unwrap().clone();
        assert!(matches!(
            require_user_id(&body),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_require_user_id_accepts_valid_uuid() {
        let id = Uuid::new_v4();
        let body = json!({"user_id": id.to_string()})
            .as_object()
            .unwrap()
            .clone();
        assert_eq!(require_user_id(&body).unwrap(), id);
    }

    #[test]
    fn test_body_object_rejects_non_objects() {
        assert!(body_object(json!([1, 2, 3])).is_err());
        assert!(body_object(json!("string")).is_err());
        assert!(body_object(json!({"k": "v"})).is_ok());
    }
}
