//! Identity endpoints: `/user`, `/role`, and `/user-role`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use trialbase_core::{
    ActionType, ActivityLogRepository, CreateUserRequest, NewActivityEntry, RoleRepository,
    UserPatch, UserRepository, UserRoleRepository,
};

use crate::error::{ApiError, ApiResult};
use crate::handlers::records::body_object;
use crate::AppState;

pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

pub fn role_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_role).get(list_roles))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
}

pub fn user_role_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assignments))
        .route("/assign/:acting_user_id", post(assign_role))
        .route("/remove/:acting_user_id", delete(remove_role))
        .route("/user/:user_id", get(roles_for_user))
        .route("/role/:role_id", get(users_with_role))
}

// =========================================================================
// USERS
// =========================================================================

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let body = body_object(body)?;
    let has = |field: &str| {
        body.get(field)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .is_some()
    };
    if !has("username") || !has("email") || !has("password") {
        return Err(ApiError::BadRequest(
            "username, email, and password are required".to_string(),
        ));
    }
    let req: CreateUserRequest = serde_json::from_value(JsonValue::Object(body))
        .map_err(|e| ApiError::BadRequest(format!("invalid user payload: {e}")))?;

    let user = state.db.users.create(req).await?;

    // Every new account starts with the seeded User role; its absence means
    // migrations have not run.
    let default_role = state
        .db
        .roles
        .find_by_name("User")
        .await?
        .ok_or_else(|| {
            ApiError::Internal(trialbase_db::Error::Internal(
                "default User role is missing".to_string(),
            ))
        })?;
    let assignment = state.db.user_roles.assign(user.id, default_role.id).await?;

    // Self-registration: the new account is the actor in its own audit trail.
    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: user.id,
            table_name: "users".to_string(),
            record_id: Some(user.id),
            action_type: ActionType::Insert,
            change_details: Some(json!({
                "username": user.username,
                "email": user.email,
            })),
        })
        .await;
    if let Some(granted) = &assignment {
        state
            .db
            .activity
            .log_non_fatal(NewActivityEntry {
                user_id: user.id,
                table_name: "user_roles".to_string(),
                record_id: Some(granted.id),
                action_type: ActionType::Insert,
                change_details: Some(json!({
                    "user_id": user.id,
                    "role_id": default_role.id,
                    "role_name": default_role.role_name,
                })),
            })
            .await;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": user,
            "default_role": default_role.role_name,
        })),
    ))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    Ok(Json(json!(state.db.users.find_all().await?)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let user = state
        .db
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(json!(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let patch: UserPatch = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid user patch: {e}")))?;
    let user = state
        .db
        .users
        .update(id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(json!(user)))
}

/// Hard delete: the user's audit entries and role assignments go first,
/// then the account row.
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    if state.db.users.find_by_id(id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    let activity_removed = state.db.activity.delete_by_user(id).await?;
    let assignments_removed = state.db.user_roles.delete_all_for_user(id).await?;
    state.db.users.delete(id).await?;
    Ok(Json(json!({
        "message": "User deleted",
        "activity_entries_removed": activity_removed,
        "role_assignments_removed": assignments_removed,
    })))
}

// =========================================================================
// ROLES
// =========================================================================

async fn create_role(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let body = body_object(body)?;
    let role_name = body
        .get("role_name")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("role_name is required".to_string()))?;

    let role = state.db.roles.create(role_name).await?;
    Ok((StatusCode::CREATED, Json(json!(role))))
}

async fn list_roles(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    Ok(Json(json!(state.db.roles.find_all().await?)))
}

async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    let role = state
        .db
        .roles
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;
    Ok(Json(json!(role)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let role_name = body
        .get("role_name")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("role_name is required".to_string()))?;

    let role = state
        .db
        .roles
        .update(id, role_name)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;
    Ok(Json(json!(role)))
}

async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    if !state.db.roles.delete(id).await? {
        return Err(ApiError::NotFound("Role not found".to_string()));
    }
    Ok(Json(json!({"message": "Role deleted"})))
}

// =========================================================================
// USER-ROLE ASSIGNMENTS
// =========================================================================

fn required_uuid(body: &serde_json::Map<String, JsonValue>, field: &str) -> ApiResult<Uuid> {
    body.get(field)
        .and_then(JsonValue::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| ApiError::BadRequest(format!("{field} must be a valid UUID")))
}

/// Assign a role, replacing any roles the user already holds: every
/// existing assignment is removed (each removal audited), then the new
/// assignment is inserted and audited.
async fn assign_role(
    State(state): State<AppState>,
    Path(acting_user_id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let body = body_object(body)?;
    let user_id = required_uuid(&body, "user_id")?;
    let role_id = required_uuid(&body, "role_id")?;

    if state.db.roles.find_by_id(role_id).await?.is_none() {
        return Err(ApiError::NotFound("Role not found".to_string()));
    }

    let existing = state.db.user_roles.roles_for_user(user_id).await?;
    state.db.user_roles.delete_all_for_user(user_id).await?;
    for removed in &existing {
        state
            .db
            .activity
            .log_non_fatal(NewActivityEntry {
                user_id: acting_user_id,
                table_name: "user_roles".to_string(),
                record_id: Some(removed.id),
                action_type: ActionType::Delete,
                change_details: Some(json!({
                    "user_id": user_id,
                    "role_id": removed.role_id,
                    "role_name": removed.role_name,
                })),
            })
            .await;
    }

    let assignment = state
        .db
        .user_roles
        .assign(user_id, role_id)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict("User already holds this role".to_string())
        })?;
    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: acting_user_id,
            table_name: "user_roles".to_string(),
            record_id: Some(assignment.id),
            action_type: ActionType::Insert,
            change_details: Some(json!({
                "user_id": user_id,
                "role_id": role_id,
            })),
        })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "assignment": assignment,
            "replaced": existing.len(),
        })),
    ))
}

async fn remove_role(
    State(state): State<AppState>,
    Path(acting_user_id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> ApiResult<Json<JsonValue>> {
    let body = body_object(body)?;
    let user_id = required_uuid(&body, "user_id")?;
    let role_id = required_uuid(&body, "role_id")?;

    if !state.db.user_roles.remove(user_id, role_id).await? {
        return Err(ApiError::NotFound("Role assignment not found".to_string()));
    }
    state
        .db
        .activity
        .log_non_fatal(NewActivityEntry {
            user_id: acting_user_id,
            table_name: "user_roles".to_string(),
            record_id: None,
            action_type: ActionType::Delete,
            change_details: Some(json!({
                "user_id": user_id,
                "role_id": role_id,
            })),
        })
        .await;
    Ok(Json(json!({"message": "Role assignment removed"})))
}

async fn roles_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    Ok(Json(json!(
        state.db.user_roles.roles_for_user(user_id).await?
    )))
}

async fn users_with_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<JsonValue>> {
    Ok(Json(json!(
        state.db.user_roles.users_with_role(role_id).await?
    )))
}

async fn list_assignments(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    Ok(Json(json!(state.db.user_roles.list_all().await?)))
}
