//! HTTP error mapping.
//!
//! Handlers return [`ApiError`]; the `IntoResponse` impl renders the wire
//! shape clients depend on: `{"message": ...}` for client errors and
//! `{"message": ..., "error": ...}` for server errors.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use trialbase_core::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Internal(Error),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(msg) => ApiError::NotFound(format!("{msg} not found")),
            Error::Validation(msg) => ApiError::BadRequest(msg.clone()),
            Error::Protected(msg) => ApiError::Forbidden(msg.clone()),
            Error::Database(sqlx_err) => {
                let msg = sqlx_err.to_string();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    let friendly = if msg.contains("idx_trial_overview_trial_id") {
                        "A trial with this trial_id already exists".to_string()
                    } else if msg.contains("users_username_key") {
                        "A user with this username already exists".to_string()
                    } else if msg.contains("roles_role_name_key") {
                        "A role with this name already exists".to_string()
                    } else {
                        msg
                    };
                    return ApiError::Conflict(friendly);
                }
                if msg.contains("foreign key") {
                    return ApiError::BadRequest(msg);
                }
                ApiError::Internal(err)
            }
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "message": "Internal server error",
                    "error": err.to_string(),
                })),
            )
                .into_response(),
            ApiError::Forbidden(msg) => client_error(StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => client_error(StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => client_error(StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => client_error(StatusCode::CONFLICT, msg),
        }
    }
}

fn client_error(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let api: ApiError = Error::user_id_required().into();
        match api {
            ApiError::BadRequest(msg) => {
                let lower = msg.to_lowercase();
                assert!(lower.contains("user_id") && lower.contains("required"));
            }
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_protected_maps_to_forbidden() {
        let api: ApiError = Error::Protected("Cannot delete protected system role: Admin".into()).into();
        assert!(matches!(api, ApiError::Forbidden(_)));
    }

    #[test]
    fn test_not_found_message_shape() {
        let api: ApiError = Error::NotFound("Trial".into()).into();
        match api {
            ApiError::NotFound(msg) => assert_eq!(msg, "Trial not found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
