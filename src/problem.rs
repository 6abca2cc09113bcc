//! Structured `application/problem+json` error bodies.
//!
//! Every failure that reaches the HTTP layer is turned into a [`Problem`]:
//! a stable `type` URI, a title, the request path, a message key and the
//! list of field errors that caused it.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

pub const DEFAULT_TYPE: &str = "https://cccp-education.github.io/problem/problem-with-message";
pub const CONSTRAINT_VIOLATION_TYPE: &str =
    "https://cccp-education.github.io/problem/constraint-violation";
pub const INTERNAL_SERVER_ERROR_TYPE: &str =
    "https://cccp-education.github.io/problem/internal-server-error";
pub const INVALID_PASSWORD_TYPE: &str = "https://cccp-education.github.io/problem/invalid-password";
pub const EMAIL_ALREADY_USED_TYPE: &str =
    "https://cccp-education.github.io/problem/email-already-used";
pub const LOGIN_ALREADY_USED_TYPE: &str =
    "https://cccp-education.github.io/problem/login-already-used";

pub const ERR_VALIDATION: &str = "error.validation";
pub const ERR_SERVER: &str = "error.server";
pub const ERR_CONCURRENCY_FAILURE: &str = "error.concurrencyFailure";
pub const ERR_UNAUTHORIZED: &str = "error.unauthorized";

/// One failing field (or object, when `field` is absent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub object_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(object_name: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            object_name: object_name.to_string(),
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn object(object_name: &str, message: impl Into<String>) -> Self {
        Self {
            object_name: object_name.to_string(),
            field: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub path: String,
    pub message: String,
    #[serde(default)]
    pub field_errors: Vec<FieldError>,
}

impl Problem {
    fn build(kind: &str, status: StatusCode, title: &str, path: &str, message: &str) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.to_string(),
            status: status.as_u16(),
            path: path.to_string(),
            message: message.to_string(),
            field_errors: Vec::new(),
        }
    }

    pub fn with_field_errors(mut self, field_errors: impl IntoIterator<Item = FieldError>) -> Self {
        self.field_errors = field_errors.into_iter().collect();
        self
    }

    /// 400 listing every failing field.
    pub fn validation(path: &str, field_errors: impl IntoIterator<Item = FieldError>) -> Self {
        Self::build(
            CONSTRAINT_VIOLATION_TYPE,
            StatusCode::BAD_REQUEST,
            "Data binding and validation failure",
            path,
            ERR_VALIDATION,
        )
        .with_field_errors(field_errors)
    }

    /// 503 for data-access failures.
    pub fn service_unavailable(path: &str) -> Self {
        Self::build(
            INTERNAL_SERVER_ERROR_TYPE,
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable Error",
            path,
            ERR_SERVER,
        )
    }

    pub fn internal(path: &str) -> Self {
        Self::build(
            INTERNAL_SERVER_ERROR_TYPE,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            path,
            ERR_SERVER,
        )
    }

    /// A failure bound to an object rather than a field (activation, reset).
    pub fn exception(path: &str, status: StatusCode, object_name: &str, message: &str) -> Self {
        Self::build(
            CONSTRAINT_VIOLATION_TYPE,
            status,
            status.canonical_reason().unwrap_or("Error"),
            path,
            ERR_VALIDATION,
        )
        .with_field_errors([FieldError::object(object_name, message)])
    }

    /// 400 for a login or email already registered; `kind` selects the type URI.
    pub fn conflict(path: &str, kind: &str, field_errors: impl IntoIterator<Item = FieldError>) -> Self {
        Self::build(
            kind,
            StatusCode::BAD_REQUEST,
            "Data binding and validation failure",
            path,
            ERR_VALIDATION,
        )
        .with_field_errors(field_errors)
    }

    pub fn invalid_password(path: &str, object_name: &str) -> Self {
        Self::build(
            INVALID_PASSWORD_TYPE,
            StatusCode::BAD_REQUEST,
            "Incorrect password",
            path,
            ERR_VALIDATION,
        )
        .with_field_errors([FieldError::new(
            object_name,
            "currentPassword",
            "Current password does not match",
        )])
    }

    pub fn concurrency_failure(path: &str) -> Self {
        Self::build(
            DEFAULT_TYPE,
            StatusCode::CONFLICT,
            "Concurrency failure",
            path,
            ERR_CONCURRENCY_FAILURE,
        )
    }

    pub fn unauthorized(path: &str, detail: &str) -> Self {
        Self::build(
            DEFAULT_TYPE,
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            path,
            ERR_UNAUTHORIZED,
        )
        .with_field_errors([FieldError::object("login", detail)])
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)],
            Json(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_problem_serializes_camel_case_fields() {
        let problem = Problem::validation(
            "/api/users/signup",
            [FieldError::new("signup", "login", "must not be blank")],
        );
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["type"], CONSTRAINT_VIOLATION_TYPE);
        assert_eq!(json["status"], 400);
        assert_eq!(json["path"], "/api/users/signup");
        assert_eq!(json["message"], ERR_VALIDATION);
        assert_eq!(json["fieldErrors"][0]["objectName"], "signup");
        assert_eq!(json["fieldErrors"][0]["field"], "login");
    }

    #[test]
    fn object_field_error_omits_field_key() {
        let problem = Problem::exception(
            "/api/users/activate",
            StatusCode::PRECONDITION_FAILED,
            "userActivation",
            "no user was found for this activation key",
        );
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 412);
        assert_eq!(json["title"], "Precondition Failed");
        assert!(json["fieldErrors"][0].get("field").is_none());
    }

    #[test]
    fn into_response_uses_problem_content_type_and_status() {
        let res = Problem::service_unavailable("/api/users/signup").into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            PROBLEM_CONTENT_TYPE
        );
    }
}
