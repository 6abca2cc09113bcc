use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        OriginalUri, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    dto::{ActivationKey, PasswordChange, ResetPassword, Signup},
    services,
    validation::AcceptLanguage,
};
use crate::{
    auth::extractors::AuthUser,
    problem::{FieldError, Problem},
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/activate", get(activate))
}

pub fn password_routes() -> Router<AppState> {
    Router::new()
        .route("/users/reset-password/init", post(reset_password_init))
        .route("/users/reset-password/finish", post(reset_password_finish))
        .route("/users/change-password", post(change_password))
}

/// Turns an unreadable body or query into a 400 bound to the payload object.
pub(crate) fn binding_problem(path: &str, object_name: &str, detail: String) -> Problem {
    warn!(%path, %detail, "request binding failed");
    Problem::validation(path, [FieldError::object(object_name, detail)])
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AcceptLanguage(lang): AcceptLanguage,
    payload: Result<Json<Signup>, JsonRejection>,
) -> Result<StatusCode, Problem> {
    let path = uri.path();
    let Json(payload) =
        payload.map_err(|e| binding_problem(path, Signup::OBJECT_NAME, e.body_text()))?;
    services::signup(&state, payload, lang)
        .await
        .map_err(|e| e.into_problem(path))?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state, query))]
pub async fn activate(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AcceptLanguage(lang): AcceptLanguage,
    query: Result<Query<ActivationKey>, QueryRejection>,
) -> Result<StatusCode, Problem> {
    let path = uri.path();
    let Query(query) =
        query.map_err(|e| binding_problem(path, ActivationKey::OBJECT_NAME, e.body_text()))?;
    services::activate(&state, query, lang)
        .await
        .map_err(|e| e.into_problem(path))?;
    Ok(StatusCode::OK)
}

/// Body is the bare email (a JSON string is accepted too).
#[instrument(skip(state, body))]
pub async fn reset_password_init(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AcceptLanguage(lang): AcceptLanguage,
    body: String,
) -> Result<StatusCode, Problem> {
    services::reset_init(&state, &body, lang)
        .await
        .map_err(|e| e.into_problem(uri.path()))?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, payload))]
pub async fn reset_password_finish(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AcceptLanguage(lang): AcceptLanguage,
    payload: Result<Json<ResetPassword>, JsonRejection>,
) -> Result<StatusCode, Problem> {
    let path = uri.path();
    let Json(payload) =
        payload.map_err(|e| binding_problem(path, ResetPassword::OBJECT_NAME, e.body_text()))?;
    services::reset_finish(&state, payload, lang)
        .await
        .map_err(|e| e.into_problem(path))?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AuthUser(user_id): AuthUser,
    AcceptLanguage(lang): AcceptLanguage,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> Result<StatusCode, Problem> {
    let path = uri.path();
    let Json(payload) =
        payload.map_err(|e| binding_problem(path, PasswordChange::OBJECT_NAME, e.body_text()))?;
    services::change_password(&state, user_id, payload, lang)
        .await
        .map_err(|e| e.into_problem(path))?;
    Ok(StatusCode::OK)
}
