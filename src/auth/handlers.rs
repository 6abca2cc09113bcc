use axum::{
    extract::{rejection::JsonRejection, FromRef, OriginalUri, State},
    http::{header, HeaderMap, HeaderValue},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{extractors::AuthUser, jwt::JwtKeys, services};
use crate::{
    problem::Problem,
    state::AppState,
    users::{
        dto::{AccountResponse, Login, TokenResponse},
        handlers::binding_problem,
        validation::AcceptLanguage,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/users/authenticate", post(authenticate))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/account", get(get_account))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AcceptLanguage(lang): AcceptLanguage,
    payload: Result<Json<Login>, JsonRejection>,
) -> Result<(HeaderMap, Json<TokenResponse>), Problem> {
    let path = uri.path();
    let Json(payload) =
        payload.map_err(|e| binding_problem(path, Login::OBJECT_NAME, e.body_text()))?;

    let keys = JwtKeys::from_ref(&state);
    let id_token = services::authenticate(&state, &keys, payload, lang)
        .await
        .map_err(|e| e.into_problem(path))?;

    let mut headers = HeaderMap::new();
    let bearer = HeaderValue::from_str(&format!("Bearer {id_token}"))
        .map_err(|e| services::AuthError::Internal(e.into()).into_problem(path))?;
    headers.insert(header::AUTHORIZATION, bearer);
    Ok((headers, Json(TokenResponse { id_token })))
}

#[instrument(skip(state))]
pub async fn get_account(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AuthUser(user_id): AuthUser,
) -> Result<Json<AccountResponse>, Problem> {
    let account = services::account(&state, user_id)
        .await
        .map_err(|e| e.into_problem(uri.path()))?;
    Ok(Json(account))
}
