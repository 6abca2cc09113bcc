use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{jwt::JwtKeys, password::verify_password};
use crate::{
    problem::{FieldError, Problem},
    state::AppState,
    users::{
        dto::{AccountResponse, Login},
        repo::StoreError,
        validation::{field_errors, Lang},
    },
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("bad credentials")]
    BadCredentials,
    #[error("user not activated")]
    NotActivated,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn into_problem(self, path: &str) -> Problem {
        match self {
            AuthError::Validation(errors) => Problem::validation(path, errors),
            AuthError::BadCredentials => Problem::unauthorized(path, "Bad credentials"),
            AuthError::NotActivated => Problem::unauthorized(path, "User was not activated"),
            AuthError::UserNotFound => Problem::unauthorized(path, "User not found"),
            AuthError::Store(e) => {
                error!(error = %e, "store error");
                Problem::service_unavailable(path)
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                Problem::internal(path)
            }
        }
    }
}

/// Checks credentials and issues a JWT for an activated account.
pub async fn authenticate(
    state: &AppState,
    keys: &JwtKeys,
    payload: Login,
    lang: Lang,
) -> Result<String, AuthError> {
    let errors = field_errors(&payload, Login::OBJECT_NAME, lang);
    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }
    let username = payload.username.trim().to_lowercase();

    // A login may equal another user's email: the email owner is tried
    // first, then the login owner, and the password decides.
    let mut candidates = Vec::with_capacity(2);
    candidates.extend(state.users.find_account_by_email(&username).await?);
    if let Some(by_login) = state.users.find_account_by_login(&username).await? {
        if candidates.iter().all(|c| c.user.id != by_login.user.id) {
            candidates.push(by_login);
        }
    }
    if candidates.is_empty() {
        warn!(%username, "login unknown user");
        return Err(AuthError::BadCredentials);
    }

    let mut matched = None;
    for candidate in candidates {
        if verify_password(&payload.password, &candidate.user.password)? {
            matched = Some(candidate);
            break;
        }
    }
    let Some(account) = matched else {
        warn!(%username, "login invalid password");
        return Err(AuthError::BadCredentials);
    };
    if !account.activated {
        warn!(user_id = %account.user.id, "login before activation");
        return Err(AuthError::NotActivated);
    }

    let token = keys.sign(
        account.user.id,
        &account.user.login,
        &account.roles,
        payload.remember_me.unwrap_or(false),
    )?;
    info!(user_id = %account.user.id, "user authenticated");
    Ok(token)
}

pub async fn account(state: &AppState, user_id: Uuid) -> Result<AccountResponse, AuthError> {
    let account = state
        .users
        .find_account_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok(AccountResponse {
        id: account.user.id,
        login: account.user.login,
        email: account.user.email,
        lang_key: account.user.lang_key,
        roles: account.roles,
    })
}
