use axum::http::StatusCode;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{ActivationKey, PasswordChange, ResetInit, ResetPassword, Signup},
    repo::{reset_not_before, StoreError},
    repo_types::{Availability, NewUser, User},
    validation::{field_errors, Lang},
};
use crate::{
    auth::password::{generate_key, hash_password, verify_password},
    mail::{activation_mail, deliver, reset_mail},
    problem::{
        FieldError, Problem, CONSTRAINT_VIOLATION_TYPE, EMAIL_ALREADY_USED_TYPE,
        LOGIN_ALREADY_USED_TYPE,
    },
    state::AppState,
};

pub const MSG_LOGIN_TAKEN: &str = "Login name already used!";
pub const MSG_EMAIL_TAKEN: &str = "Email is already in use!";
pub const MSG_LOGIN_AND_EMAIL_TAKEN: &str = "Login name already used and email is already in use!!";
pub const MSG_WRONG_ACTIVATION_KEY: &str = "No user was found for this activation key";
pub const MSG_ALREADY_ACTIVATED: &str = "This activation key has already been used";
pub const MSG_ACTIVATION_FAILED: &str = "Activation could not be completed";
pub const MSG_WRONG_RESET_KEY: &str = "No active password reset was found for this key";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("login and email already in use")]
    LoginAndEmailTaken,
    #[error("login already in use")]
    LoginTaken,
    #[error("email already in use")]
    EmailTaken,
    #[error("activation key not found")]
    ActivationKeyNotFound,
    #[error("activation key already used")]
    AlreadyActivated,
    #[error("activation updated {0} rows")]
    UnexpectedRowCount(u64),
    #[error("activation failed: {0}")]
    ActivationFailed(#[source] StoreError),
    #[error("reset key missing, used or expired")]
    ResetKeyInvalid,
    #[error("current password does not match")]
    InvalidPassword,
    #[error("user was modified concurrently")]
    ConcurrencyFailure,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Database(sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LoginTaken => UserError::LoginTaken,
            StoreError::EmailTaken => UserError::EmailTaken,
            StoreError::Database(e) => UserError::Database(e),
        }
    }
}

impl UserError {
    pub fn into_problem(self, path: &str) -> Problem {
        match self {
            UserError::Validation(errors) => Problem::validation(path, errors),
            UserError::LoginAndEmailTaken => Problem::conflict(
                path,
                CONSTRAINT_VIOLATION_TYPE,
                [FieldError::new("user", "email", MSG_LOGIN_AND_EMAIL_TAKEN)],
            ),
            UserError::LoginTaken => Problem::conflict(
                path,
                LOGIN_ALREADY_USED_TYPE,
                [FieldError::new(Signup::OBJECT_NAME, "login", MSG_LOGIN_TAKEN)],
            ),
            UserError::EmailTaken => Problem::conflict(
                path,
                EMAIL_ALREADY_USED_TYPE,
                [FieldError::new(Signup::OBJECT_NAME, "email", MSG_EMAIL_TAKEN)],
            ),
            UserError::ActivationKeyNotFound => Problem::exception(
                path,
                StatusCode::PRECONDITION_FAILED,
                ActivationKey::OBJECT_NAME,
                MSG_WRONG_ACTIVATION_KEY,
            ),
            UserError::AlreadyActivated => Problem::exception(
                path,
                StatusCode::UNPROCESSABLE_ENTITY,
                ActivationKey::OBJECT_NAME,
                MSG_ALREADY_ACTIVATED,
            ),
            UserError::UnexpectedRowCount(rows) => Problem::exception(
                path,
                StatusCode::UNPROCESSABLE_ENTITY,
                ActivationKey::OBJECT_NAME,
                &format!("Activation updated {rows} rows, expected exactly one"),
            ),
            UserError::ActivationFailed(e) => {
                error!(error = %e, "activation store error");
                Problem::exception(
                    path,
                    StatusCode::EXPECTATION_FAILED,
                    ActivationKey::OBJECT_NAME,
                    MSG_ACTIVATION_FAILED,
                )
            }
            UserError::ResetKeyInvalid => Problem::exception(
                path,
                StatusCode::PRECONDITION_FAILED,
                ResetPassword::OBJECT_NAME,
                MSG_WRONG_RESET_KEY,
            ),
            UserError::InvalidPassword => {
                Problem::invalid_password(path, PasswordChange::OBJECT_NAME)
            }
            UserError::ConcurrencyFailure => Problem::concurrency_failure(path),
            UserError::UserNotFound => Problem::unauthorized(path, "User not found"),
            UserError::Database(e) => {
                error!(error = %e, "database error");
                Problem::service_unavailable(path)
            }
            UserError::Internal(e) => {
                error!(error = %e, "internal error");
                Problem::internal(path)
            }
        }
    }
}

fn validate<T: validator::Validate>(payload: &T, object_name: &str, lang: Lang) -> Result<(), UserError> {
    let errors = field_errors(payload, object_name, lang);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(UserError::Validation(errors))
    }
}

fn availability_error(availability: Availability) -> Option<UserError> {
    match availability {
        Availability::AVAILABLE => None,
        Availability::LOGIN_NOT_AVAILABLE => Some(UserError::LoginTaken),
        Availability::EMAIL_NOT_AVAILABLE => Some(UserError::EmailTaken),
        _ => Some(UserError::LoginAndEmailTaken),
    }
}

/// Validates, checks availability, then stores the user with a pending
/// activation and mails the activation link.
pub async fn signup(state: &AppState, payload: Signup, lang: Lang) -> Result<User, UserError> {
    let payload = payload.normalized();
    validate(&payload, Signup::OBJECT_NAME, lang)?;

    let availability = state
        .users
        .signup_availability(&payload.login, &payload.email)
        .await?;
    if let Some(err) = availability_error(availability) {
        warn!(login = %payload.login, email = %payload.email, ?availability, "signup conflict");
        return Err(err);
    }

    let password_hash = hash_password(&payload.password)?;
    let (user, activation) = state
        .users
        .create_user(NewUser {
            login: payload.login,
            email: payload.email,
            password_hash,
            lang_key: lang.code().to_string(),
            activation_key: generate_key(),
        })
        .await?;

    info!(user_id = %user.id, login = %user.login, "user signed up");
    deliver(
        state.mailer.as_ref(),
        activation_mail(&state.config.mail, &user, &activation.activation_key),
    )
    .await;
    Ok(user)
}

/// Completes a pending activation, exactly once.
pub async fn activate(state: &AppState, query: ActivationKey, lang: Lang) -> Result<(), UserError> {
    validate(&query, ActivationKey::OBJECT_NAME, lang)?;
    let key = query.key.trim();

    let rows = state
        .users
        .activate(key)
        .await
        .map_err(UserError::ActivationFailed)?;
    match rows {
        1 => {
            info!("account activated");
            Ok(())
        }
        0 => match state
            .users
            .find_activation(key)
            .await
            .map_err(UserError::ActivationFailed)?
        {
            None => Err(UserError::ActivationKeyNotFound),
            Some(_) => Err(UserError::AlreadyActivated),
        },
        n => Err(UserError::UnexpectedRowCount(n)),
    }
}

/// Starts a reset for the owner of `body`'s email. Unknown emails are
/// accepted silently.
pub async fn reset_init(state: &AppState, body: &str, lang: Lang) -> Result<(), UserError> {
    let payload = ResetInit::from_body(body);
    validate(&payload, ResetInit::OBJECT_NAME, lang)?;

    let Some(account) = state.users.find_account_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "password reset requested for unknown email");
        return Ok(());
    };

    let reset = state
        .users
        .create_reset(account.user.id, &generate_key())
        .await?;
    info!(user_id = %account.user.id, "password reset started");
    deliver(
        state.mailer.as_ref(),
        reset_mail(&state.config.mail, &account.user, &reset.reset_key),
    )
    .await;
    Ok(())
}

/// Consumes an active, unexpired reset key and stores the new password.
pub async fn reset_finish(
    state: &AppState,
    payload: ResetPassword,
    lang: Lang,
) -> Result<(), UserError> {
    validate(&payload, ResetPassword::OBJECT_NAME, lang)?;

    let not_before = reset_not_before(state.config.reset_key_ttl_hours);
    let Some(reset) = state
        .users
        .find_active_reset(payload.key.trim(), not_before)
        .await?
    else {
        return Err(UserError::ResetKeyInvalid);
    };

    let password_hash = hash_password(&payload.new_password)?;
    match state.users.finish_reset(&reset, &password_hash).await? {
        1 => {
            info!(user_id = %reset.user_id, "password reset finished");
            Ok(())
        }
        _ => Err(UserError::ResetKeyInvalid),
    }
}

/// Replaces the caller's password after checking the current one.
pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    payload: PasswordChange,
    lang: Lang,
) -> Result<(), UserError> {
    validate(&payload, PasswordChange::OBJECT_NAME, lang)?;

    let account = state
        .users
        .find_account_by_id(user_id)
        .await?
        .ok_or(UserError::UserNotFound)?;
    if !verify_password(&payload.current_password, &account.user.password)? {
        warn!(%user_id, "change password with wrong current password");
        return Err(UserError::InvalidPassword);
    }

    let password_hash = hash_password(&payload.new_password)?;
    let rows = state
        .users
        .update_password(user_id, account.user.version, &password_hash)
        .await?;
    if rows == 0 {
        warn!(%user_id, version = account.user.version, "stale version on password change");
        return Err(UserError::ConcurrencyFailure);
    }
    info!(%user_id, "password changed");
    Ok(())
}
