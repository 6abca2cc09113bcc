use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

lazy_static! {
    /// Either an email-like login or a plain `[_.@A-Za-z0-9-]+` login.
    pub static ref LOGIN_REGEX: Regex = Regex::new(
        r"^(?:[a-zA-Z0-9!$&*+=?^_`{|}~.-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*|[_.@A-Za-z0-9-]+)$"
    )
    .unwrap();
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_blank"));
    }
    Ok(())
}

/// Request body for `POST /signup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Signup {
    #[validate(
        length(min = 1, max = 50),
        regex(path = *LOGIN_REGEX, code = "pattern")
    )]
    pub login: String,
    #[validate(email, length(min = 5, max = 254))]
    pub email: String,
    #[validate(length(min = 4, max = 100))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub repassword: String,
}

impl Signup {
    pub const OBJECT_NAME: &'static str = "signup";

    /// Logins and emails are stored trimmed and lowercased.
    pub fn normalized(mut self) -> Self {
        self.login = self.login.trim().to_lowercase();
        self.email = self.email.trim().to_lowercase();
        self
    }
}

/// Query string of `GET /activate`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ActivationKey {
    #[validate(custom(function = "not_blank"))]
    pub key: String,
}

impl ActivationKey {
    pub const OBJECT_NAME: &'static str = "userActivation";
}

/// Body of `POST /reset-password/init`, built from the raw email.
#[derive(Debug, Clone, Default, Validate)]
pub struct ResetInit {
    #[validate(email, length(min = 5, max = 254))]
    pub email: String,
}

impl ResetInit {
    pub const OBJECT_NAME: &'static str = "userReset";

    /// Accepts a bare email or a JSON string literal.
    pub fn from_body(body: &str) -> Self {
        let body = body.trim();
        let email = serde_json::from_str::<String>(body).unwrap_or_else(|_| body.to_string());
        Self {
            email: email.trim().to_lowercase(),
        }
    }
}

/// Body of `POST /reset-password/finish`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPassword {
    #[validate(custom(function = "not_blank"))]
    pub key: String,
    #[validate(length(min = 4, max = 100))]
    pub new_password: String,
}

impl ResetPassword {
    pub const OBJECT_NAME: &'static str = "resetPassword";
}

/// Body of `POST /change-password`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordChange {
    #[validate(length(min = 4, max = 100))]
    pub current_password: String,
    #[validate(length(min = 4, max = 100))]
    pub new_password: String,
}

impl PasswordChange {
    pub const OBJECT_NAME: &'static str = "passwordChange";
}

/// Request body for `POST /authenticate`; `username` is a login or an email.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Login {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 4, max = 100))]
    pub password: String,
    pub remember_me: Option<bool>,
}

impl Login {
    pub const OBJECT_NAME: &'static str = "login";
}

/// Response of `POST /authenticate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
}

/// Public part of the caller's account.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub lang_key: String,
    pub roles: Vec<String>,
}
