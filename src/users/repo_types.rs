use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role granted to every new account.
pub const ROLE_USER: &str = "USER";

pub const DEFAULT_LANG_KEY: &str = "en";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String, // Argon2 hash, not exposed in JSON
    pub lang_key: String,
    #[serde(skip_serializing)]
    pub version: i64,
}

/// Activation record, one per signed-up user.
#[derive(Debug, Clone, FromRow)]
pub struct UserActivation {
    pub id: Uuid,
    pub activation_key: String,
    pub created_date: OffsetDateTime,
    pub activation_date: Option<OffsetDateTime>,
}

impl UserActivation {
    pub fn is_activated(&self) -> bool {
        self.activation_date.is_some()
    }
}

/// Password reset request.
#[derive(Debug, Clone, FromRow)]
pub struct UserReset {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reset_key: String,
    pub reset_date: OffsetDateTime,
    pub change_date: Option<OffsetDateTime>,
    pub is_active: bool,
    pub version: i64,
}

/// A user with its granted roles and activation state.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub roles: Vec<String>,
    pub activated: bool,
}

/// Values needed to insert a user and its activation row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub lang_key: String,
    pub activation_key: String,
}

/// Result of the signup availability query, in column order
/// `(login_and_email_available, email_available, login_available)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Availability {
    pub login_and_email_available: bool,
    pub email_available: bool,
    pub login_available: bool,
}

impl Availability {
    pub const AVAILABLE: Self = Self::new(true, true, true);
    pub const LOGIN_NOT_AVAILABLE: Self = Self::new(false, true, false);
    pub const EMAIL_NOT_AVAILABLE: Self = Self::new(false, false, true);
    pub const LOGIN_AND_EMAIL_NOT_AVAILABLE: Self = Self::new(false, false, false);

    pub const fn new(both: bool, email: bool, login: bool) -> Self {
        Self {
            login_and_email_available: both,
            email_available: email,
            login_available: login,
        }
    }

    /// Computes the triple from the two underlying existence checks.
    pub const fn from_taken(login_taken: bool, email_taken: bool) -> Self {
        Self::new(!(login_taken || email_taken), !email_taken, !login_taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_from_taken_matches_named_outcomes() {
        assert_eq!(Availability::from_taken(false, false), Availability::AVAILABLE);
        assert_eq!(
            Availability::from_taken(true, false),
            Availability::LOGIN_NOT_AVAILABLE
        );
        assert_eq!(
            Availability::from_taken(false, true),
            Availability::EMAIL_NOT_AVAILABLE
        );
        assert_eq!(
            Availability::from_taken(true, true),
            Availability::LOGIN_AND_EMAIL_NOT_AVAILABLE
        );
    }

    #[test]
    fn user_json_hides_password_and_version() {
        let user = User {
            id: Uuid::new_v4(),
            login: "jdoe".into(),
            email: "jdoe@acme.com".into(),
            password: "$argon2id$secret".into(),
            lang_key: "en".into(),
            version: 3,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("jdoe@acme.com"));
        assert!(json.contains("langKey"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("version"));
    }
}
