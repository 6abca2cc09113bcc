use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{
    Account, Availability, NewUser, User, UserActivation, UserReset, ROLE_USER,
};

/// Unique index guarding `LOWER(login)`.
pub const LOGIN_UNIQUE_INDEX: &str = "uniq_idx_user_login";
/// Unique index guarding `LOWER(email)`.
pub const EMAIL_UNIQUE_INDEX: &str = "uniq_idx_user_email";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("login already in use")]
    LoginTaken,
    #[error("email already in use")]
    EmailTaken,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps unique violations on the login/email indexes to their variants.
    fn from_insert(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                match db.constraint() {
                    Some(LOGIN_UNIQUE_INDEX) => return StoreError::LoginTaken,
                    Some(EMAIL_UNIQUE_INDEX) => return StoreError::EmailTaken,
                    _ => {}
                }
            }
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of users, activations and resets.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive availability of a login/email pair.
    async fn signup_availability(&self, login: &str, email: &str) -> StoreResult<Availability>;

    /// Inserts the user, its `USER` authority and its activation row atomically.
    async fn create_user(&self, new_user: NewUser) -> StoreResult<(User, UserActivation)>;

    /// Sets the activation date of a still pending key; returns rows updated.
    async fn activate(&self, key: &str) -> StoreResult<u64>;

    async fn find_activation(&self, key: &str) -> StoreResult<Option<UserActivation>>;

    /// Owner of `email`, case-insensitively.
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// Owner of `login`, case-insensitively. Logins may look like emails, so
    /// this never matches on the email column.
    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>>;

    async fn find_account_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;

    /// Deactivates the user's previous resets and inserts a new active one.
    async fn create_reset(&self, user_id: Uuid, reset_key: &str) -> StoreResult<UserReset>;

    /// Active reset for `key` created after `not_before`.
    async fn find_active_reset(
        &self,
        key: &str,
        not_before: OffsetDateTime,
    ) -> StoreResult<Option<UserReset>>;

    /// Stores the new password and consumes the reset; returns resets consumed.
    async fn finish_reset(&self, reset: &UserReset, password_hash: &str) -> StoreResult<u64>;

    /// Optimistic password update; returns rows updated (0 on version mismatch).
    async fn update_password(
        &self,
        user_id: Uuid,
        expected_version: i64,
        password_hash: &str,
    ) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    #[sqlx(flatten)]
    user: User,
    roles: Option<String>,
    activated: bool,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let roles = row
            .roles
            .map(|r| {
                r.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Account {
            user: row.user,
            roles,
            activated: row.activated,
        }
    }
}

const SELECT_ACCOUNT: &str = r#"
    SELECT u."id", u."login", u."email", u."password", u."lang_key", u."version",
           STRING_AGG(DISTINCT ua."role", ',') AS roles,
           BOOL_OR(act."activation_date" IS NOT NULL) IS TRUE AS activated
    FROM "user" AS u
    LEFT JOIN "user_authority" AS ua ON ua."user_id" = u."id"
    LEFT JOIN "user_activation" AS act ON act."id" = u."id"
"#;

const ACCOUNT_GROUP_BY: &str = r#"
    GROUP BY u."id", u."login", u."email", u."password", u."lang_key", u."version"
"#;

#[async_trait]
impl UserStore for PgUserStore {
    async fn signup_availability(&self, login: &str, email: &str) -> StoreResult<Availability> {
        let availability = sqlx::query_as::<_, Availability>(
            r#"
            SELECT
                NOT EXISTS(SELECT 1 FROM "user" WHERE LOWER("login") = LOWER($1))
                AND NOT EXISTS(SELECT 1 FROM "user" WHERE LOWER("email") = LOWER($2))
                    AS login_and_email_available,
                NOT EXISTS(SELECT 1 FROM "user" WHERE LOWER("email") = LOWER($2))
                    AS email_available,
                NOT EXISTS(SELECT 1 FROM "user" WHERE LOWER("login") = LOWER($1))
                    AS login_available
            "#,
        )
        .bind(login)
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(availability)
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<(User, UserActivation)> {
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO "user" ("login", "email", "password", "lang_key", "version")
            VALUES ($1, $2, $3, $4, 0)
            RETURNING "id", "login", "email", "password", "lang_key", "version"
            "#,
        )
        .bind(&new_user.login)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.lang_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from_insert)?;

        sqlx::query(r#"INSERT INTO "user_authority" ("user_id", "role") VALUES ($1, $2)"#)
            .bind(user.id)
            .bind(ROLE_USER)
            .execute(&mut *tx)
            .await?;

        let activation = sqlx::query_as::<_, UserActivation>(
            r#"
            INSERT INTO "user_activation" ("id", "activation_key", "created_date")
            VALUES ($1, $2, now())
            RETURNING "id", "activation_key", "created_date", "activation_date"
            "#,
        )
        .bind(user.id)
        .bind(&new_user.activation_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(user_id = %user.id, "user and activation inserted");
        Ok((user, activation))
    }

    async fn activate(&self, key: &str) -> StoreResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE "user_activation"
            SET "activation_date" = now()
            WHERE "activation_key" = $1 AND "activation_date" IS NULL
            "#,
        )
        .bind(key)
        .execute(&self.db)
        .await?
        .rows_affected();
        Ok(rows)
    }

    async fn find_activation(&self, key: &str) -> StoreResult<Option<UserActivation>> {
        let activation = sqlx::query_as::<_, UserActivation>(
            r#"
            SELECT "id", "activation_key", "created_date", "activation_date"
            FROM "user_activation"
            WHERE "activation_key" = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(activation)
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let sql = format!(
            r#"{SELECT_ACCOUNT}
            WHERE LOWER(u."email") = LOWER($1)
            {ACCOUNT_GROUP_BY}"#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>> {
        let sql = format!(
            r#"{SELECT_ACCOUNT}
            WHERE LOWER(u."login") = LOWER($1)
            {ACCOUNT_GROUP_BY}"#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(login)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn find_account_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!(
            r#"{SELECT_ACCOUNT}
            WHERE u."id" = $1
            {ACCOUNT_GROUP_BY}"#
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Account::from))
    }

    async fn create_reset(&self, user_id: Uuid, reset_key: &str) -> StoreResult<UserReset> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE "user_reset"
            SET "is_active" = FALSE, "version" = "version" + 1
            WHERE "user_id" = $1 AND "is_active"
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let reset = sqlx::query_as::<_, UserReset>(
            r#"
            INSERT INTO "user_reset" ("user_id", "reset_key", "reset_date", "is_active", "version")
            VALUES ($1, $2, now(), TRUE, 0)
            RETURNING "id", "user_id", "reset_key", "reset_date", "change_date", "is_active", "version"
            "#,
        )
        .bind(user_id)
        .bind(reset_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reset)
    }

    async fn find_active_reset(
        &self,
        key: &str,
        not_before: OffsetDateTime,
    ) -> StoreResult<Option<UserReset>> {
        let reset = sqlx::query_as::<_, UserReset>(
            r#"
            SELECT "id", "user_id", "reset_key", "reset_date", "change_date", "is_active", "version"
            FROM "user_reset"
            WHERE "reset_key" = $1 AND "is_active" AND "reset_date" >= $2
            "#,
        )
        .bind(key)
        .bind(not_before)
        .fetch_optional(&self.db)
        .await?;
        Ok(reset)
    }

    async fn finish_reset(&self, reset: &UserReset, password_hash: &str) -> StoreResult<u64> {
        let mut tx = self.db.begin().await?;

        let consumed = sqlx::query(
            r#"
            UPDATE "user_reset"
            SET "is_active" = FALSE, "change_date" = now(), "version" = "version" + 1
            WHERE "id" = $1 AND "is_active" AND "version" = $2
            "#,
        )
        .bind(reset.id)
        .bind(reset.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed != 1 {
            tx.rollback().await?;
            return Ok(consumed);
        }

        sqlx::query(
            r#"
            UPDATE "user"
            SET "password" = $1, "version" = "version" + 1
            WHERE "id" = $2
            "#,
        )
        .bind(password_hash)
        .bind(reset.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(consumed)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        expected_version: i64,
        password_hash: &str,
    ) -> StoreResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE "user"
            SET "password" = $1, "version" = "version" + 1
            WHERE "id" = $2 AND "version" = $3
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .bind(expected_version)
        .execute(&self.db)
        .await?
        .rows_affected();
        Ok(rows)
    }
}

/// Earliest creation date a reset key may have to still be usable.
pub fn reset_not_before(ttl_hours: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::hours(ttl_hours)
}
