//! In-memory doubles used by the router tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    ai::services::{ChatModel, OllamaScaffold},
    auth::password::{generate_key, hash_password},
    config::AppConfig,
    mail::{Mail, Mailer},
    state::AppState,
    users::{
        repo::{StoreError, StoreResult, UserStore},
        repo_types::{
            Account, Availability, NewUser, User, UserActivation, UserReset, DEFAULT_LANG_KEY,
            ROLE_USER,
        },
    },
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    authorities: Vec<(Uuid, String)>,
    activations: Vec<UserActivation>,
    resets: Vec<UserReset>,
}

impl Tables {
    fn account(&self, user: &User) -> Account {
        Account {
            user: user.clone(),
            roles: self
                .authorities
                .iter()
                .filter(|(id, _)| *id == user.id)
                .map(|(_, role)| role.clone())
                .collect(),
            activated: self
                .activations
                .iter()
                .any(|a| a.id == user.id && a.is_activated()),
        }
    }
}

/// Case-insensitive [`UserStore`] kept in a mutex; `fail(true)` makes every
/// call return a database error.
#[derive(Default)]
pub struct MemoryUserStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryUserStore {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }

    pub fn user(&self, login: &str) -> Option<User> {
        self.users().into_iter().find(|u| u.login == login)
    }

    pub fn activations(&self) -> Vec<UserActivation> {
        self.tables.lock().unwrap().activations.clone()
    }

    pub fn authorities(&self) -> Vec<(Uuid, String)> {
        self.tables.lock().unwrap().authorities.clone()
    }

    pub fn resets(&self) -> Vec<UserReset> {
        self.tables.lock().unwrap().resets.clone()
    }

    /// Seeds a user; `activated` decides whether its activation is done.
    pub fn seed(&self, login: &str, email: &str, password: &str, activated: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            login: login.into(),
            email: email.into(),
            password: hash_password(password).unwrap(),
            lang_key: DEFAULT_LANG_KEY.into(),
            version: 0,
        };
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.lock().unwrap();
        tables.users.push(user.clone());
        tables.authorities.push((user.id, ROLE_USER.into()));
        tables.activations.push(UserActivation {
            id: user.id,
            activation_key: generate_key(),
            created_date: now,
            activation_date: activated.then_some(now),
        });
        user
    }

    /// Moves every reset of the user back in time.
    pub fn age_resets(&self, user_id: Uuid, by: time::Duration) {
        let mut tables = self.tables.lock().unwrap();
        for reset in tables.resets.iter_mut().filter(|r| r.user_id == user_id) {
            reset.reset_date -= by;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn signup_availability(&self, login: &str, email: &str) -> StoreResult<Availability> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let login_taken = tables.users.iter().any(|u| u.login.eq_ignore_ascii_case(login));
        let email_taken = tables.users.iter().any(|u| u.email.eq_ignore_ascii_case(email));
        Ok(Availability::from_taken(login_taken, email_taken))
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<(User, UserActivation)> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if tables
            .users
            .iter()
            .any(|u| u.login.eq_ignore_ascii_case(&new_user.login))
        {
            return Err(StoreError::LoginTaken);
        }
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StoreError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            login: new_user.login,
            email: new_user.email,
            password: new_user.password_hash,
            lang_key: new_user.lang_key,
            version: 0,
        };
        let activation = UserActivation {
            id: user.id,
            activation_key: new_user.activation_key,
            created_date: OffsetDateTime::now_utc(),
            activation_date: None,
        };
        tables.users.push(user.clone());
        tables.authorities.push((user.id, ROLE_USER.into()));
        tables.activations.push(activation.clone());
        Ok((user, activation))
    }

    async fn activate(&self, key: &str) -> StoreResult<u64> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let mut rows = 0;
        for activation in tables
            .activations
            .iter_mut()
            .filter(|a| a.activation_key == key && a.activation_date.is_none())
        {
            activation.activation_date = Some(OffsetDateTime::now_utc());
            rows += 1;
        }
        Ok(rows)
    }

    async fn find_activation(&self, key: &str) -> StoreResult<Option<UserActivation>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .activations
            .iter()
            .find(|a| a.activation_key == key)
            .cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| tables.account(u)))
    }

    async fn find_account_by_login(&self, login: &str) -> StoreResult<Option<Account>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.login.eq_ignore_ascii_case(login))
            .map(|u| tables.account(u)))
    }

    async fn find_account_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| tables.account(u)))
    }

    async fn create_reset(&self, user_id: Uuid, reset_key: &str) -> StoreResult<UserReset> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        for reset in tables
            .resets
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.is_active)
        {
            reset.is_active = false;
            reset.version += 1;
        }
        let reset = UserReset {
            id: Uuid::new_v4(),
            user_id,
            reset_key: reset_key.into(),
            reset_date: OffsetDateTime::now_utc(),
            change_date: None,
            is_active: true,
            version: 0,
        };
        tables.resets.push(reset.clone());
        Ok(reset)
    }

    async fn find_active_reset(
        &self,
        key: &str,
        not_before: OffsetDateTime,
    ) -> StoreResult<Option<UserReset>> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .resets
            .iter()
            .find(|r| r.reset_key == key && r.is_active && r.reset_date >= not_before)
            .cloned())
    }

    async fn finish_reset(&self, reset: &UserReset, password_hash: &str) -> StoreResult<u64> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(stored) = tables
            .resets
            .iter_mut()
            .find(|r| r.id == reset.id && r.is_active && r.version == reset.version)
        else {
            return Ok(0);
        };
        stored.is_active = false;
        stored.change_date = Some(OffsetDateTime::now_utc());
        stored.version += 1;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == reset.user_id) {
            user.password = password_hash.into();
            user.version += 1;
        }
        Ok(1)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        expected_version: i64,
        password_hash: &str,
    ) -> StoreResult<u64> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        match tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id && u.version == expected_version)
        {
            Some(user) => {
                user.password = password_hash.into();
                user.version += 1;
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// Keeps every mail it is given; `fail(true)` makes `send` error.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Mail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Value of the `key` query parameter in the last mail's link.
    pub fn last_key(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last()?.body;
        let start = body.find("key=")? + "key=".len();
        Some(
            body[start..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect(),
        )
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("smtp unreachable");
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Application state wired to in-memory doubles and a lazy pool.
pub struct TestApp {
    pub users: Arc<MemoryUserStore>,
    pub mailer: Arc<RecordingMailer>,
    pub config: Arc<AppConfig>,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::default()),
            mailer: Arc::new(RecordingMailer::default()),
            config: Arc::new(AppConfig::for_tests()),
        }
    }

    pub fn state(&self) -> AppState {
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&self.config.database_url)
            .expect("lazy pool ok");
        let chat = Arc::new(OllamaScaffold::from(&self.config.chat)) as Arc<dyn ChatModel>;
        AppState::from_parts(
            db,
            self.config.clone(),
            self.users.clone(),
            self.mailer.clone(),
            chat,
        )
    }
}
