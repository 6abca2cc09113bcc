use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::ai::services::{ChatModel, OllamaScaffold};
use crate::config::AppConfig;
use crate::mail::{LogMailer, Mailer};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub chat: Arc<dyn ChatModel>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let mailer = Arc::new(LogMailer::new(&config.mail)) as Arc<dyn Mailer>;
        let chat = Arc::new(OllamaScaffold::from(&config.chat)) as Arc<dyn ChatModel>;

        Ok(Self::from_parts(db, config, users, mailer, chat))
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            db,
            config,
            users,
            mailer,
            chat,
        }
    }
}
