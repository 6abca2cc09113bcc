use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{config::MailConfig, users::repo_types::User, users::validation::Lang};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outgoing mail seam. Delivery is best effort: callers log failures and
/// carry on.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> anyhow::Result<()>;
}

/// Writes mails to the log instead of delivering them.
#[derive(Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(cfg: &MailConfig) -> Self {
        Self {
            from: cfg.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> anyhow::Result<()> {
        info!(from = %self.from, to = %mail.to, subject = %mail.subject, "mail queued (log only)");
        debug!(body = %mail.body, "mail body");
        Ok(())
    }
}

pub fn activation_mail(cfg: &MailConfig, user: &User, key: &str) -> Mail {
    let link = format!(
        "{}/api/users/activate?key={}",
        cfg.base_url.trim_end_matches('/'),
        key
    );
    let (subject, intro) = match Lang::from_tag(&user.lang_key) {
        Lang::Fr => (
            "Activation de votre compte",
            "Cliquez sur le lien ci-dessous pour activer votre compte :",
        ),
        Lang::En => (
            "Account activation",
            "Click on the link below to activate your account:",
        ),
    };
    Mail {
        to: user.email.clone(),
        subject: subject.into(),
        body: format!("{} {},\n\n{}\n{}\n", greeting(user), user.login, intro, link),
    }
}

pub fn reset_mail(cfg: &MailConfig, user: &User, key: &str) -> Mail {
    let link = format!("{}?key={}", cfg.reset_page_url, key);
    let (subject, intro) = match Lang::from_tag(&user.lang_key) {
        Lang::Fr => (
            "Réinitialisation du mot de passe",
            "Cliquez sur le lien ci-dessous pour choisir un nouveau mot de passe :",
        ),
        Lang::En => (
            "Password reset",
            "Click on the link below to choose a new password:",
        ),
    };
    Mail {
        to: user.email.clone(),
        subject: subject.into(),
        body: format!("{} {},\n\n{}\n{}\n", greeting(user), user.login, intro, link),
    }
}

fn greeting(user: &User) -> &'static str {
    match Lang::from_tag(&user.lang_key) {
        Lang::Fr => "Bonjour",
        Lang::En => "Dear",
    }
}

/// Sends `mail`, logging instead of failing when the mailer errors.
pub async fn deliver(mailer: &dyn Mailer, mail: Mail) {
    let to = mail.to.clone();
    if let Err(e) = mailer.send(mail).await {
        warn!(error = %e, %to, "mail delivery failed");
    }
}
