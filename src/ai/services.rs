use async_trait::async_trait;
use tracing::debug;

use crate::config::ChatConfig;

/// Chat model used by the translator endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn answer(&self, question: &str) -> anyhow::Result<Option<String>>;
}

/// Placeholder for an Ollama-backed model; knows where the model lives but
/// never calls it.
#[derive(Debug, Clone)]
pub struct OllamaScaffold {
    pub base_url: String,
    pub model: String,
}

impl From<&ChatConfig> for OllamaScaffold {
    fn from(cfg: &ChatConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaScaffold {
    async fn answer(&self, question: &str) -> anyhow::Result<Option<String>> {
        debug!(
            base_url = %self.base_url,
            model = %self.model,
            question_len = question.len(),
            "chat model not wired, no answer"
        );
        Ok(None)
    }
}
