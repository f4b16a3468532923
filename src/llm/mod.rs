use axum::async_trait;
#[cfg(test)]
use mockall::automock;

pub mod openai;

/// A hosted single-turn completion API.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Sends `prompt` as the system instruction and `message` as the user turn,
    /// returning the model's reply text (possibly empty).
    async fn complete(&self, prompt: &str, message: &str) -> Result<String, anyhow::Error>;
}
