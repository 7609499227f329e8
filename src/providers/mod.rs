//! ChatModel trait and LLM integration.
//!
//! Provides an abstraction layer over rig-core to decouple the chat core
//! from the specific LLM library.

pub mod rig;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatMessage;

/// Errors from the language model.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// The language-model collaborator.
///
/// `prior` is the replayed conversation in order, alternating user and
/// assistant messages; `prompt` is the new user message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, prompt: &str, prior: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
