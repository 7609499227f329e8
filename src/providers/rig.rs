//! rig-core integration for multi-turn chat.
//!
//! Uses rig-core's provider clients and Agent abstraction. The provider
//! name in config selects which client is built; model, temperature,
//! max tokens, and the system preamble apply to every provider.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers;

use crate::config::ProviderConfig;
use crate::models::{ChatMessage, ProviderName, Speaker};
use crate::secrets::ApiKey;

use super::{ChatModel, ProviderError};

/// Upper bound on backoff, as a multiple of the initial delay.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// Build an agent from a rig-core client and chat with it.
macro_rules! chat_with {
    ($client:expr, $config:expr, $prompt:expr, $history:expr, $label:expr) => {{
        let agent = $client
            .agent($config.model.as_str())
            .preamble($config.system_prompt.as_str())
            .temperature($config.temperature)
            .max_tokens($config.max_tokens)
            .build();
        agent
            .chat($prompt, $history)
            .await
            .map_err(|e| ProviderError::ApiError(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| {
            ProviderError::ApiError(format!("failed to create {} client: {e}", $label))
        })
    }};
}

/// rig-core based chat model.
pub struct RigProvider {
    config: ProviderConfig,
    api_key: ApiKey,
}

impl RigProvider {
    /// Create a new provider. The key comes from the secrets bootstrap.
    pub fn new(config: ProviderConfig, api_key: ApiKey) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "empty API key for provider '{}'",
                config.name
            )));
        }
        if config.name == ProviderName::OpenAICompatible && config.base_url.is_none() {
            return Err(ProviderError::NotConfigured(
                "openai-compatible provider requires base_url to be set".to_string(),
            ));
        }
        Ok(Self { config, api_key })
    }

    /// Build an OpenAI-style client, optionally with a custom base URL.
    fn build_openai_client(&self, label: &str) -> Result<providers::openai::CompletionsClient, ProviderError> {
        let mut builder =
            providers::openai::CompletionsClient::builder().api_key(self.api_key.expose());
        if let Some(ref base_url) = self.config.base_url {
            builder = builder.base_url(base_url);
        }
        builder
            .build()
            .map_err(|e| ProviderError::ApiError(format!("failed to create {label} client: {e}")))
    }
}

/// Convert replayed messages into rig's chat history.
fn to_rig_history(prior: &[ChatMessage]) -> Vec<Message> {
    prior
        .iter()
        .map(|m| match m.speaker {
            Speaker::User => Message::user(m.content.clone()),
            Speaker::Assistant => Message::assistant(m.content.clone()),
        })
        .collect()
}

#[async_trait]
impl ChatModel for RigProvider {
    async fn invoke(&self, prompt: &str, prior: &[ChatMessage]) -> Result<String, ProviderError> {
        let history = to_rig_history(prior);
        let api_key = self.api_key.expose();
        let config = &self.config;

        match config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        ProviderError::ApiError(format!("failed to create Anthropic client: {e}"))
                    })?;
                chat_with!(client, config, prompt, history, "Anthropic")
            }
            ProviderName::OpenAI => {
                let client = self.build_openai_client("OpenAI")?;
                chat_with!(client, config, prompt, history, "OpenAI")
            }
            ProviderName::OpenAICompatible => {
                let client = self.build_openai_client("OpenAI-compatible")?;
                chat_with!(client, config, prompt, history, "OpenAI-compatible")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                chat_with!(client, config, prompt, history, "Gemini")
            }
            ProviderName::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                chat_with!(client, config, prompt, history, "DeepSeek")
            }
            ProviderName::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                chat_with!(client, config, prompt, history, "Groq")
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Check whether a provider error is transient and worth retrying.
pub fn is_retryable(err: &ProviderError) -> bool {
    classify_error(err).is_some()
}

/// Classifies a provider error into a short, user-friendly message.
///
/// Returns `Some(message)` for transient errors (rate limiting, overload,
/// gateway, timeout, connection), `None` otherwise.
pub fn classify_error(err: &ProviderError) -> Option<&'static str> {
    match err {
        ProviderError::ApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            if msg_lower.contains("429")
                || msg_lower.contains("rate limit")
                || msg_lower.contains("too many requests")
            {
                Some("Rate limited by API")
            } else if msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("high demand")
            {
                Some("High model load")
            } else if msg_lower.contains("529") || msg_lower.contains("overloaded") {
                Some("API overloaded")
            } else if msg_lower.contains("502") {
                Some("API gateway error")
            } else if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
                Some("Request timed out")
            } else if msg_lower.contains("connection") {
                Some("Connection error")
            } else {
                None
            }
        }
        ProviderError::NotConfigured(_) => None,
    }
}

/// Exponential backoff for retry `attempt` (0-based), capped at 8x `initial`.
pub fn retry_backoff(initial: Duration, attempt: u32) -> Duration {
    let backoff = initial.saturating_mul(2u32.saturating_pow(attempt));
    backoff.min(initial.saturating_mul(MAX_BACKOFF_FACTOR))
}
