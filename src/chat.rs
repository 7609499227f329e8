//! Chat orchestrator: one user message in, one assistant reply out.
//!
//! Per message the order is fixed: augment, rebuild context from the
//! stored history, invoke the model, then persist the user and assistant
//! turns. Nothing is persisted for a message whose model call failed.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::augment::{Augmented, DiffAugmenter, DiffStatus, compose_prompt};
use crate::config::{Config, DiffFailurePolicy};
use crate::constants::ERROR_REPLY_PREFIX;
use crate::diffs::{DiffError, DiffSource};
use crate::history::{SessionHistoryStore, StoreError};
use crate::models::{ChatMessage, PullRequestRef, Role, SessionKey, Turn};
use crate::providers::rig::{classify_error, is_retryable, retry_backoff};
use crate::providers::{ChatModel, ProviderError};

/// Errors from handling one chat message.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] ProviderError),

    #[error("pull request diff unavailable: {0}")]
    DiffFetch(#[from] DiffError),
}

impl ChatError {
    /// Text sent back over the chat channel in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::ModelInvocation(e) => match classify_error(e) {
                Some(short) => format!("{ERROR_REPLY_PREFIX} {short}, please try again"),
                None => format!("{ERROR_REPLY_PREFIX} {self}"),
            },
            _ => format!("{ERROR_REPLY_PREFIX} {self}"),
        }
    }
}

/// Coordinates augmentation, context reconstruction, model invocation,
/// and persistence for one session message at a time.
pub struct ChatOrchestrator {
    store: Arc<dyn SessionHistoryStore>,
    augmenter: DiffAugmenter,
    model: Arc<dyn ChatModel>,
    on_diff_failure: DiffFailurePolicy,
    max_retries: u32,
    retry_backoff: Duration,
}

impl ChatOrchestrator {
    /// Create an orchestrator with no retries and the default diff policy.
    pub fn new(
        store: Arc<dyn SessionHistoryStore>,
        diffs: Arc<dyn DiffSource>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            augmenter: DiffAugmenter::new(store.clone(), diffs),
            store,
            model,
            on_diff_failure: DiffFailurePolicy::default(),
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Create an orchestrator tuned by `config`.
    pub fn from_config(
        store: Arc<dyn SessionHistoryStore>,
        diffs: Arc<dyn DiffSource>,
        model: Arc<dyn ChatModel>,
        config: &Config,
    ) -> Self {
        Self::new(store, diffs, model)
            .with_diff_policy(config.diffs.on_failure)
            .with_retries(
                config.provider.max_retries,
                Duration::from_millis(config.provider.retry_backoff_ms),
            )
    }

    pub fn with_diff_policy(mut self, policy: DiffFailurePolicy) -> Self {
        self.on_diff_failure = policy;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = initial_backoff;
        self
    }

    /// Handle one user message and return the assistant's reply.
    ///
    /// On success the session has grown by exactly two turns (three when
    /// the diff was attached by this call). On failure it holds no new
    /// user or assistant turn.
    pub async fn handle_message(
        &self,
        session: &SessionKey,
        message: &str,
        pr: Option<&PullRequestRef>,
    ) -> Result<String, ChatError> {
        let session_id = session.session_id.as_str();
        let augmented = self.augmenter.augment(session_id, pr, message).await?;

        if self.on_diff_failure == DiffFailurePolicy::Abort {
            if let DiffStatus::Unavailable(e) = augmented.status {
                tracing::warn!(%session, error = %e, "aborting message without diff");
                return Err(ChatError::DiffFetch(e));
            }
        }

        let history = self.store.load(session_id).await?;
        let (prior, prompt) = build_context(&history, &augmented);
        tracing::debug!(
            %session,
            prior = prior.len(),
            status = ?augmented.status,
            model = self.model.model_name(),
            "invoking model"
        );

        let reply = self.invoke_with_retry(session, &prompt, &prior).await?;

        self.store
            .append_all(
                session_id,
                vec![Turn::user(message), Turn::assistant(reply.as_str())],
            )
            .await?;
        tracing::info!(%session, reply_len = reply.len(), "reply stored");
        Ok(reply)
    }

    async fn invoke_with_retry(
        &self,
        session: &SessionKey,
        prompt: &str,
        prior: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.model.invoke(prompt, prior).await {
                Ok(reply) => return Ok(reply),
                Err(ref e) if is_retryable(e) && attempt < self.max_retries => {
                    let backoff = retry_backoff(self.retry_backoff, attempt);
                    tracing::warn!(
                        %session,
                        attempt = attempt + 1,
                        max = self.max_retries + 1,
                        reason = classify_error(e).unwrap_or("Transient error"),
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying model call"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(%session, error = %e, "model call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Rebuild the conversation the model sees from stored turns.
///
/// Returns the prior messages and the final prompt. The `diffs` turn is
/// not a speaker: its content is folded into the first user turn recorded
/// after it. If no user turn follows (the message that fetched it failed
/// at the model), it is folded into the current prompt instead. When
/// `augmented` already carries a freshly fetched diff, stored diffs turns
/// are skipped so the content is not sent twice.
pub fn build_context(history: &[Turn], augmented: &Augmented) -> (Vec<ChatMessage>, String) {
    let fresh = matches!(augmented.status, DiffStatus::Attached);
    let mut pending: Option<&str> = None;
    let mut prior = Vec::with_capacity(history.len());

    for turn in history {
        match turn.role {
            Role::Diffs if !fresh => pending = Some(turn.text.as_str()),
            Role::Diffs => {}
            Role::User => {
                let content = match pending.take() {
                    Some(diff) => compose_prompt(diff, &turn.text),
                    None => turn.text.clone(),
                };
                prior.push(ChatMessage::user(content));
            }
            Role::Assistant => prior.push(ChatMessage::assistant(turn.text.as_str())),
        }
    }

    let prompt = match pending {
        Some(diff) => compose_prompt(diff, &augmented.prompt),
        None => augmented.prompt.clone(),
    };
    (prior, prompt)
}
