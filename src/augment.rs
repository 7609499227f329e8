//! Pull request diff augmentation.
//!
//! A session receives diff content at most once. The first message that
//! references a pull request triggers a fetch; on success the diff is
//! recorded as the session's single `diffs` turn and folded into that
//! message's prompt. Later messages are sent as-is, since the model gets
//! the diff back through the replayed history.

use std::sync::Arc;

use crate::constants::{DIFF_SECTION_HEADER, MESSAGE_SECTION_HEADER};
use crate::diffs::{DiffError, DiffSource};
use crate::history::{SessionHistoryStore, StoreError};
use crate::models::{PullRequestRef, Role, Turn};

/// What happened to diff content for one message.
#[derive(Debug)]
pub enum DiffStatus {
    /// Fetched during this call and recorded as the `diffs` turn.
    Attached,
    /// The session already carries a `diffs` turn; nothing was fetched.
    AlreadyAttached,
    /// No pull request referenced and none attached yet.
    NotRequested,
    /// The fetch failed. Nothing was recorded and the prompt is the raw message.
    Unavailable(DiffError),
}

/// Result of augmenting one user message.
#[derive(Debug)]
pub struct Augmented {
    pub prompt: String,
    pub status: DiffStatus,
}

/// Join diff content and a user message with stable section headers.
pub fn compose_prompt(diff: &str, message: &str) -> String {
    format!("{DIFF_SECTION_HEADER}\n{diff}\n\n{MESSAGE_SECTION_HEADER}\n{message}")
}

/// Decides whether a session needs its diff and records it at most once.
pub struct DiffAugmenter {
    store: Arc<dyn SessionHistoryStore>,
    source: Arc<dyn DiffSource>,
}

impl DiffAugmenter {
    pub fn new(store: Arc<dyn SessionHistoryStore>, source: Arc<dyn DiffSource>) -> Self {
        Self { store, source }
    }

    /// Build the outgoing prompt for `message`.
    ///
    /// Only store failures are errors; a failed fetch is reported through
    /// [`DiffStatus::Unavailable`] so the caller picks the policy.
    pub async fn augment(
        &self,
        session_id: &str,
        pr: Option<&PullRequestRef>,
        message: &str,
    ) -> Result<Augmented, StoreError> {
        if self.store.exists_turn_with_role(session_id, Role::Diffs).await? {
            return Ok(Augmented {
                prompt: message.to_string(),
                status: DiffStatus::AlreadyAttached,
            });
        }

        let Some(pr) = pr else {
            return Ok(Augmented {
                prompt: message.to_string(),
                status: DiffStatus::NotRequested,
            });
        };

        match self.source.get_diffs(pr).await {
            Ok(diff) => {
                let prompt = compose_prompt(&diff, message);
                let bytes = diff.len();
                // Another message on this session may have attached its diff
                // while this fetch was in flight. The stored one wins.
                if !self.store.append_if_absent(session_id, Turn::diffs(diff)).await? {
                    tracing::debug!(session_id, %pr, "diff already attached, discarding fetch");
                    return Ok(Augmented {
                        prompt: message.to_string(),
                        status: DiffStatus::AlreadyAttached,
                    });
                }
                tracing::info!(session_id, %pr, bytes, "attached pull request diff");
                Ok(Augmented {
                    prompt,
                    status: DiffStatus::Attached,
                })
            }
            Err(e) => {
                tracing::warn!(session_id, %pr, error = %e, "pull request diff unavailable");
                Ok(Augmented {
                    prompt: message.to_string(),
                    status: DiffStatus::Unavailable(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        result: Result<&'static str, &'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn ok(diff: &'static str) -> Arc<Self> {
            Self::slow(diff, Duration::ZERO)
        }

        fn slow(diff: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(diff),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Err("boom"),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DiffSource for CountingSource {
        async fn get_diffs(&self, _pr: &PullRequestRef) -> Result<String, DiffError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result
                .map(String::from)
                .map_err(|e| DiffError::Api(e.to_string()))
        }
    }

    fn pr() -> PullRequestRef {
        PullRequestRef::new("org/repo", 42)
    }

    #[test]
    fn composed_prompt_layout() {
        assert_eq!(
            compose_prompt("+line", "summarize"),
            "PR DIFFS:\n+line\n\nUser Message:\nsummarize"
        );
    }

    #[tokio::test]
    async fn first_fetch_records_diffs_turn() {
        let store = Arc::new(MemoryStore::new());
        let source = CountingSource::ok("+added");
        let augmenter = DiffAugmenter::new(store.clone(), source.clone());

        let out = augmenter.augment("s1", Some(&pr()), "summarize").await.unwrap();

        assert!(matches!(out.status, DiffStatus::Attached));
        assert_eq!(out.prompt, compose_prompt("+added", "summarize"));
        let turns = store.load("s1").await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Diffs);
        assert_eq!(turns[0].text, "+added");
    }

    #[tokio::test]
    async fn second_augment_does_not_refetch() {
        let store = Arc::new(MemoryStore::new());
        let source = CountingSource::ok("+added");
        let augmenter = DiffAugmenter::new(store.clone(), source.clone());

        augmenter.augment("s1", Some(&pr()), "one").await.unwrap();
        let out = augmenter.augment("s1", Some(&pr()), "two").await.unwrap();

        assert!(matches!(out.status, DiffStatus::AlreadyAttached));
        assert_eq!(out.prompt, "two");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        let diffs = store
            .load("s1")
            .await
            .unwrap()
            .iter()
            .filter(|t| t.role == Role::Diffs)
            .count();
        assert_eq!(diffs, 1);
    }

    #[tokio::test]
    async fn overlapping_first_messages_record_one_diff() {
        let store = Arc::new(MemoryStore::new());
        let source = CountingSource::slow("+added", Duration::from_millis(50));
        let augmenter = DiffAugmenter::new(store.clone(), source.clone());

        let (pr_a, pr_b) = (pr(), pr());
        let (a, b) = tokio::join!(
            augmenter.augment("s1", Some(&pr_a), "from tab one"),
            augmenter.augment("s1", Some(&pr_b), "from tab two"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        let attached = [&a, &b]
            .iter()
            .filter(|out| matches!(out.status, DiffStatus::Attached))
            .count();
        assert_eq!(attached, 1);
        let loser = if matches!(a.status, DiffStatus::Attached) { &b } else { &a };
        assert!(matches!(loser.status, DiffStatus::AlreadyAttached));
        assert!(!loser.prompt.starts_with("PR DIFFS:"));

        let turns = store.load("s1").await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Diffs);
    }

    #[tokio::test]
    async fn failed_fetch_records_nothing() {
        let store = Arc::new(MemoryStore::new());
        let augmenter = DiffAugmenter::new(store.clone(), CountingSource::failing());

        let out = augmenter.augment("s1", Some(&pr()), "summarize").await.unwrap();

        assert!(matches!(out.status, DiffStatus::Unavailable(_)));
        assert_eq!(out.prompt, "summarize");
        assert!(store.load("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_on_next_message() {
        let store = Arc::new(MemoryStore::new());
        let source = CountingSource::failing();
        let augmenter = DiffAugmenter::new(store.clone(), source.clone());

        augmenter.augment("s1", Some(&pr()), "one").await.unwrap();
        augmenter.augment("s1", Some(&pr()), "two").await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_diff_is_a_successful_attachment() {
        let store = Arc::new(MemoryStore::new());
        let augmenter = DiffAugmenter::new(store.clone(), CountingSource::ok(""));

        let out = augmenter.augment("s1", Some(&pr()), "hi").await.unwrap();

        assert!(matches!(out.status, DiffStatus::Attached));
        assert!(store.exists_turn_with_role("s1", Role::Diffs).await.unwrap());
    }

    #[tokio::test]
    async fn no_reference_means_no_fetch() {
        let store = Arc::new(MemoryStore::new());
        let source = CountingSource::ok("+added");
        let augmenter = DiffAugmenter::new(store.clone(), source.clone());

        let out = augmenter.augment("s1", None, "hello").await.unwrap();

        assert!(matches!(out.status, DiffStatus::NotRequested));
        assert_eq!(out.prompt, "hello");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
