//! Integration tests for the chat pipeline over real history backends.
//!
//! Uses a scripted model and diff source so no network or API key is
//! needed. The file backend runs in a temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use prchat::augment::compose_prompt;
use prchat::chat::{ChatError, ChatOrchestrator};
use prchat::config::{Config, DiffFailurePolicy};
use prchat::diffs::{DiffError, DiffSource};
use prchat::history::{CacheStore, FileStore, MemoryStore, SessionHistoryStore, StoreError};
use prchat::models::{ChatMessage, PullRequestRef, Role, SessionKey, Turn};
use prchat::providers::{ChatModel, ProviderError};

/// Numbered replies; records every prompt and prior context it saw.
#[derive(Default)]
struct RecordingModel {
    seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    fail_next: AtomicUsize,
}

impl RecordingModel {
    fn seen(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    async fn invoke(&self, prompt: &str, prior: &[ChatMessage]) -> Result<String, ProviderError> {
        let n = {
            let mut seen = self.seen.lock().unwrap();
            seen.push((prompt.to_string(), prior.to_vec()));
            seen.len()
        };
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::ApiError("400 bad request".to_string()));
        }
        Ok(format!("model reply {n}"))
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Serves a fixed diff and counts fetches.
struct FixedDiff {
    diff: Option<String>,
    latency: Duration,
    fetches: AtomicUsize,
}

impl FixedDiff {
    fn new(diff: &str) -> Arc<Self> {
        Self::slow(diff, Duration::ZERO)
    }

    fn slow(diff: &str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            diff: Some(diff.to_string()),
            latency,
            fetches: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            diff: None,
            latency: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DiffSource for FixedDiff {
    async fn get_diffs(&self, pr: &PullRequestRef) -> Result<String, DiffError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.diff
            .clone()
            .ok_or_else(|| DiffError::Api(format!("fetching {pr} failed with HTTP 502")))
    }
}

/// A store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl SessionHistoryStore for BrokenStore {
    async fn load(&self, _session_id: &str) -> Result<Vec<Turn>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn append_all(&self, _session_id: &str, _turns: Vec<Turn>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn append_if_absent(&self, _session_id: &str, _turn: Turn) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

const DIFF: &str = "diff --git a/src/lib.rs b/src/lib.rs\n+pub fn added() {}\n";

fn s1() -> SessionKey {
    SessionKey::new("alice", "s1")
}

fn pr42() -> PullRequestRef {
    PullRequestRef::new("org/repo", 42)
}

fn summary(turns: &[Turn]) -> Vec<(Role, String)> {
    turns.iter().map(|t| (t.role, t.text.clone())).collect()
}

#[tokio::test]
async fn two_message_session_on_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SessionHistoryStore> = Arc::new(FileStore::new(dir.path().to_path_buf()));
    let diffs = FixedDiff::new(DIFF);
    let model = Arc::new(RecordingModel::default());
    let chat = ChatOrchestrator::new(store.clone(), diffs.clone(), model.clone());

    let first = chat.handle_message(&s1(), "summarize", Some(&pr42())).await.unwrap();
    assert_eq!(first, "model reply 1");
    assert_eq!(
        summary(&store.load("s1").await.unwrap()),
        vec![
            (Role::Diffs, DIFF.to_string()),
            (Role::User, "summarize".to_string()),
            (Role::Assistant, "model reply 1".to_string()),
        ]
    );

    let second = chat.handle_message(&s1(), "what about tests?", None).await.unwrap();
    assert_eq!(second, "model reply 2");
    assert_eq!(diffs.fetches.load(Ordering::SeqCst), 1);

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns.len(), 5);
    assert_eq!(
        summary(&turns[3..]),
        vec![
            (Role::User, "what about tests?".to_string()),
            (Role::Assistant, "model reply 2".to_string()),
        ]
    );

    let seen = model.seen();
    assert_eq!(seen[0].0, compose_prompt(DIFF, "summarize"));
    assert_eq!(seen[1].0, "what about tests?");
    assert_eq!(
        seen[1].1,
        vec![
            ChatMessage::user(compose_prompt(DIFF, "summarize")),
            ChatMessage::assistant("model reply 1"),
        ]
    );
}

#[tokio::test]
async fn history_survives_restart_on_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let diffs = FixedDiff::new(DIFF);

    {
        let store = Arc::new(FileStore::new(dir.path().to_path_buf()));
        let chat = ChatOrchestrator::new(store, diffs.clone(), Arc::new(RecordingModel::default()));
        chat.handle_message(&s1(), "summarize", Some(&pr42())).await.unwrap();
    }

    let store = Arc::new(FileStore::new(dir.path().to_path_buf()));
    let model = Arc::new(RecordingModel::default());
    let chat = ChatOrchestrator::new(store.clone(), diffs.clone(), model.clone());
    chat.handle_message(&s1(), "and now?", Some(&pr42())).await.unwrap();

    assert_eq!(diffs.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(model.seen()[0].1.len(), 2);
    assert_eq!(store.load("s1").await.unwrap().len(), 5);
}

#[tokio::test]
async fn n_messages_yield_n_pairs_in_order() {
    let store = Arc::new(CacheStore::new(Duration::from_secs(60)));
    let chat = ChatOrchestrator::new(
        store.clone(),
        FixedDiff::new(DIFF),
        Arc::new(RecordingModel::default()),
    );

    for i in 0..6 {
        chat.handle_message(&s1(), &format!("q{i}"), Some(&pr42())).await.unwrap();
    }

    let turns = store.load("s1").await.unwrap();
    assert_eq!(turns[0].role, Role::Diffs);
    let rest = &turns[1..];
    assert_eq!(rest.len(), 12);
    for (i, pair) in rest.chunks(2).enumerate() {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[0].text, format!("q{i}"));
        assert_eq!(pair[1].role, Role::Assistant);
    }
}

#[tokio::test]
async fn fetch_failure_then_recovery_attaches_once() {
    let store = Arc::new(MemoryStore::new());
    let model = Arc::new(RecordingModel::default());
    let broken = ChatOrchestrator::new(store.clone(), FixedDiff::failing(), model.clone());

    broken.handle_message(&s1(), "summarize", Some(&pr42())).await.unwrap();
    assert!(!store.exists_turn_with_role("s1", Role::Diffs).await.unwrap());
    assert_eq!(model.seen()[0].0, "summarize");

    let working = ChatOrchestrator::new(store.clone(), FixedDiff::new(DIFF), model.clone());
    working.handle_message(&s1(), "try again", Some(&pr42())).await.unwrap();

    let turns = store.load("s1").await.unwrap();
    assert_eq!(
        turns.iter().map(|t| t.role).collect::<Vec<_>>(),
        vec![Role::User, Role::Assistant, Role::Diffs, Role::User, Role::Assistant]
    );
    assert_eq!(model.seen()[1].0, compose_prompt(DIFF, "try again"));
}

#[tokio::test]
async fn abort_policy_from_config() {
    let mut config = Config::default();
    config.diffs.on_failure = DiffFailurePolicy::Abort;
    config.provider.max_retries = 0;
    let store = Arc::new(MemoryStore::new());
    let chat = ChatOrchestrator::from_config(
        store.clone(),
        FixedDiff::failing(),
        Arc::new(RecordingModel::default()),
        &config,
    );

    let err = chat.handle_message(&s1(), "summarize", Some(&pr42())).await.unwrap_err();

    assert!(matches!(err, ChatError::DiffFetch(_)));
    assert!(err.user_message().starts_with("[Server Error] pull request diff unavailable"));
    assert!(store.load("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn model_failure_leaves_no_turns() {
    let store = Arc::new(MemoryStore::new());
    let model = Arc::new(RecordingModel::default());
    model.fail_next.store(1, Ordering::SeqCst);
    let chat = ChatOrchestrator::new(store.clone(), FixedDiff::failing(), model.clone());

    let err = chat.handle_message(&s1(), "hello", None).await.unwrap_err();
    assert!(matches!(err, ChatError::ModelInvocation(_)));
    assert!(store.load("s1").await.unwrap().is_empty());

    chat.handle_message(&s1(), "hello again", None).await.unwrap();
    assert_eq!(
        summary(&store.load("s1").await.unwrap()),
        vec![
            (Role::User, "hello again".to_string()),
            (Role::Assistant, "model reply 2".to_string()),
        ]
    );
}

#[tokio::test]
async fn store_outage_is_reported_and_model_not_called() {
    let model = Arc::new(RecordingModel::default());
    let chat = ChatOrchestrator::new(Arc::new(BrokenStore), FixedDiff::new(DIFF), model.clone());

    let err = chat.handle_message(&s1(), "hello", Some(&pr42())).await.unwrap_err();

    assert!(matches!(err, ChatError::StoreUnavailable(_)));
    assert_eq!(err.user_message(), "[Server Error] history store unavailable: connection refused");
    assert!(model.seen().is_empty());
}

#[tokio::test]
async fn sessions_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let diffs = FixedDiff::new(DIFF);
    let model = Arc::new(RecordingModel::default());
    let chat = Arc::new(ChatOrchestrator::new(store.clone(), diffs.clone(), model.clone()));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let chat = chat.clone();
        tasks.push(tokio::spawn(async move {
            let key = SessionKey::new("bob", format!("s{i}"));
            chat.handle_message(&key, "summarize", Some(&pr42())).await.unwrap();
            chat.handle_message(&key, "more", None).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.session_count(), 4);
    assert_eq!(diffs.fetches.load(Ordering::SeqCst), 4);
    for i in 0..4 {
        let turns = store.load(&format!("s{i}")).await.unwrap();
        assert_eq!(turns.len(), 5);
        assert_eq!(turns.iter().filter(|t| t.role == Role::Diffs).count(), 1);
    }
}

#[tokio::test]
async fn two_tabs_opening_a_session_attach_one_diff() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<(&str, Arc<dyn SessionHistoryStore>)> = vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("file", Arc::new(FileStore::new(dir.path().to_path_buf()))),
        ("cache", Arc::new(CacheStore::new(Duration::from_secs(60)))),
    ];

    for (name, store) in stores {
        let diffs = FixedDiff::slow(DIFF, Duration::from_millis(50));
        let chat = Arc::new(ChatOrchestrator::new(
            store.clone(),
            diffs.clone(),
            Arc::new(RecordingModel::default()),
        ));

        let tabs: Vec<_> = ["from tab one", "from tab two"]
            .into_iter()
            .map(|message| {
                let chat = chat.clone();
                tokio::spawn(async move {
                    chat.handle_message(&s1(), message, Some(&pr42())).await
                })
            })
            .collect();
        for tab in tabs {
            tab.await.unwrap().unwrap();
        }

        let turns = store.load("s1").await.unwrap();
        assert_eq!(turns.len(), 5, "{name}");
        assert_eq!(
            turns.iter().filter(|t| t.role == Role::Diffs).count(),
            1,
            "{name}"
        );
        assert_eq!(diffs.fetches.load(Ordering::SeqCst), 2, "{name}");
    }
}
