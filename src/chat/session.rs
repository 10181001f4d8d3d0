//! Core chat session management.
//!
//! This module provides the [`ChatSession`] struct which owns the one
//! conversation the widget holds against the chat API, turns submitted text
//! into requests, and folds the streamed reply into the display state.
//!
//! A session is created once, by [`ChatSession::initialize`] or
//! [`ChatSession::with_backend`], and is never recreated: if no credential
//! (or no working backend) is available at that moment, the widget stays in
//! its degraded, send-disabled mode for its whole lifetime.
//!
//! All display state lives in a [`watch`] channel.  Every transition
//! publishes a new [`ChatState`]; viewers hold snapshots that later updates
//! never alter.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatBackend, ChatHandle};
use crate::chat::config::ChatConfig;
use crate::chat::message::{Message, Role};
use crate::chat::state::{ChatState, Phase};
use crate::client::Gemini;
use crate::error::{Error, Result};
use crate::observability::{
    CHAT_FAILURES, CHAT_REJECTED, CHAT_SENDS, CHAT_TIMEOUTS, CHAT_TURN_DURATION,
};
use crate::types::Content;

/// Text shown in place of a reply that could not be produced.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Why a send was refused without touching the state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The text was empty after trimming.
    EmptyInput,
    /// No session was created at startup.
    NoSession,
    /// Another send is still in flight.
    Busy,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyInput => write!(f, "nothing to send"),
            RejectReason::NoSession => write!(f, "chat is unavailable"),
            RejectReason::Busy => write!(f, "a reply is still streaming"),
        }
    }
}

/// How a call to [`ChatSession::send`] ended.
#[derive(Debug)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed {
        /// Number of fragments received.
        fragments: usize,
    },
    /// The turn failed and the apology was shown in place of the reply.
    Failed(Error),
    /// Nothing happened.
    Rejected(RejectReason),
}

impl SendOutcome {
    /// True for [`SendOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed { .. })
    }

    /// True for [`SendOutcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, SendOutcome::Failed(_))
    }

    /// True for [`SendOutcome::Rejected`].
    pub fn is_rejected(&self) -> bool {
        matches!(self, SendOutcome::Rejected(_))
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Whether a session exists.
    pub session_available: bool,
    /// The number of messages in the conversation log.
    pub message_count: usize,
    /// Turns whose reply streamed to completion.
    pub turns_completed: u64,
    /// Turns that ended with the apology.
    pub turns_failed: u64,
    /// Sends refused before any state change.
    pub sends_rejected: u64,
    /// Fragments received across all turns.
    pub fragments_received: u64,
    /// The idle timeout applied to the reply stream.
    pub stream_timeout: Option<Duration>,
}

/// A chat session that manages the conversation and its display state.
pub struct ChatSession {
    chat: Option<Arc<dyn ChatHandle>>,
    system_instruction: String,
    stream_timeout: Option<Duration>,
    state: watch::Sender<ChatState>,
    turns_completed: AtomicU64,
    turns_failed: AtomicU64,
    sends_rejected: AtomicU64,
    fragments_received: AtomicU64,
}

impl ChatSession {
    /// Creates the session against the Gemini API.
    ///
    /// `credential` is the API key read once at startup.  When it is absent,
    /// or the client cannot be built, the session is created without a
    /// conversation and every send is rejected.
    pub fn initialize(credential: Option<String>, config: &ChatConfig) -> Self {
        let Some(api_key) = credential else {
            log::warn!("no API key configured; chat is disabled");
            return Self::with_backend(None, config);
        };
        match Gemini::with_options(Some(api_key), config.base_url.clone(), None) {
            Ok(client) => {
                let client = client
                    .with_model(config.model.clone())
                    .with_generation_config(config.generation.clone());
                Self::with_backend(Some(&client as &dyn ChatBackend), config)
            }
            Err(err) => {
                log::error!("failed to build the chat client: {err}");
                Self::with_backend(None, config)
            }
        }
    }

    /// Creates the session against an arbitrary backend.
    pub fn with_backend(backend: Option<&dyn ChatBackend>, config: &ChatConfig) -> Self {
        let chat = backend.and_then(|backend| {
            match backend.create_chat(&config.system_instruction) {
                Ok(chat) => Some(chat),
                Err(err) => {
                    log::error!("failed to create the chat session: {err}");
                    None
                }
            }
        });
        let (state, _) = watch::channel(ChatState::new(chat.is_some()));
        Self {
            chat,
            system_instruction: config.system_instruction.clone(),
            stream_timeout: config.stream_timeout,
            state,
            turns_completed: AtomicU64::new(0),
            turns_failed: AtomicU64::new(0),
            sends_rejected: AtomicU64::new(0),
            fragments_received: AtomicU64::new(0),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Whether a session was created.
    pub fn has_session(&self) -> bool {
        self.chat.is_some()
    }

    /// The system instruction the session is bound to.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// The conversation as committed by the backend.
    pub fn history(&self) -> Vec<Content> {
        self.chat.as_ref().map(|c| c.history()).unwrap_or_default()
    }

    /// Replaces the draft.  Ignored while input is disabled.
    pub fn set_draft(&self, text: &str) -> bool {
        self.state.send_if_modified(|state| {
            if !state.input_enabled() || state.draft == text {
                return false;
            }
            state.draft = text.to_string();
            true
        })
    }

    /// Shows or hides the chat panel.
    pub fn set_open(&self, open: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.open != open;
            state.open = open;
            changed
        });
    }

    /// Flips panel visibility and returns the new value.
    pub fn toggle_open(&self) -> bool {
        let mut open = false;
        self.state.send_modify(|state| {
            state.open = !state.open;
            open = state.open;
        });
        open
    }

    /// Returns aggregated statistics.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_available: self.has_session(),
            message_count: self.state.borrow().messages.len(),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            sends_rejected: self.sends_rejected.load(Ordering::Relaxed),
            fragments_received: self.fragments_received.load(Ordering::Relaxed),
            stream_timeout: self.stream_timeout,
        }
    }

    /// Sends the current draft.
    pub async fn submit(&self) -> SendOutcome {
        self.submit_with_cancel(&CancellationToken::new()).await
    }

    /// Sends the current draft, aborting when `cancel` fires.
    pub async fn submit_with_cancel(&self, cancel: &CancellationToken) -> SendOutcome {
        let draft = self.state.borrow().draft.clone();
        self.send_with_cancel(&draft, cancel).await
    }

    /// Sends `text` and streams the reply into the message log.
    pub async fn send(&self, text: &str) -> SendOutcome {
        self.send_with_cancel(text, &CancellationToken::new()).await
    }

    /// Sends `text`, aborting the turn when `cancel` fires.
    ///
    /// The user message is appended, the draft cleared and `loading` set in
    /// one state transition.  Once the backend accepts the request an empty
    /// model message is appended and grows with every fragment.  Any failure
    /// after the user message was appended, including cancellation and the
    /// idle timeout, leaves exactly one model message for the turn holding
    /// [`APOLOGY`].  `loading` is cleared when the turn ends either way,
    /// including when the returned future is dropped before it completes.
    pub async fn send_with_cancel(&self, text: &str, cancel: &CancellationToken) -> SendOutcome {
        let chat = match self.begin_turn(text) {
            Ok(chat) => chat,
            Err(reason) => {
                CHAT_REJECTED.click();
                self.sends_rejected.fetch_add(1, Ordering::Relaxed);
                log::debug!("send rejected: {reason}");
                return SendOutcome::Rejected(reason);
            }
        };
        CHAT_SENDS.click();
        let started = Instant::now();
        let guard = TurnGuard { session: self };
        let result = self.stream_reply(chat.as_ref(), text, cancel).await;
        std::mem::forget(guard);
        let outcome = match result {
            Ok(fragments) => {
                self.turns_completed.fetch_add(1, Ordering::Relaxed);
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.phase = Phase::Idle;
                });
                log::debug!("reply complete: {fragments} fragments");
                SendOutcome::Completed { fragments }
            }
            Err(err) => {
                self.fail_turn(&err);
                SendOutcome::Failed(err)
            }
        };
        CHAT_TURN_DURATION.add(started.elapsed().as_secs_f64());
        outcome
    }

    /// Checks the preconditions and, if they hold, starts the turn.
    fn begin_turn(&self, text: &str) -> std::result::Result<Arc<dyn ChatHandle>, RejectReason> {
        if text.trim().is_empty() {
            return Err(RejectReason::EmptyInput);
        }
        let Some(chat) = self.chat.as_ref() else {
            return Err(RejectReason::NoSession);
        };
        let mut busy = false;
        self.state.send_if_modified(|state| {
            if state.loading {
                busy = true;
                return false;
            }
            state.messages.push(Message::user(text));
            state.draft.clear();
            state.loading = true;
            state.phase = Phase::Sending;
            true
        });
        if busy {
            return Err(RejectReason::Busy);
        }
        Ok(Arc::clone(chat))
    }

    async fn stream_reply(
        &self,
        chat: &dyn ChatHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut stream = self
            .bounded(chat.send_message_stream(text), cancel, "the reply")
            .await?;
        self.state.send_modify(|state| {
            state.messages.push(Message::model(""));
            state.phase = Phase::Streaming;
        });

        let mut reply = String::new();
        let mut fragments = 0;
        while let Some(fragment) = self
            .bounded(async { Ok(stream.next().await) }, cancel, "the next fragment")
            .await?
        {
            let fragment = fragment?;
            fragments += 1;
            self.fragments_received.fetch_add(1, Ordering::Relaxed);
            reply.push_str(&fragment);
            self.state.send_modify(|state| {
                state.messages.replace_last_model_text(reply.as_str());
            });
        }
        Ok(fragments)
    }

    /// Awaits `fut` under the idle timeout, giving up when `cancel` fires.
    async fn bounded<T, F>(&self, fut: F, cancel: &CancellationToken, what: &str) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limited = async {
            match self.stream_timeout {
                Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                    Error::timeout(
                        format!("timed out waiting for {what}"),
                        Some(limit.as_secs_f64()),
                    )
                })?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::abort(format!("cancelled while waiting for {what}"))),
            result = limited => result,
        }
    }

    fn fail_turn(&self, err: &Error) {
        CHAT_FAILURES.click();
        if err.is_timeout() {
            CHAT_TIMEOUTS.click();
        }
        self.turns_failed.fetch_add(1, Ordering::Relaxed);
        log::error!("chat API error: {err}");
        self.state.send_modify(|state| {
            let has_placeholder = state.messages.last().map(|m| m.role) == Some(Role::Model);
            if has_placeholder {
                state.messages.replace_last_model_text(APOLOGY);
            } else {
                state.messages.push(Message::model(APOLOGY));
            }
            state.loading = false;
            state.phase = Phase::Idle;
        });
    }
}

/// Ends the turn with the apology if the send future is dropped mid-turn.
///
/// Forgotten once the turn ends normally.
struct TurnGuard<'a> {
    session: &'a ChatSession,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session
            .fail_turn(&Error::abort("the send was dropped before the reply finished"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FragmentStream;
    use futures::channel::mpsc;
    use futures::stream;
    use std::sync::Mutex;

    enum Script {
        Fragments(Vec<Result<String>>),
        Refuse,
        Stall,
        Channel(mpsc::UnboundedReceiver<Result<String>>),
    }

    struct ScriptedChat {
        script: Mutex<Option<Script>>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ChatHandle for ScriptedChat {
        async fn send_message_stream(&self, message: &str) -> Result<FragmentStream> {
            self.sent.lock().unwrap().push(message.to_string());
            match self.script.lock().unwrap().take() {
                Some(Script::Fragments(items)) => Ok(Box::pin(stream::iter(items))),
                Some(Script::Refuse) | None => Err(Error::service_unavailable("overloaded", None)),
                Some(Script::Stall) => Ok(Box::pin(stream::pending::<Result<String>>())),
                Some(Script::Channel(rx)) => Ok(Box::pin(rx)),
            }
        }

        fn history(&self) -> Vec<Content> {
            Vec::new()
        }
    }

    struct ScriptedBackend {
        chat: Arc<ScriptedChat>,
    }

    impl ScriptedBackend {
        fn new(script: Script) -> Self {
            Self {
                chat: Arc::new(ScriptedChat {
                    script: Mutex::new(Some(script)),
                    sent: Mutex::new(Vec::new()),
                }),
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn create_chat(&self, _: &str) -> Result<Arc<dyn ChatHandle>> {
            Ok(self.chat.clone())
        }
    }

    struct BrokenBackend;

    impl ChatBackend for BrokenBackend {
        fn create_chat(&self, _: &str) -> Result<Arc<dyn ChatHandle>> {
            Err(Error::validation("no", None))
        }
    }

    fn session(script: Script) -> ChatSession {
        let backend = ScriptedBackend::new(script);
        ChatSession::with_backend(Some(&backend as &dyn ChatBackend), &ChatConfig::new())
    }

    fn texts(state: &ChatState) -> Vec<(Role, String)> {
        state
            .messages
            .iter()
            .map(|m| (m.role, m.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn fragments_accumulate_into_one_reply() {
        let session = session(Script::Fragments(vec![
            Ok("Hi".to_string()),
            Ok(" there!".to_string()),
        ]));
        let outcome = session.send("Hello").await;
        assert!(matches!(outcome, SendOutcome::Completed { fragments: 2 }));

        let state = session.state();
        assert_eq!(
            texts(&state),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Model, "Hi there!".to_string())
            ]
        );
        assert!(!state.loading);
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn refused_request_appends_apology() {
        let session = session(Script::Refuse);
        let outcome = session.send("Hello").await;
        assert!(outcome.is_failed());

        let state = session.state();
        assert_eq!(
            texts(&state),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Model, APOLOGY.to_string())
            ]
        );
        assert!(!state.loading);
        assert_eq!(session.stats().turns_failed, 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_replaces_placeholder() {
        let session = session(Script::Fragments(vec![
            Ok("Partial".to_string()),
            Err(Error::streaming("connection reset", None)),
        ]));
        assert!(session.send("Hello").await.is_failed());

        let state = session.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages.last().unwrap().text, APOLOGY);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_side_effects() {
        let session = session(Script::Fragments(vec![]));
        let before = session.state();
        let outcome = session.send("  \n ").await;
        assert!(matches!(
            outcome,
            SendOutcome::Rejected(RejectReason::EmptyInput)
        ));
        assert_eq!(session.state(), before);
    }

    #[tokio::test]
    async fn no_backend_means_no_session() {
        let session = ChatSession::with_backend(None, &ChatConfig::new());
        assert!(!session.has_session());
        assert!(!session.set_draft("Hello"));
        let outcome = session.send("Hello").await;
        assert!(matches!(
            outcome,
            SendOutcome::Rejected(RejectReason::NoSession)
        ));
        assert!(session.state().messages.is_empty());
        assert!(!session.state().input_enabled());
    }

    #[tokio::test]
    async fn failing_backend_degrades() {
        let session =
            ChatSession::with_backend(Some(&BrokenBackend as &dyn ChatBackend), &ChatConfig::new());
        assert!(!session.has_session());
        assert!(session.send("Hello").await.is_rejected());
    }

    #[test]
    fn missing_credential_degrades() {
        let session = ChatSession::initialize(None, &ChatConfig::new());
        assert!(!session.has_session());
        assert!(!session.state().session_available);
    }

    #[tokio::test]
    async fn second_send_while_loading_is_rejected() {
        let (tx, rx) = mpsc::unbounded();
        let session = Arc::new(session(Script::Channel(rx)));
        let mut updates = session.subscribe();

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send("Hello").await })
        };
        updates
            .wait_for(|state| state.phase == Phase::Streaming)
            .await
            .unwrap();

        let outcome = session.send("?").await;
        assert!(matches!(outcome, SendOutcome::Rejected(RejectReason::Busy)));
        assert_eq!(session.state().messages.len(), 2);

        tx.unbounded_send(Ok("Hi".to_string())).unwrap();
        drop(tx);
        assert!(running.await.unwrap().is_completed());
        assert_eq!(session.state().messages.len(), 2);
        assert_eq!(session.stats().sends_rejected, 1);
    }

    #[tokio::test]
    async fn submit_sends_and_clears_draft() {
        let backend = ScriptedBackend::new(Script::Fragments(vec![Ok("Sure.".to_string())]));
        let session =
            ChatSession::with_backend(Some(&backend as &dyn ChatBackend), &ChatConfig::new());
        assert!(session.set_draft("How do I book?"));
        assert!(session.state().can_submit());

        assert!(session.submit().await.is_completed());
        let state = session.state();
        assert!(state.draft.is_empty());
        assert_eq!(state.messages.get(0).unwrap().text, "How do I book?");
        assert_eq!(
            backend.chat.sent.lock().unwrap().as_slice(),
            &["How do I book?".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let config = ChatConfig::new().with_stream_timeout(Some(Duration::from_secs(5)));
        let backend = ScriptedBackend::new(Script::Stall);
        let session = ChatSession::with_backend(Some(&backend as &dyn ChatBackend), &config);
        let outcome = session.send("Hello").await;
        let SendOutcome::Failed(err) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(err.is_timeout());

        let state = session.state();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages.last().unwrap().text, APOLOGY);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn cancellation_aborts_turn() {
        let session = session(Script::Stall);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = session.send_with_cancel("Hello", &cancel).await;
        let SendOutcome::Failed(err) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(err.is_abort());
        assert!(!session.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_send_ends_the_turn() {
        let backend = ScriptedBackend::new(Script::Stall);
        let session =
            ChatSession::with_backend(Some(&backend as &dyn ChatBackend), &ChatConfig::new());
        let abandoned = tokio::time::timeout(Duration::from_millis(1), session.send("Hi")).await;
        assert!(abandoned.is_err());

        let state = session.state();
        assert!(!state.loading);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(
            texts(&state),
            vec![
                (Role::User, "Hi".to_string()),
                (Role::Model, APOLOGY.to_string())
            ]
        );
        assert_eq!(session.stats().turns_failed, 1);

        let outcome = session.send("again").await;
        assert!(!outcome.is_rejected(), "got {outcome:?}");
        assert!(!session.state().loading);
    }

    #[tokio::test]
    async fn aborted_task_ends_the_turn() {
        let (_tx, rx) = mpsc::unbounded();
        let session = Arc::new(session(Script::Channel(rx)));
        let mut updates = session.subscribe();
        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send("Hello").await })
        };
        updates
            .wait_for(|state| state.phase == Phase::Streaming)
            .await
            .unwrap();
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        let state = session.state();
        assert!(!state.loading);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages.last().unwrap().text, APOLOGY);
    }

    #[test]
    fn toggle_only_changes_visibility() {
        let session = ChatSession::with_backend(None, &ChatConfig::new());
        assert!(session.toggle_open());
        assert!(session.state().open);
        assert!(!session.toggle_open());
        session.set_open(true);
        assert!(session.state().open);
        assert!(session.state().messages.is_empty());
    }
}
