//! The seam between the chat session and the hosted chat API.
//!
//! A [`ChatBackend`] creates conversations; a [`ChatHandle`] is one
//! conversation bound to a fixed system instruction.  Sending a message on a
//! handle yields a [`FragmentStream`] of text pieces that concatenate, in
//! arrival order, into the model's reply.
//!
//! [`Gemini`] implements the backend.  Like the hosted SDK's chat object,
//! [`GeminiChat`] keeps the conversation history on the client and replays
//! it with every request; a turn is committed to history only once its
//! stream drains without error.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;

use crate::client::Gemini;
use crate::error::{Error, Result};
use crate::observability::STREAM_FRAGMENTS;
use crate::types::{Content, GenerateContentRequest, GenerateContentResponse};

/// A stream of response text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One conversation with a chat API.
#[async_trait::async_trait]
pub trait ChatHandle: Send + Sync {
    /// Sends `message` and returns the streamed reply.
    ///
    /// An `Err` means the request was not accepted; errors after acceptance
    /// arrive as items of the stream.
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream>;

    /// The committed conversation history, oldest first.
    fn history(&self) -> Vec<Content>;
}

/// Something that can open conversations.
pub trait ChatBackend: Send + Sync {
    /// Opens a conversation bound to `system_instruction`.
    fn create_chat(&self, system_instruction: &str) -> Result<Arc<dyn ChatHandle>>;
}

impl ChatBackend for Gemini {
    fn create_chat(&self, system_instruction: &str) -> Result<Arc<dyn ChatHandle>> {
        if system_instruction.trim().is_empty() {
            return Err(Error::validation(
                "system instruction must not be empty",
                Some("system_instruction".to_string()),
            ));
        }
        log::info!("created {} chat", self.model());
        Ok(Arc::new(GeminiChat::new(self.clone(), system_instruction)))
    }
}

/// A Gemini conversation with client-side history.
pub struct GeminiChat {
    client: Gemini,
    system_instruction: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiChat {
    /// Creates an empty conversation.
    pub fn new(client: Gemini, system_instruction: impl Into<String>) -> Self {
        Self {
            client,
            system_instruction: system_instruction.into(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The system instruction this conversation is bound to.
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    fn request_for(&self, message: &str) -> GenerateContentRequest {
        let mut contents = lock_history(&self.history).clone();
        contents.push(Content::user(message));
        GenerateContentRequest::new(contents)
            .with_system_instruction(self.system_instruction.clone())
            .with_generation_config(self.client.generation_config().clone())
    }
}

#[async_trait::async_trait]
impl ChatHandle for GeminiChat {
    async fn send_message_stream(&self, message: &str) -> Result<FragmentStream> {
        let request = self.request_for(message);
        let chunks = self.client.stream_generate_content(&request).await?;
        Ok(Box::pin(TurnStream::new(
            Box::pin(chunks),
            Content::user(message),
            Arc::clone(&self.history),
        )))
    }

    fn history(&self) -> Vec<Content> {
        lock_history(&self.history).clone()
    }
}

fn lock_history(history: &Mutex<Vec<Content>>) -> std::sync::MutexGuard<'_, Vec<Content>> {
    // History is only ever replaced wholesale, so a poisoned guard is still consistent.
    history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Turns response chunks into text fragments and commits the turn to the
/// conversation history once the stream drains cleanly.
pub(crate) struct TurnStream {
    inner: ChunkStream,
    user_turn: Option<Content>,
    reply: String,
    failed: bool,
    history: Arc<Mutex<Vec<Content>>>,
}

impl TurnStream {
    pub(crate) fn new(
        inner: ChunkStream,
        user_turn: Content,
        history: Arc<Mutex<Vec<Content>>>,
    ) -> Self {
        Self {
            inner,
            user_turn: Some(user_turn),
            reply: String::new(),
            failed: false,
            history,
        }
    }

    /// Extracts the fragment carried by a chunk, if any.
    fn fragment(chunk: &GenerateContentResponse) -> Result<Option<String>> {
        if let Some(reason) = chunk.block_reason() {
            return Err(Error::blocked(
                "the prompt was blocked",
                Some(reason.to_string()),
            ));
        }
        let text = chunk.text().filter(|t| !t.is_empty());
        if text.is_none()
            && let Some(reason) = chunk.finish_reason().filter(|r| r.is_blocked())
        {
            return Err(Error::blocked(
                "the response was blocked",
                Some(reason.to_string()),
            ));
        }
        Ok(text)
    }

    fn commit(&mut self) {
        let Some(user_turn) = self.user_turn.take() else {
            return;
        };
        if self.failed || self.reply.is_empty() {
            return;
        }
        let mut history = lock_history(&self.history);
        history.push(user_turn);
        history.push(Content::model(std::mem::take(&mut self.reply)));
    }
}

impl Stream for TurnStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.failed {
                return Poll::Ready(None);
            }
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => match Self::fragment(&chunk) {
                    Ok(Some(text)) => {
                        STREAM_FRAGMENTS.click();
                        self.reply.push_str(&text);
                        return Poll::Ready(Some(Ok(text)));
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        self.failed = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.failed = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.commit();
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
