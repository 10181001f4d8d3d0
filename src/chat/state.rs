//! Display state of the chat widget.

use crate::chat::message::MessageLog;

/// Where a send is in its lifecycle.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No send in flight; ready for the next one.
    #[default]
    Idle,
    /// Request issued, nothing accepted yet.
    Sending,
    /// Request accepted, fragments arriving.
    Streaming,
}

/// Everything the conversation view needs to draw itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    /// Whether the chat panel is shown.  Purely cosmetic.
    pub open: bool,
    /// The conversation so far.
    pub messages: MessageLog,
    /// Text typed but not yet submitted.
    pub draft: String,
    /// True from submission until the reply drains or fails.
    pub loading: bool,
    /// Finer-grained view of `loading`.
    pub phase: Phase,
    /// Whether a session exists; fixed for the lifetime of the widget.
    pub session_available: bool,
}

impl ChatState {
    /// Initial state for a widget with or without a session.
    pub fn new(session_available: bool) -> Self {
        Self {
            session_available,
            ..Self::default()
        }
    }

    /// Whether the text input accepts typing.
    pub fn input_enabled(&self) -> bool {
        self.session_available && !self.loading
    }

    /// Whether the submit affordance is active.
    pub fn can_submit(&self) -> bool {
        self.input_enabled() && !self.draft.trim().is_empty()
    }
}
