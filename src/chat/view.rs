//! The conversation view as data.
//!
//! [`render`] turns a [`ChatState`] into a [`ChatView`]: which panel parts
//! are visible, one bubble per message, the typing indicator and the state
//! of the input control.  It is a pure function; drawing is left to a
//! [`Renderer`](crate::chat::Renderer).

use crate::chat::markdown::{self, MarkdownOptions};
use crate::chat::message::{MessageLog, Role};
use crate::chat::state::ChatState;

/// Header of the chat panel.
pub const TITLE: &str = "LTG AI Assistant";

/// Illustration shown above the welcome prompt.
pub const LOGO_PATH: &str = "/assets/LTGlogo.png";

/// Greeting shown while the conversation is empty.
pub const WELCOME_PROMPT: &str =
    "Hi, I'm Adam! Ask me about tutoring, our mission, or how to book a session. ✨";

/// Placeholder of the text input.
pub const INPUT_PLACEHOLDER: &str = "Ask a question...";

/// Horizontal placement of a bubble.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Alignment {
    /// Against the leading edge; the assistant's side.
    Start,
    /// Against the trailing edge; the user's side.
    End,
}

/// Color scheme of a bubble.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tone {
    /// Highlighted; used for the user's own messages.
    Accent,
    /// Muted; used for the assistant.
    Navy,
}

/// What a bubble displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BubbleBody {
    /// Shown verbatim.
    Plain(String),
    /// Interpreted as Markdown.
    Markdown {
        /// The text as received.
        source: String,
        /// The text laid out for display.
        rendered: String,
    },
}

impl BubbleBody {
    /// The text to draw.
    pub fn display_text(&self) -> &str {
        match self {
            BubbleBody::Plain(text) => text,
            BubbleBody::Markdown { rendered, .. } => rendered,
        }
    }
}

/// One message as drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    /// Author of the message.
    pub role: Role,
    /// Which edge the bubble hugs.
    pub alignment: Alignment,
    /// Color scheme.
    pub tone: Tone,
    /// The content.
    pub body: BubbleBody,
}

/// The scrollable area of the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Empty conversation.
    Welcome {
        /// Path of the illustration.
        logo: &'static str,
        /// Greeting below it.
        prompt: &'static str,
    },
    /// One bubble per message, oldest first.
    Conversation {
        /// The drawn messages.
        bubbles: Vec<Bubble>,
        /// Three animated dots below the last bubble.
        typing_indicator: bool,
    },
}

/// The text input and its submit button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputControl {
    /// Hint shown while the input is empty.
    pub placeholder: &'static str,
    /// The current draft.
    pub value: String,
    /// Whether typing is accepted.
    pub input_enabled: bool,
    /// Whether the submit button is clickable.
    pub submit_enabled: bool,
}

/// Icon of the floating toggle button.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ToggleIcon {
    /// Panel closed; clicking opens it.
    Chat,
    /// Panel open; clicking closes it.
    Close,
}

/// Everything drawn for one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    /// Whether the panel is open.  The toggle button is always shown.
    pub panel_visible: bool,
    /// Panel header.
    pub title: &'static str,
    /// Welcome prompt or conversation.
    pub body: Body,
    /// The text input.
    pub input: InputControl,
    /// Icon of the toggle button.
    pub toggle: ToggleIcon,
}

/// Renders `state` with default Markdown options.
pub fn render(state: &ChatState) -> ChatView {
    render_with(state, &MarkdownOptions::default())
}

/// Renders `state`.
pub fn render_with(state: &ChatState, options: &MarkdownOptions) -> ChatView {
    ChatView {
        panel_visible: state.open,
        title: TITLE,
        body: body(state, options),
        input: InputControl {
            placeholder: INPUT_PLACEHOLDER,
            value: state.draft.clone(),
            input_enabled: state.input_enabled(),
            submit_enabled: state.can_submit(),
        },
        toggle: if state.open {
            ToggleIcon::Close
        } else {
            ToggleIcon::Chat
        },
    }
}

fn body(state: &ChatState, options: &MarkdownOptions) -> Body {
    if state.messages.is_empty() && !state.loading {
        return Body::Welcome {
            logo: LOGO_PATH,
            prompt: WELCOME_PROMPT,
        };
    }
    let awaiting = awaiting_first_fragment(&state.messages);
    // The empty placeholder is drawn as the typing indicator instead.
    let shown = match state.messages.last() {
        Some(m) if state.loading && m.role == Role::Model && m.text.is_empty() => {
            state.messages.len() - 1
        }
        _ => state.messages.len(),
    };
    let bubbles = state.messages.as_slice()[..shown]
        .iter()
        .map(|m| match m.role {
            Role::User => Bubble {
                role: Role::User,
                alignment: Alignment::End,
                tone: Tone::Accent,
                body: BubbleBody::Plain(m.text.clone()),
            },
            Role::Model => Bubble {
                role: Role::Model,
                alignment: Alignment::Start,
                tone: Tone::Navy,
                body: BubbleBody::Markdown {
                    source: m.text.clone(),
                    rendered: markdown::render(&m.text, options),
                },
            },
        })
        .collect();
    Body::Conversation {
        bubbles,
        typing_indicator: state.loading && awaiting,
    }
}

/// True when the newest entry is the user's message or an empty reply.
pub(crate) fn awaiting_first_fragment(messages: &MessageLog) -> bool {
    match messages.last() {
        Some(m) => m.role == Role::User || m.text.is_empty(),
        None => true,
    }
}

/// Decides when the view should scroll to its newest content.
///
/// Scrolling is best effort: [`AutoScroll::observe`] reports a change in the
/// message log or in `loading` since the previous observation.
#[derive(Debug, Default)]
pub struct AutoScroll {
    last: Option<(usize, usize, bool)>,
}

impl AutoScroll {
    /// Creates a tracker that scrolls on its first observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` and returns whether the view should scroll.
    pub fn observe(&mut self, state: &ChatState) -> bool {
        let tail = state.messages.last().map(|m| m.text.len()).unwrap_or(0);
        let current = (state.messages.len(), tail, state.loading);
        let changed = self.last != Some(current);
        self.last = Some(current);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Message;

    const PLAIN: MarkdownOptions = MarkdownOptions {
        gfm: true,
        use_color: false,
    };

    fn conversation(view: &ChatView) -> (&[Bubble], bool) {
        match &view.body {
            Body::Conversation {
                bubbles,
                typing_indicator,
            } => (bubbles, *typing_indicator),
            Body::Welcome { .. } => panic!("expected a conversation"),
        }
    }

    #[test]
    fn empty_state_shows_welcome() {
        let view = render_with(&ChatState::new(true), &PLAIN);
        assert_eq!(
            view.body,
            Body::Welcome {
                logo: LOGO_PATH,
                prompt: WELCOME_PROMPT
            }
        );
        assert_eq!(view.title, "LTG AI Assistant");
        assert_eq!(view.input.placeholder, "Ask a question...");
        assert!(!view.panel_visible);
        assert_eq!(view.toggle, ToggleIcon::Chat);
    }

    #[test]
    fn bubbles_follow_roles() {
        let mut state = ChatState::new(true);
        state.open = true;
        state.messages.push(Message::user("**hi**"));
        state.messages.push(Message::model("**Hello!**"));
        let view = render_with(&state, &PLAIN);
        let (bubbles, typing) = conversation(&view);
        assert!(!typing);
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].alignment, Alignment::End);
        assert_eq!(bubbles[0].tone, Tone::Accent);
        assert_eq!(bubbles[0].body.display_text(), "**hi**");
        assert_eq!(bubbles[1].alignment, Alignment::Start);
        assert_eq!(bubbles[1].tone, Tone::Navy);
        assert_eq!(bubbles[1].body.display_text(), "Hello!");
        assert_eq!(view.toggle, ToggleIcon::Close);
    }

    #[test]
    fn typing_indicator_replaces_empty_placeholder() {
        let mut state = ChatState::new(true);
        state.loading = true;
        state.messages.push(Message::user("Hello"));
        let view = render_with(&state, &PLAIN);
        let (bubbles, typing) = conversation(&view);
        assert!(typing);
        assert_eq!(bubbles.len(), 1);

        state.messages.push(Message::model(""));
        let view = render_with(&state, &PLAIN);
        let (bubbles, typing) = conversation(&view);
        assert!(typing);
        assert_eq!(bubbles.len(), 1);

        state.messages.replace_last_model_text("Hi");
        let view = render_with(&state, &PLAIN);
        let (bubbles, typing) = conversation(&view);
        assert!(!typing);
        assert_eq!(bubbles.len(), 2);
    }

    #[test]
    fn input_disabled_while_loading_or_without_session() {
        let mut state = ChatState::new(true);
        state.draft = "Hello".to_string();
        let view = render_with(&state, &PLAIN);
        assert!(view.input.input_enabled);
        assert!(view.input.submit_enabled);
        assert_eq!(view.input.value, "Hello");

        state.loading = true;
        let view = render_with(&state, &PLAIN);
        assert!(!view.input.input_enabled);
        assert!(!view.input.submit_enabled);

        let view = render_with(&ChatState::new(false), &PLAIN);
        assert!(!view.input.input_enabled);
        assert!(!view.input.submit_enabled);
    }

    #[test]
    fn autoscroll_tracks_log_and_loading() {
        let mut scroll = AutoScroll::new();
        let mut state = ChatState::new(true);
        assert!(scroll.observe(&state));
        assert!(!scroll.observe(&state));

        state.draft = "typing".to_string();
        assert!(!scroll.observe(&state));

        state.messages.push(Message::user("Hello"));
        state.loading = true;
        assert!(scroll.observe(&state));

        state.messages.push(Message::model(""));
        assert!(scroll.observe(&state));
        state.messages.replace_last_model_text("Hi");
        assert!(scroll.observe(&state));

        state.loading = false;
        assert!(scroll.observe(&state));
        assert!(!scroll.observe(&state));
    }
}
