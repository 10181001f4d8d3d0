//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction that allows
//! for different output styles. The default implementation writes to stdout
//! with optional ANSI styling: user bubbles in the accent color and pushed
//! to the right edge, assistant bubbles left-aligned with Markdown laid out.
//!
//! [`LiveView`] turns successive [`ChatState`] snapshots into incremental
//! renderer calls so a streaming reply is printed as it grows.

use std::io::{self, Stdout, Write};

use unicode_width::UnicodeWidthStr;

use crate::chat::markdown::{self, MarkdownOptions};
use crate::chat::message::Role;
use crate::chat::state::ChatState;
use crate::chat::view::{Alignment, Body, ChatView, Tone, awaiting_first_fragment};

/// ANSI escape code for bold text.
pub(crate) const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text.
pub(crate) const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text.
pub(crate) const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code for struck-through text.
pub(crate) const ANSI_STRIKE: &str = "\x1b[9m";

/// ANSI escape code to reset all styling.
pub(crate) const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (assistant bubbles, headings).
pub(crate) const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (user bubbles, inline code).
pub(crate) const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Erases the current terminal line.
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Columns user bubbles are right-aligned to.
const PANEL_WIDTH: usize = 72;

/// Name shown beside assistant bubbles.
const ASSISTANT_LABEL: &str = "Adam";

/// Name shown beside user bubbles.
const USER_LABEL: &str = "You";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - In-memory capture for tests
pub trait Renderer: Send {
    /// Draws the whole panel.
    fn draw(&mut self, view: &ChatView);

    /// Called before the first text of a streamed reply.
    fn start_response(&mut self);

    /// Print a chunk of streamed reply text.
    fn print_text(&mut self, text: &str);

    /// Replaces the reply printed so far with `text`.
    ///
    /// Used when a failure swaps a partial reply for the apology.
    fn replace_response(&mut self, text: &str);

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Shows the typing indicator.
    fn show_typing(&mut self);

    /// Removes the typing indicator.
    fn clear_typing(&mut self);

    /// Print Markdown text laid out for the terminal.
    fn print_markdown(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is interrupted by the user.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn markdown_options(&self) -> MarkdownOptions {
        MarkdownOptions {
            gfm: true,
            use_color: self.use_color,
        }
    }

    // Terminal output is best effort; a closed stdout is not worth failing over.
    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn rule(&self, title: &str) -> String {
        let title = format!("── {title} ");
        let fill = PANEL_WIDTH.saturating_sub(title.width());
        format!("{title}{}", "─".repeat(fill))
    }

    fn assistant_prefix(&self) -> String {
        self.styled(ANSI_CYAN, &format!("{ASSISTANT_LABEL}: "))
    }

    fn draw_bubble(&mut self, alignment: Alignment, tone: Tone, text: &str) {
        let (label, style) = match tone {
            Tone::Accent => (USER_LABEL, ANSI_YELLOW),
            Tone::Navy => (ASSISTANT_LABEL, ANSI_CYAN),
        };
        match alignment {
            Alignment::End => {
                for line in text.lines() {
                    let line = format!("{line} :{label}");
                    let pad = PANEL_WIDTH.saturating_sub(line.width());
                    let line = self.styled(style, &line);
                    self.emit(&format!("{}{line}\n", " ".repeat(pad)));
                }
            }
            Alignment::Start => {
                let prefix = self.styled(style, &format!("{label}: "));
                let indent = " ".repeat(label.width() + 2);
                for (i, line) in text.lines().enumerate() {
                    if i == 0 {
                        self.emit(&format!("{prefix}{line}\n"));
                    } else {
                        self.emit(&format!("{indent}{line}\n"));
                    }
                }
            }
        }
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn draw(&mut self, view: &ChatView) {
        if !view.panel_visible {
            return;
        }
        let header = self.rule(view.title);
        let header = self.styled(ANSI_BOLD, &header);
        self.emit(&format!("{header}\n"));
        match &view.body {
            Body::Welcome { logo, prompt } => {
                let logo = self.styled(ANSI_DIM, &format!("[{logo}]"));
                self.emit(&format!("{logo}\n{prompt}\n"));
            }
            Body::Conversation {
                bubbles,
                typing_indicator,
            } => {
                for bubble in bubbles {
                    self.draw_bubble(bubble.alignment, bubble.tone, bubble.body.display_text());
                }
                if *typing_indicator {
                    let prefix = self.assistant_prefix();
                    self.emit(&format!("{prefix}...\n"));
                }
            }
        }
        let footer = if !view.input.input_enabled {
            format!("{} (disabled)", view.input.placeholder)
        } else if view.input.value.is_empty() {
            view.input.placeholder.to_string()
        } else {
            view.input.value.clone()
        };
        let footer = self.styled(ANSI_DIM, &footer);
        let rule = "─".repeat(PANEL_WIDTH);
        self.emit(&format!("{rule}\n{footer}\n"));
        self.flush();
    }

    fn start_response(&mut self) {
        let prefix = self.assistant_prefix();
        self.emit(&prefix);
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        self.emit(text);
        self.flush();
    }

    fn replace_response(&mut self, text: &str) {
        let prefix = self.assistant_prefix();
        self.emit(&format!("\n{prefix}{text}"));
        self.flush();
    }

    fn finish_response(&mut self) {
        self.emit("\n");
        self.flush();
    }

    fn show_typing(&mut self) {
        let prefix = self.assistant_prefix();
        self.emit(&format!("{prefix}..."));
        self.flush();
    }

    fn clear_typing(&mut self) {
        if self.use_color {
            self.emit(CLEAR_LINE);
        } else {
            self.emit("\n");
        }
        self.flush();
    }

    fn print_markdown(&mut self, text: &str) {
        let rendered = markdown::render(text, &self.markdown_options());
        self.emit(&format!("{rendered}\n"));
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.emit(&format!("{line}\n"));
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.emit(&format!("{info}\n"));
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.emit("[interrupted]\n");
        self.flush();
    }
}

#[derive(Debug)]
struct Streaming {
    index: usize,
    shown: String,
}

/// Prints state changes incrementally while the panel is open.
///
/// Nothing is printed while the panel is closed; the state keeps changing
/// and the caller redraws it in full (then calls [`LiveView::sync`]) when the
/// panel is reopened.  User messages are not echoed, since the input line
/// already shows them.
#[derive(Debug, Default)]
pub struct LiveView {
    printed: usize,
    streaming: Option<Streaming>,
    typing: bool,
}

impl LiveView {
    /// Creates a view that has printed nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks everything in `state` as already on screen.
    pub fn sync(&mut self, state: &ChatState) {
        let messages = state.messages.as_slice();
        self.typing = state.loading && awaiting_first_fragment(&state.messages);
        self.streaming = None;
        self.printed = messages.len();
        if state.loading
            && let Some(last) = messages.last()
            && last.role == Role::Model
        {
            self.printed -= 1;
            self.streaming = Some(Streaming {
                index: messages.len() - 1,
                shown: last.text.clone(),
            });
        }
    }

    /// Prints whatever changed since the previous call.
    pub fn update(&mut self, state: &ChatState, renderer: &mut dyn Renderer) {
        if !state.open {
            return;
        }
        let want_typing = state.loading && awaiting_first_fragment(&state.messages);
        if self.typing && !want_typing {
            renderer.clear_typing();
            self.typing = false;
        }

        let messages = state.messages.as_slice();
        for index in self.printed..messages.len() {
            let message = &messages[index];
            if message.role == Role::User {
                self.printed = index + 1;
                continue;
            }
            let shown = match self.streaming.take() {
                Some(streaming) if streaming.index == index => streaming.shown,
                _ => String::new(),
            };
            if message.text != shown {
                if shown.is_empty() {
                    renderer.start_response();
                    renderer.print_text(&message.text);
                } else if let Some(delta) = message.text.strip_prefix(shown.as_str()) {
                    renderer.print_text(delta);
                } else {
                    renderer.replace_response(&message.text);
                }
            }
            let is_last = index + 1 == messages.len();
            if is_last && state.loading {
                self.streaming = Some(Streaming {
                    index,
                    shown: message.text.clone(),
                });
            } else {
                if !message.text.is_empty() {
                    renderer.finish_response();
                }
                self.printed = index + 1;
            }
        }

        if want_typing && !self.typing {
            renderer.show_typing();
            self.typing = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Message;
    use crate::chat::view;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    fn plain() -> PlainTextRenderer<Vec<u8>> {
        PlainTextRenderer::with_writer(Vec::new(), false)
    }

    fn output(renderer: PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn draws_welcome_panel() {
        let mut state = ChatState::new(true);
        state.open = true;
        let mut renderer = plain();
        renderer.draw(&view::render(&state));
        let out = output(renderer);
        assert!(out.starts_with("── LTG AI Assistant "));
        assert!(out.contains("[/assets/LTGlogo.png]"));
        assert!(out.contains("Hi, I'm Adam!"));
        assert!(out.ends_with("Ask a question...\n"));
    }

    #[test]
    fn closed_panel_draws_nothing() {
        let mut renderer = plain();
        renderer.draw(&view::render(&ChatState::new(true)));
        assert!(output(renderer).is_empty());
    }

    #[test]
    fn draws_conversation() {
        let mut state = ChatState::new(true);
        state.open = true;
        state.messages.push(Message::user("Hello"));
        state.messages.push(Message::model("Hi **there**!"));
        let mut renderer = plain();
        renderer.draw(&view::render_with(
            &state,
            &MarkdownOptions {
                gfm: true,
                use_color: false,
            },
        ));
        let out = output(renderer);
        let user_line = out.lines().find(|l| l.ends_with("Hello :You")).unwrap();
        assert_eq!(user_line.width(), PANEL_WIDTH);
        assert!(out.contains("Adam: Hi there!\n"));
    }

    #[test]
    fn unavailable_input_is_marked() {
        let mut state = ChatState::new(false);
        state.open = true;
        let mut renderer = plain();
        renderer.draw(&view::render(&state));
        assert!(output(renderer).ends_with("Ask a question... (disabled)\n"));
    }

    fn streamed(states: &[ChatState]) -> String {
        let mut renderer = plain();
        let mut live = LiveView::new();
        for state in states {
            live.update(state, &mut renderer);
        }
        output(renderer)
    }

    fn state(messages: &[Message], loading: bool) -> ChatState {
        let mut state = ChatState::new(true);
        state.open = true;
        state.loading = loading;
        for message in messages {
            state.messages.push(message.clone());
        }
        state
    }

    #[test]
    fn live_view_streams_deltas() {
        let user = Message::user("Hello");
        let out = streamed(&[
            state(&[user.clone()], true),
            state(&[user.clone(), Message::model("")], true),
            state(&[user.clone(), Message::model("Hi")], true),
            state(&[user.clone(), Message::model("Hi there!")], true),
            state(&[user.clone(), Message::model("Hi there!")], false),
        ]);
        assert_eq!(out, "Adam: ...\nAdam: Hi there!\n");
    }

    #[test]
    fn live_view_replaces_partial_reply_with_apology() {
        let user = Message::user("Hello");
        let out = streamed(&[
            state(&[user.clone(), Message::model("Part")], true),
            state(&[user.clone(), Message::model("Sorry")], false),
        ]);
        assert_eq!(out, "Adam: Part\nAdam: Sorry\n");
    }

    #[test]
    fn live_view_is_silent_while_closed() {
        let user = Message::user("Hello");
        let mut hidden = state(&[user.clone(), Message::model("Hi")], true);
        hidden.open = false;
        let out = streamed(&[hidden, state(&[user.clone(), Message::model("Hi!")], false)]);
        assert_eq!(out, "Adam: Hi!\n");
    }

    #[test]
    fn sync_skips_what_was_drawn() {
        let user = Message::user("Hello");
        let mut renderer = plain();
        let mut live = LiveView::new();
        live.sync(&state(&[user.clone(), Message::model("Hi")], true));
        live.update(&state(&[user.clone(), Message::model("Hi there")], true), &mut renderer);
        live.update(&state(&[user, Message::model("Hi there")], false), &mut renderer);
        assert_eq!(output(renderer), " there\n");
    }
}
