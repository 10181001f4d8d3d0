//! Chat widget module for talking to the tutoring assistant.
//!
//! This module provides the streaming chat session and the conversation
//! view built on top of the [`backend`](crate::backend) seam. It supports:
//!
//! - Streaming replies folded into the message log as they arrive
//! - A pure view model with Markdown-rendered assistant bubbles
//! - A terminal renderer with optional ANSI styling
//! - Slash commands for panel control
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: the session manager and its state machine
//! - [`view`]: state to [`ChatView`] projection
//! - [`markdown`]: Markdown layout for the terminal
//! - [`commands`]: Slash command parsing and handling

mod commands;
pub mod config;
pub mod markdown;
mod message;
mod render;
mod session;
mod state;
pub mod view;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_STREAM_TIMEOUT, DEFAULT_SYSTEM_INSTRUCTION};
pub use markdown::MarkdownOptions;
pub use message::{Message, MessageLog, Role};
pub use render::{LiveView, PlainTextRenderer, Renderer};
pub use session::{APOLOGY, ChatSession, RejectReason, SendOutcome, SessionStats};
pub use state::{ChatState, Phase};
pub use view::{AutoScroll, ChatView};
