//! Configuration types for the chat widget.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the session and the binary run with.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::{API_KEY_ENV_VARS, credential_from_env};
use crate::error::{Error, Result};
use crate::types::{GenerationConfig, Model};

/// Default bound on each wait for the next piece of a reply.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// The persona every conversation is bound to unless overridden.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are Adam, the friendly AI assistant of LTG, a student-run online tutoring service. \
Tutoring costs £10 / hour, and 100% of all proceeds are donated, so every session also helps \
another student.

Help visitors with:
- questions about the subjects and grade levels we tutor;
- how tutoring works: sessions are one-on-one over Zoom with a qualified tutor;
- our mission of making quality tutoring accessible;
- booking: visitors fill out the booking form on the Book a Lesson page, we match them with a \
tutor within 48 hours, and the tutor emails them to schedule the first session.

Keep answers short, warm and encouraging. Use Markdown lists or tables when they make an answer \
clearer. If you do not know something about LTG (such as a tutor's schedule), say so and suggest \
using the booking form or contacting the team rather than guessing. Do not do students' graded \
work for them; offer to explain the concepts instead.";

/// Command-line arguments for the tutorchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gemini-2.5-flash)", "MODEL")]
    pub model: Option<String>,

    /// System instruction text.
    #[arrrg(optional, "System instruction (default: built-in tutoring persona)", "TEXT")]
    pub system: Option<String>,

    /// File holding the system instruction.
    #[arrrg(optional, "Read the system instruction from a file", "PATH")]
    pub system_file: Option<String>,

    /// Environment variable holding the API key.
    #[arrrg(optional, "Env var holding the API key (default: GEMINI_API_KEY, then API_KEY)", "VAR")]
    pub api_key_env: Option<String>,

    /// Seconds to wait for each piece of a reply.
    #[arrrg(optional, "Seconds to wait for each piece of a reply; 0 waits forever (default: 60)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// API base URL.
    #[arrrg(optional, "API base URL", "URL")]
    pub base_url: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: model default)", "TOKENS")]
    pub max_output_tokens: Option<u32>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Persona instruction fixed at session creation.
    pub system_instruction: String,

    /// Environment variables searched, in order, for the API key.
    pub api_key_env: Vec<String>,

    /// Bound on the wait for the first response and for every later
    /// fragment.  `None` waits forever.
    pub stream_timeout: Option<Duration>,

    /// API base URL override.
    pub base_url: Option<String>,

    /// Sampling controls.
    pub generation: GenerationConfig,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gemini-2.5-flash
    /// - System instruction: the built-in tutoring persona
    /// - API key: `GEMINI_API_KEY`, then `API_KEY`
    /// - Stream timeout: 60 seconds
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            api_key_env: API_KEY_ENV_VARS.iter().map(|v| v.to_string()).collect(),
            stream_timeout: Some(DEFAULT_STREAM_TIMEOUT),
            base_url: None,
            generation: GenerationConfig::default(),
            use_color: true,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Reads the API key from `var` only.
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = vec![var.into()];
        self
    }

    /// Sets the stream timeout; `None` disables it.
    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.generation.max_output_tokens = max_output_tokens;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Reads the credential from the configured environment variables.
    ///
    /// Called once at startup; a missing key is not an error.
    pub fn credential(&self) -> Option<String> {
        let vars: Vec<&str> = self.api_key_env.iter().map(String::as_str).collect();
        credential_from_env(&vars)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new().with_max_output_tokens(args.max_output_tokens);

        if let Some(model) = args.model {
            let Ok(model) = model.parse::<Model>();
            config = config.with_model(model);
        }

        match (args.system, args.system_file) {
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "--system and --system-file are mutually exclusive",
                    Some("system".to_string()),
                ));
            }
            (Some(text), None) => config = config.with_system_instruction(text),
            (None, Some(path)) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path).map_err(|err| {
                    Error::io(
                        format!("failed to read system instruction {}", path.display()),
                        err,
                    )
                })?;
                config = config.with_system_instruction(text.trim());
            }
            (None, None) => {}
        }
        if config.system_instruction.trim().is_empty() {
            return Err(Error::validation(
                "system instruction must not be empty",
                Some("system".to_string()),
            ));
        }

        if let Some(var) = args.api_key_env {
            config = config.with_api_key_env(var);
        }
        if let Some(secs) = args.timeout_secs {
            config = config.with_stream_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(base_url) = args.base_url {
            config = config.with_base_url(base_url);
        }
        if args.no_color {
            config = config.without_color();
        }
        Ok(config)
    }
}
