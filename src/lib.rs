// Public modules
pub mod backend;
pub mod booking;
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod sse;
pub mod types;

// Re-exports
pub use backend::{ChatBackend, ChatHandle, FragmentStream, GeminiChat};
pub use client::{API_KEY_ENV_VARS, Gemini, credential_from_env};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use types::*;
