// Public modules
pub mod api_error;
pub mod content;
pub mod finish_reason;
pub mod generate_content_request;
pub mod generate_content_response;
pub mod model;

// Re-exports
pub use api_error::{ApiErrorBody, ApiErrorDetail};
pub use content::{Content, ContentRole, Part};
pub use finish_reason::FinishReason;
pub use generate_content_request::{GenerateContentRequest, GenerationConfig};
pub use generate_content_response::{
    Candidate, GenerateContentResponse, PromptFeedback, UsageMetadata,
};
pub use model::{KnownModel, Model};
