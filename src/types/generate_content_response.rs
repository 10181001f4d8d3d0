use serde::{Deserialize, Serialize};

use crate::types::{Content, FinishReason};

/// Why the prompt itself was rejected, if it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Set when the prompt was blocked (e.g. `SAFETY`, `OTHER`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Token accounting attached to (usually the last) response chunk.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt, including history and system instruction.
    #[serde(default)]
    pub prompt_token_count: u32,

    /// Tokens generated across candidates.
    #[serde(default)]
    pub candidates_token_count: u32,

    /// Sum of the above plus any reasoning tokens.
    #[serde(default)]
    pub total_token_count: u32,
}

/// One generated alternative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The generated content; absent on some terminal chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// Set on the chunk that ends the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Index of the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// A full response, or one chunk of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidates; the chat only ever requests one.
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// Prompt rejection details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,

    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,

    /// The concrete model version that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, or `None` if this chunk carries no text.
    pub fn text(&self) -> Option<String> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(Content::text)
    }

    /// Finish reason of the first candidate.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason)
    }

    /// The reason the prompt was blocked, if it was.
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_streamed_chunk() {
        let chunk: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"parts": [{"text": "Hi"}], "role": "model"},
                    "index": 0
                }],
                "usageMetadata": {"promptTokenCount": 12, "totalTokenCount": 12},
                "modelVersion": "gemini-2.5-flash"
            }"#,
        )
        .unwrap();
        assert_eq!(chunk.text().as_deref(), Some("Hi"));
        assert_eq!(chunk.finish_reason(), None);
        assert_eq!(chunk.usage_metadata.unwrap().prompt_token_count, 12);
        assert_eq!(chunk.model_version.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn parses_terminal_chunk_without_content() {
        let chunk: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "STOP", "index": 0}]}"#)
                .unwrap();
        assert_eq!(chunk.text(), None);
        assert_eq!(chunk.finish_reason(), Some(FinishReason::Stop));
    }

    #[test]
    fn parses_blocked_prompt() {
        let chunk: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(chunk.candidates.is_empty());
        assert_eq!(chunk.block_reason(), Some("SAFETY"));
    }
}
