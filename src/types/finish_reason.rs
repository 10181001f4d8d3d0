use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reasons why the model stopped generating a candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    /// The API did not say.
    FinishReasonUnspecified,

    /// Natural end of the answer.
    Stop,

    /// The response reached the configured token limit.
    MaxTokens,

    /// The candidate was flagged by safety filters.
    Safety,

    /// The candidate was flagged for recitation.
    Recitation,

    /// The candidate used an unsupported language.
    Language,

    /// The candidate contained blocklisted terms.
    Blocklist,

    /// The candidate contained prohibited content.
    ProhibitedContent,

    /// The candidate contained sensitive personally identifiable information.
    Spii,

    /// Any other reason, including ones added after this crate was written.
    #[serde(other)]
    Other,
}

impl FinishReason {
    /// Returns true if the candidate was cut off by a content filter.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            FinishReason::Safety
                | FinishReason::Recitation
                | FinishReason::Blocklist
                | FinishReason::ProhibitedContent
                | FinishReason::Spii
        )
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::FinishReasonUnspecified => write!(f, "FINISH_REASON_UNSPECIFIED"),
            FinishReason::Stop => write!(f, "STOP"),
            FinishReason::MaxTokens => write!(f, "MAX_TOKENS"),
            FinishReason::Safety => write!(f, "SAFETY"),
            FinishReason::Recitation => write!(f, "RECITATION"),
            FinishReason::Language => write!(f, "LANGUAGE"),
            FinishReason::Blocklist => write!(f, "BLOCKLIST"),
            FinishReason::ProhibitedContent => write!(f, "PROHIBITED_CONTENT"),
            FinishReason::Spii => write!(f, "SPII"),
            FinishReason::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for FinishReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "FINISH_REASON_UNSPECIFIED" => FinishReason::FinishReasonUnspecified,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            "LANGUAGE" => FinishReason::Language,
            "BLOCKLIST" => FinishReason::Blocklist,
            "PROHIBITED_CONTENT" => FinishReason::ProhibitedContent,
            "SPII" => FinishReason::Spii,
            _ => FinishReason::Other,
        })
    }
}
