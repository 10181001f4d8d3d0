use serde::{Deserialize, Serialize};

/// The author of a [`Content`] turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    /// Text written by the person chatting.
    User,
    /// Text generated by the model.
    Model,
}

/// A single piece of a content turn.
///
/// Only text parts are produced by this crate; other part kinds the API may
/// return (inline data, function calls) deserialize with `text` unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// The text of this part, if it is a text part.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Set when the part carries model reasoning rather than answer text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: None,
        }
    }

    /// Returns true if this part is reasoning output.
    pub fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

/// One turn of a conversation (or the system instruction).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// The author of the turn; absent for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ContentRole>,

    /// The ordered parts making up the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Creates a user turn holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some(ContentRole::User),
            parts: vec![Part::text(text)],
        }
    }

    /// Creates a model turn holding a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Some(ContentRole::Model),
            parts: vec![Part::text(text)],
        }
    }

    /// Creates a role-less content suitable for a system instruction.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenates the answer text of every part, skipping reasoning parts.
    ///
    /// Returns `None` when no part carries text.
    pub fn text(&self) -> Option<String> {
        let mut out: Option<String> = None;
        for part in self.parts.iter().filter(|p| !p.is_thought()) {
            if let Some(text) = &part.text {
                out.get_or_insert_with(String::new).push_str(text);
            }
        }
        out
    }
}
