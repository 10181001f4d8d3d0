//! The conversation log.

use std::sync::Arc;

/// Who wrote a [`Message`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person chatting.
    User,
    /// The assistant.
    Model,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The author.
    pub role: Role,
    /// The text shown in the bubble.
    pub text: String,
}

impl Message {
    /// Creates a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Creates a model message.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// An append-only, ordered sequence of messages.
///
/// Entries are never reordered or removed.  The only in-place change is
/// [`MessageLog::replace_last_model_text`], which swaps the text of the
/// final entry when (and only when) that entry is a model message.
///
/// Clones share storage and are copy-on-write: a snapshot taken by a viewer
/// is never altered by later updates.  Each update that touches a shared log
/// yields a fresh sequence equal to the previous one except for the change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Arc<Vec<Message>>,
}

impl MessageLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no message has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently appended entry.
    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// The entry at `index`.
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.entries.get(index)
    }

    /// Iterates in append order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    /// The entries as a slice.
    pub fn as_slice(&self) -> &[Message] {
        &self.entries
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        Arc::make_mut(&mut self.entries).push(message);
    }

    /// Replaces the text of the last entry if it is a model message.
    ///
    /// Returns false, leaving the log untouched, otherwise.
    pub fn replace_last_model_text(&mut self, text: impl Into<String>) -> bool {
        if self.last().map(|m| m.role) != Some(Role::Model) {
            return false;
        }
        let entries = Arc::make_mut(&mut self.entries);
        if let Some(last) = entries.last_mut() {
            last.text = text.into();
        }
        true
    }

    /// True if `self` and `other` share the same storage.
    pub fn ptr_eq(&self, other: &MessageLog) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_preserves_order() {
        let mut log = MessageLog::new();
        log.push(Message::user("Hello"));
        log.push(Message::model("Hi"));
        let roles: Vec<Role> = log.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model]);
    }

    #[test]
    fn only_trailing_model_text_is_replaceable() {
        let mut log = MessageLog::new();
        assert!(!log.replace_last_model_text("x"));

        log.push(Message::user("Hello"));
        assert!(!log.replace_last_model_text("x"));
        assert_eq!(log.last().unwrap().text, "Hello");

        log.push(Message::model(""));
        assert!(log.replace_last_model_text("Hi there!"));
        assert_eq!(log.as_slice(), &[Message::user("Hello"), Message::model("Hi there!")]);
    }

    #[test]
    fn snapshots_are_not_mutated() {
        let mut log = MessageLog::new();
        log.push(Message::user("Hello"));
        log.push(Message::model("Hi"));

        let snapshot = log.clone();
        assert!(snapshot.ptr_eq(&log));

        log.replace_last_model_text("Hi there!");
        assert!(!snapshot.ptr_eq(&log));
        assert_eq!(snapshot.last().unwrap().text, "Hi");
        assert_eq!(log.last().unwrap().text, "Hi there!");
        assert_eq!(snapshot.get(0), log.get(0));
    }
}
