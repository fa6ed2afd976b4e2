//! Per-session chat state: the transcript and the selected model.
//!
//! [`SessionState`] is an explicit value owned by whoever handles the session.
//! It enforces the one rule that ties the two together: changing the selected
//! model clears the transcript before any new message can be appended.

use crate::types::{Message, MessageRole};

/// The ordered chat history of one session.
///
/// Messages can only be appended or cleared all at once, and only through the
/// owning [`SessionState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterate over the messages, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no message has been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Transcript plus model selection for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    current_model: Option<String>,
    transcript: Transcript,
}

impl SessionState {
    /// A fresh session: no model selected, empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a model.
    ///
    /// Selecting the current model does nothing.  Selecting any other model
    /// (including the first selection) clears the transcript.  Returns true
    /// when the selection changed.
    pub fn select_model(&mut self, id: &str) -> bool {
        if self.current_model.as_deref() == Some(id) {
            return false;
        }
        self.transcript.clear();
        self.current_model = Some(id.to_string());
        true
    }

    /// The selected model id, if any.
    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    /// Append a user prompt.
    ///
    /// Input that is empty after trimming is ignored; returns whether the
    /// message was appended.  The stored content is the text as given.
    pub fn append_user_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.transcript.push(Message::new(MessageRole::User, text));
        true
    }

    /// Append the assembled reply of a completed turn.
    pub fn append_assistant_message(&mut self, text: impl Into<String>) {
        self.transcript
            .push(Message::new(MessageRole::Assistant, text.into()));
    }

    /// The transcript.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}
