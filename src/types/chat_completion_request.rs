use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Request body for `POST chat/completions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: String,

    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Whether to stream the response as server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a new streaming request.
    pub fn new_streaming(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            stream: true,
        }
    }
}
