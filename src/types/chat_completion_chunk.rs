use serde::{Deserialize, Serialize};

use crate::types::MessageRole;

/// The incremental part of a streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    /// Present on the first chunk of a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,

    /// Newly generated text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice within a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The text generated since the previous chunk.
    #[serde(default)]
    pub delta: ChoiceDelta,

    /// Why generation stopped; set on the last chunk only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A single `chat.completion.chunk` object decoded from the event stream.
///
/// Fields the client does not use (usage blocks, system fingerprints, vendor
/// extensions) are ignored on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of one completion.
    #[serde(default)]
    pub id: String,

    /// Always `chat.completion.chunk`.
    #[serde(default)]
    pub object: String,

    /// Unix timestamp (seconds) of the completion.
    #[serde(default)]
    pub created: u64,

    /// The model that produced the chunk.
    #[serde(default)]
    pub model: String,

    /// The choices carried by this chunk.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The fragment carried by this chunk: the first choice's delta content.
    ///
    /// Returns `None` when the chunk carries no text, including when the
    /// content is present but empty.
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }

    /// The finish reason of the first choice, if this is a final chunk.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}
