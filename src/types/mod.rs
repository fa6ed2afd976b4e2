// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod message;
pub mod model_descriptor;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChoiceDelta, ChunkChoice};
pub use chat_completion_request::ChatCompletionRequest;
pub use message::{Message, MessageRole};
pub use model_descriptor::ModelDescriptor;
