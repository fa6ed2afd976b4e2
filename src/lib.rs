// Public modules
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod registry;
pub mod relay;
pub mod render;
pub mod state;
pub mod turn;
pub mod types;

mod observability;
mod sse;

// Re-exports
pub use client::{API_KEY_VAR, ChunkStream, Groq};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use registry::ModelRegistry;
pub use relay::{CompletionBackend, FragmentStream, RelayOutcome};
pub use render::{PlainTextRenderer, Renderer};
pub use state::{SessionState, Transcript};
pub use turn::{TurnEvent, TurnPhase};
pub use types::*;
