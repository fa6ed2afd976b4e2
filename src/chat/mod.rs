//! Interactive chat on top of the groqchat client library.
//!
//! This module provides a streaming REPL chat interface. It supports:
//!
//! - Streaming responses with fragments shown as they arrive
//! - Switching between registry models (which starts a fresh conversation)
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: the per-conversation context and turn driver
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{ChatSession, TurnOutcome};
