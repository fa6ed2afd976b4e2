//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::error::Result;
use crate::registry::ModelRegistry;

/// Command-line arguments for the groqchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to start with.
    #[arrrg(optional, "Model to use (default: the registry default)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: model ceiling, up to 32768)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// YAML file replacing the built-in model table.
    #[arrrg(optional, "Load the model registry from a YAML file", "FILE")]
    pub models: Option<String>,

    /// Alternate API endpoint.
    #[arrrg(optional, "Base URL of the chat completions API", "URL")]
    pub base_url: Option<String>,

    /// JSON-lines request log.
    #[arrrg(optional, "Append requests, chunks, and replies to FILE as JSON lines", "FILE")]
    pub log: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The models the session may select from.
    pub registry: ModelRegistry,

    /// The model to start with; `None` means the registry default.
    pub model: Option<String>,

    /// Requested tokens per response; `None` means the model default.
    pub max_tokens: Option<u32>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Overrides the API base URL.
    pub base_url: Option<String>,

    /// Where to write the JSON-lines client log, if anywhere.
    pub log_path: Option<PathBuf>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Registry: the built-in models
    /// - Model: the registry default
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            registry: ModelRegistry::builtin(),
            model: None,
            max_tokens: None,
            use_color: true,
            base_url: None,
            log_path: None,
        }
    }

    /// Replaces the model registry.
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the model to start with.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the requested tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the client log path.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = crate::Error;

    /// Resolve arguments, reading the registry file when one is named.
    fn try_from(args: ChatArgs) -> Result<Self> {
        let registry = match &args.models {
            Some(path) => ModelRegistry::from_yaml_file(path)?,
            None => ModelRegistry::builtin(),
        };
        Ok(ChatConfig {
            registry,
            model: args.model,
            max_tokens: args.max_tokens,
            use_color: !args.no_color,
            base_url: args.base_url,
            log_path: args.log.map(PathBuf::from),
        })
    }
}
