//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the API.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Switch to another model.  Clears the history when the model changes.
    Model(String),

    /// List the available models.
    Models,

    /// Set the maximum tokens per response.
    MaxTokens(u32),

    /// Redraw the conversation so far.
    History,

    /// Show the current configuration.
    ShowConfig,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use groqchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/model llama3-8b-8192").is_some());
/// assert!(parse_command("Hello, Groq!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "model" => match argument {
            Some(model) => ChatCommand::Model(model.to_string()),
            None => ChatCommand::Invalid("/model requires a model id".to_string()),
        },
        "models" => ChatCommand::Models,
        "max_tokens" => match argument {
            Some(arg) => match arg.parse::<u32>() {
                Ok(value) => ChatCommand::MaxTokens(value),
                Err(_) => {
                    ChatCommand::Invalid("/max_tokens expects a positive integer".to_string())
                }
            },
            None => ChatCommand::Invalid("/max_tokens requires a value".to_string()),
        },
        "history" => ChatCommand::History,
        "config" | "stats" => ChatCommand::ShowConfig,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /model <id>            Switch model (clears the conversation)
  /models                List available models
  /max_tokens <n>        Set maximum response tokens (multiple of 512)
  /history               Show the conversation so far
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat"#
}
