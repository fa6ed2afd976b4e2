//! Output rendering for chat turns.
//!
//! The session and relay never write to the terminal directly; they talk to a
//! [`Renderer`].  [`PlainTextRenderer`] is the terminal implementation, with
//! optional ANSI styling.

use std::io::{self, Stdout, Write};

use crate::types::{Message, MessageRole};

/// ANSI escape code for bold text (used for role labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for informational output).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Shown in front of inline error annotations.
const ERROR_ICON: &str = "🚨";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing output in tests
pub trait Renderer: Send {
    /// Render a complete message from the transcript.
    ///
    /// Used to echo the user's prompt and to redraw the history.
    fn print_message(&mut self, message: &Message);

    /// Called before the first fragment of an assistant reply.
    fn start_response(&mut self) {}

    /// Print a fragment of the assistant reply.
    ///
    /// This is called incrementally as fragments are streamed from the API.
    fn print_text(&mut self, text: &str);

    /// Print an inline error annotation.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a reply is complete or abandoned.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    in_response: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            in_response: false,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn role_label(&self, role: MessageRole) -> String {
        let avatar = role.avatar();
        if self.use_color {
            let color = match role {
                MessageRole::User => ANSI_CYAN,
                MessageRole::Assistant => ANSI_GREEN,
            };
            format!("{avatar} {ANSI_BOLD}{color}{role}{ANSI_RESET}")
        } else {
            format!("{avatar} {role}")
        }
    }

    fn end_response_line(&mut self) {
        if self.in_response {
            println!();
            self.in_response = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, message: &Message) {
        self.end_response_line();
        println!("{}", self.role_label(message.role));
        println!("{}", message.content);
        self.flush();
    }

    fn start_response(&mut self) {
        self.end_response_line();
        println!("{}", self.role_label(MessageRole::Assistant));
        self.in_response = true;
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.end_response_line();
        if self.use_color {
            eprintln!("{ANSI_RED}{ERROR_ICON} {error}{ANSI_RESET}");
        } else {
            eprintln!("{ERROR_ICON} {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        self.end_response_line();
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
        self.flush();
    }

    fn finish_response(&mut self) {
        self.end_response_line();
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.role_label(MessageRole::User), "👨‍💻 user");
        assert_eq!(renderer.role_label(MessageRole::Assistant), "🤖 assistant");
    }

    #[test]
    fn colored_labels_are_reset() {
        let renderer = PlainTextRenderer::with_color(true);
        let label = renderer.role_label(MessageRole::Assistant);
        assert!(label.starts_with("🤖 "));
        assert!(label.ends_with(ANSI_RESET));
    }

    #[test]
    fn finish_response_closes_line() {
        let mut renderer = PlainTextRenderer::with_color(false);
        renderer.start_response();
        assert!(renderer.in_response);
        renderer.print_text("partial");
        renderer.finish_response();
        assert!(!renderer.in_response);
    }
}
