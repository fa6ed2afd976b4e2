//! Interactive chat application for Groq-hosted models.
//!
//! This binary provides a streaming REPL interface over Groq's chat
//! completions API.  The API key is read from `GROQ_API_KEY`.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! groqchat
//!
//! # Start on a specific model with a smaller response limit
//! groqchat --model llama3-8b-8192 --max-tokens 2048
//!
//! # Use a custom model table and keep a request log
//! groqchat --models models.yaml --log groqchat.jsonl
//!
//! # Disable colors (useful for piping output)
//! groqchat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/model <id>` - Switch model (clears the conversation)
//! - `/models` - List available models
//! - `/max_tokens <n>` - Set the response token limit
//! - `/history` - Show the conversation so far
//! - `/config` - Show the current configuration
//! - `/quit` - Exit the application

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use groqchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use groqchat::registry::{MIN_MAX_TOKENS, TOKEN_STEP};
use groqchat::{Groq, JsonLinesLogger};

/// Main entry point for the groqchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("groqchat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let mut client = Groq::with_options(None, config.base_url.clone(), None)?;
    if let Some(path) = &config.log_path {
        client = client.with_logger(Arc::new(JsonLinesLogger::open(path)?));
    }
    let mut session = ChatSession::with_config(client, &config)?;
    let mut rl = DefaultEditor::new()?;

    println!("Groq Chat (model: {})", session.model().label());
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line.as_str());

                // Check for slash commands
                if let Some(cmd) = parse_command(&line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Model(id) => match session.select_model(&id) {
                            Ok(true) => renderer.print_info(&format!(
                                "Model changed to: {} (conversation cleared, max_tokens {})",
                                session.model().label(),
                                session.max_tokens()
                            )),
                            Ok(false) => {
                                renderer.print_info(&format!("Already using {id}."));
                            }
                            Err(err) => {
                                renderer.print_error(&err.to_string());
                                renderer.print_info("Use /models to list available models.");
                            }
                        },
                        ChatCommand::Models => print_models(&session),
                        ChatCommand::MaxTokens(value) => {
                            let effective = session.set_max_tokens(value);
                            if effective == value {
                                renderer.print_info(&format!("max_tokens set to {effective}"));
                            } else {
                                renderer.print_info(&format!(
                                    "max_tokens set to {effective} (requested {value}; \
                                     limits move in steps of {TOKEN_STEP})"
                                ));
                            }
                        }
                        ChatCommand::History => {
                            if session.transcript().is_empty() {
                                renderer.print_info("No messages yet.");
                            } else {
                                session.render_history(&mut renderer);
                            }
                        }
                        ChatCommand::ShowConfig => print_config(&session, &config),
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to API
                if let Err(e) = session.submit(&line, &mut renderer).await {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

fn print_models(session: &ChatSession<Groq>) {
    let current = &session.model().id;
    println!("    Available Models:");
    for model in session.registry().iter() {
        let marker = if &model.id == current { "*" } else { " " };
        println!(
            "    {marker} {:<22} {} (up to {} tokens)",
            model.id,
            model.label(),
            model.token_ceiling
        );
    }
}

fn print_config(session: &ChatSession<Groq>, config: &ChatConfig) {
    let model = session.model();
    println!("    Current Configuration:");
    println!("      Model: {} [{}]", model.label(), model.id);
    println!(
        "      Max tokens: {} (range {MIN_MAX_TOKENS}-{}, step {TOKEN_STEP})",
        session.max_tokens(),
        model.token_ceiling
    );
    println!("      Messages: {}", session.message_count());
    println!("      API: {}", session.backend().base_url());
    match &config.log_path {
        Some(path) => println!("      Client log: {}", path.display()),
        None => println!("      Client log: (disabled)"),
    }
    println!(
        "      Colors: {}",
        if config.use_color { "on" } else { "off" }
    );
}
