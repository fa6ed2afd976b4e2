//! Relaying one prompt to the completion API and assembling the reply.
//!
//! A [`CompletionBackend`] turns a request into a lazy, finite stream of text
//! fragments.  [`drain`] pulls that stream one fragment at a time, renders
//! each non-empty fragment as soon as it arrives, and concatenates them into
//! the reply.  Errors never escape as `Err`: they are rendered inline and
//! reported as [`RelayOutcome::Failed`].

use std::pin::Pin;
use std::time::Instant;

use futures::stream::{Stream, StreamExt};

use crate::client::Groq;
use crate::error::{Error, Result};
use crate::observability::{RELAY_EMPTY_FRAGMENTS, RELAY_FIRST_FRAGMENT, RELAY_FRAGMENTS};
use crate::render::Renderer;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest};

/// A boxed stream of text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Something that can stream a chat completion.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streamed completion for `request`.
    ///
    /// An `Err` means the stream could not be opened at all; errors after
    /// that arrive as items of the returned stream.
    async fn stream_completion(&self, request: ChatCompletionRequest) -> Result<FragmentStream>;

    /// Observe the reply assembled from a completed stream.
    fn reply_completed(&self, model: &str, reply: &str) {
        _ = model;
        _ = reply;
    }
}

#[async_trait::async_trait]
impl CompletionBackend for Groq {
    async fn stream_completion(&self, request: ChatCompletionRequest) -> Result<FragmentStream> {
        let chunks = self.stream(request).await?;
        Ok(Box::pin(fragments(chunks)))
    }

    fn reply_completed(&self, model: &str, reply: &str) {
        if let Some(logger) = self.logger() {
            logger.log_stream_reply(model, reply);
        }
    }
}

/// Reduce a chunk stream to the text fragments it carries.
///
/// Chunks without content are dropped; errors pass through unchanged.
pub fn fragments<S>(chunks: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<ChatCompletionChunk>> + Send,
{
    chunks.filter_map(|chunk| async move {
        match chunk {
            Ok(chunk) => chunk.fragment().map(|text| Ok(text.to_string())),
            Err(err) => Some(Err(err)),
        }
    })
}

/// How a relay cycle ended.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    /// The stream ended normally; holds the concatenated fragments.
    Completed(String),
    /// The stream failed to open or broke part-way.
    Failed(Error),
}

impl RelayOutcome {
    /// The assembled reply, if the relay completed.
    pub fn reply(&self) -> Option<&str> {
        match self {
            RelayOutcome::Completed(reply) => Some(reply),
            RelayOutcome::Failed(_) => None,
        }
    }

    /// True when the relay completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, RelayOutcome::Completed(_))
    }
}

/// Render an error and wrap it as a failed outcome.
pub fn fail(renderer: &mut dyn Renderer, err: Error) -> RelayOutcome {
    renderer.print_error(&err.to_string());
    RelayOutcome::Failed(err)
}

/// Drain `stream`, rendering each fragment in arrival order.
///
/// Empty fragments are skipped without ending the stream.  The first error
/// aborts the cycle; anything already rendered stays on screen but is not
/// part of any outcome.
///
/// ```
/// # use futures::stream;
/// # use groqchat::relay::{FragmentStream, drain};
/// # use groqchat::{Message, Renderer};
/// # struct Quiet;
/// # impl Renderer for Quiet {
/// #     fn print_message(&mut self, _: &Message) {}
/// #     fn print_text(&mut self, _: &str) {}
/// #     fn print_error(&mut self, _: &str) {}
/// #     fn print_info(&mut self, _: &str) {}
/// #     fn finish_response(&mut self) {}
/// # }
/// # tokio_test::block_on(async {
/// let items: Vec<groqchat::Result<String>> = vec![
///     Ok("Hel".to_string()),
///     Ok(String::new()),
///     Ok("lo".to_string()),
/// ];
/// let fragments: FragmentStream = Box::pin(stream::iter(items));
/// let outcome = drain(fragments, &mut Quiet).await;
/// assert_eq!(outcome.reply(), Some("Hello"));
/// # });
/// ```
pub async fn drain(mut stream: FragmentStream, renderer: &mut dyn Renderer) -> RelayOutcome {
    let start = Instant::now();
    let mut reply = String::new();
    let mut first = true;
    renderer.start_response();
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) if fragment.is_empty() => {
                RELAY_EMPTY_FRAGMENTS.click();
            }
            Ok(fragment) => {
                if first {
                    RELAY_FIRST_FRAGMENT.add(start.elapsed().as_secs_f64());
                    first = false;
                }
                RELAY_FRAGMENTS.click();
                renderer.print_text(&fragment);
                reply.push_str(&fragment);
            }
            Err(err) => {
                renderer.finish_response();
                return fail(renderer, err);
            }
        }
    }
    renderer.finish_response();
    RelayOutcome::Completed(reply)
}
