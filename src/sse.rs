//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! This module turns the raw byte stream of a `text/event-stream` response into
//! a stream of [`ChatCompletionChunk`]s.  Events are separated by a blank line;
//! each carries one or more `data:` lines.  The literal payload `[DONE]` ends
//! the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{ChatCompletionChunk, Error, Result};

/// End-of-stream sentinel sent as the final event's data.
const DONE_SENTINEL: &str = "[DONE]";

/// The outcome of parsing one SSE event.
enum SseEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

/// Process a stream of bytes into a stream of chat completion chunks.
///
/// Partial events are buffered until their terminating blank line arrives, so
/// events and multi-byte characters may be split across network reads.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();
    let done = false;

    stream::unfold(
        (stream, buffer, done),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some(event) = take_event(&mut buffer) {
                    match decode_event(&event) {
                        Some(Ok(SseEvent::Chunk(chunk))) => {
                            STREAM_EVENTS.click();
                            return Some((Ok(chunk), (stream, buffer, false)));
                        }
                        Some(Ok(SseEvent::Done)) => return None,
                        Some(Err(e)) => {
                            STREAM_ERRORS.click();
                            return Some((Err(e), (stream, buffer, false)));
                        }
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // End of stream; a trailing event may lack its blank line.
                        let rest = std::mem::take(&mut buffer);
                        return match decode_event(&rest) {
                            Some(Ok(SseEvent::Chunk(chunk))) => {
                                STREAM_EVENTS.click();
                                Some((Ok(chunk), (stream, buffer, true)))
                            }
                            Some(Ok(SseEvent::Done)) | None => None,
                            Some(Err(e)) => {
                                STREAM_ERRORS.click();
                                Some((Err(e), (stream, buffer, true)))
                            }
                        };
                    }
                }
            }
        },
    )
}

/// Remove and return the first complete event from the buffer.
///
/// Accepts both `\n\n` and `\r\n\r\n` as the event delimiter.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let lf = find(buffer, b"\n\n").map(|at| (at, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|at| (at, 4));
    let (at, len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let mut event: Vec<u8> = buffer.drain(..at + len).collect();
    event.truncate(at);
    Some(event)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode one event.  Returns `None` for events that carry no data, such as
/// keep-alive comments.
fn decode_event(raw: &[u8]) -> Option<Result<SseEvent>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut event_type = None;
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        } else if let Some(value) = field_value(line, "event") {
            event_type = Some(value);
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    let data = data_lines.join("\n");
    if data == DONE_SENTINEL {
        return Some(Ok(SseEvent::Done));
    }
    Some(parse_data(event_type, &data))
}

/// Strip `name:` and the single optional space that follows it.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

fn parse_data(event_type: Option<&str>, data: &str) -> Result<SseEvent> {
    let value: Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;

    if let Some(error) = value.get("error") {
        return Err(stream_error(error));
    }
    if event_type == Some("error") {
        return Err(stream_error(&value));
    }

    serde_json::from_value::<ChatCompletionChunk>(value)
        .map(SseEvent::Chunk)
        .map_err(|e| {
            Error::serialization(
                format!("Malformed chat completion chunk: {e}"),
                Some(Box::new(e)),
            )
        })
}

/// Convert an in-band `{"message": ..., "type": ...}` error object.
fn stream_error(error: &Value) -> Error {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string());
    let error_type = error
        .get("type")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| Some("stream_error".to_string()));
    Error::api(500, error_type, message, None)
}
