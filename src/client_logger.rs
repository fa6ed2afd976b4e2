//! Logging hooks for completion client operations.
//!
//! This module provides the [`ClientLogger`] trait for capturing every
//! request, decoded stream chunk, and assembled reply passing through the
//! [`Groq`](crate::Groq) client, plus [`JsonLinesLogger`], which appends each
//! of them to a file as one JSON object per line.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::{ChatCompletionChunk, ChatCompletionRequest};

/// A trait for logging completion client operations.
///
/// Implementations must be cheap and must not fail; the client calls them
/// inline while a response is streaming.
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatCompletionRequest);

    /// Log an individual decoded stream chunk.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);

    /// Log the reply assembled from a completed stream.
    fn log_stream_reply(&self, model: &str, reply: &str);
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LogRecord<'a> {
    Request { request: &'a ChatCompletionRequest },
    Chunk { chunk: &'a ChatCompletionChunk },
    Reply { model: &'a str, reply: &'a str },
}

/// A [`ClientLogger`] that appends JSON lines to a file.
pub struct JsonLinesLogger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLogger {
    /// Opens `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| {
                Error::io(
                    format!("failed to open client log {}", path.as_ref().display()),
                    err,
                )
            })?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, record: &LogRecord<'_>) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *writer, record).is_ok() {
            let _ = writer.write_all(b"\n");
            let _ = writer.flush();
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_request(&self, request: &ChatCompletionRequest) {
        self.write(&LogRecord::Request { request });
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.write(&LogRecord::Chunk { chunk });
    }

    fn log_stream_reply(&self, model: &str, reply: &str) {
        self.write(&LogRecord::Reply { model, reply });
    }
}
