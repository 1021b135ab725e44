//! Incremental server-sent events decoder.
//!
//! Bytes arrive in arbitrary chunks. The decoder buffers partial lines and
//! emits a frame each time a blank line terminates an event block.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};

use crate::error::StreamError;

/// One dispatched event block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, `message` when absent
    pub event: String,

    /// `data:` lines joined with `\n`
    pub data: String,

    /// `id:` field of this block, if present and non-empty
    pub id: Option<String>,

    /// `retry:` reconnection hint in milliseconds
    pub retry_ms: Option<u64>,
}

/// Line-oriented decoder state
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last newline
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry_ms: Option<u64>,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// True when buffered input has not yet formed a complete frame.
    ///
    /// An unterminated block at end of stream is discarded, never dispatched.
    pub fn has_partial(&self) -> bool {
        self.has_fields || !self.pending.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "data" => {
                self.data.push(value.to_string());
                self.has_fields = true;
            }
            "id" => {
                // Ids containing NUL are ignored
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                    self.has_fields = true;
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry_ms = Some(ms);
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_fields {
            return None;
        }
        self.has_fields = false;

        let event = self.event.take();
        // An empty id only resets the cursor; it never names an event
        let id = self.id.take().filter(|id| !id.is_empty());
        let retry_ms = self.retry_ms.take();
        let data = std::mem::take(&mut self.data).join("\n");

        // Blocks carrying only an id still advance the cursor
        if data.is_empty() && event.is_none() && id.is_none() {
            return None;
        }

        Some(SseFrame {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "message".to_string()),
            data,
            id,
            retry_ms,
        })
    }
}

/// Decode a body of byte chunks into frames.
///
/// A transport error ends the stream as a disconnect.
pub fn frame_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseFrame, StreamError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::new(), false);

    stream::unfold(state, |(mut bytes, mut decoder, mut ready, done)| async move {
        if done {
            return None;
        }
        loop {
            if let Some(frame) = ready.pop_front() {
                return Some((Ok(frame), (bytes, decoder, ready, false)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.feed(chunk.as_ref())),
                Some(Err(e)) => {
                    let error = StreamError::StreamDisconnected(e.to_string());
                    return Some((Err(error), (bytes, decoder, ready, true)));
                }
                None => return None,
            }
        }
    })
}
