// src/nomad/events.rs

//! Decoding of Nomad's `/v1/event/stream` body.
//!
//! The body is newline delimited JSON. Each line is either a heartbeat
//! (`{}`) or a frame `{"Index": N, "Events": [...]}`.

use serde::Deserialize;

use super::api::StreamError;
use super::model::{Event, EventBatch};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawFrame {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    events: Option<Vec<Event>>,
}

/// Decode a single line. Heartbeats and blank lines yield `Ok(None)`.
pub fn decode_frame(line: &[u8]) -> Result<Option<EventBatch>, StreamError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let frame: RawFrame = serde_json::from_slice(trimmed)
        .map_err(|e| StreamError::MalformedBody(e.to_string()))?;

    Ok(frame.events.map(|events| EventBatch {
        index: frame.index,
        events,
    }))
}

/// Splits an arbitrarily chunked byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}
