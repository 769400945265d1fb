//! Decoding of server-sent-event style completion streams.
//!
//! A streaming chat completion arrives as `data: {json}` lines terminated by
//! `data: [DONE]`. Lines may be split arbitrarily across network chunks, so
//! the decoder buffers until it sees a full line.

use super::client::ProviderError;
use serde_json::{Map, Value as JsonValue};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// One meaningful line of a completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Data(JsonValue),
    Done,
}

#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning every complete line it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamLine>, ProviderError> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(parsed) = parse_line(&line[..line.len() - 1])? {
                lines.push(parsed);
            }
        }
        Ok(lines)
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Option<StreamLine>, ProviderError> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<StreamLine>, ProviderError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ProviderError::InvalidResponse(format!("Stream is not UTF-8: {}", e)))?;
    let text = text.trim();
    if text.is_empty() || text.starts_with(':') {
        return Ok(None);
    }

    let payload = match text.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(text) => return Ok(None),
        None => text,
    };
    if payload == DONE_MARKER {
        return Ok(Some(StreamLine::Done));
    }

    serde_json::from_str(payload)
        .map(|value| Some(StreamLine::Data(value)))
        .map_err(|e| ProviderError::InvalidResponse(format!("Malformed stream chunk: {}", e)))
}

fn is_sse_field(text: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| text.starts_with(field))
}

/// Running result of a streamed completion.
///
/// The first chunk becomes the root object; every later chunk contributes its
/// `choices` entries, appended in arrival order.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    root: Option<JsonValue>,
    chunks: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: JsonValue) -> &JsonValue {
        self.chunks += 1;
        let root = match self.root.take() {
            None => chunk,
            Some(mut root) => {
                append_choices(&mut root, chunk);
                root
            }
        };
        self.root.insert(root)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn into_result(self) -> JsonValue {
        self.root.unwrap_or_else(|| JsonValue::Object(Map::new()))
    }
}

fn append_choices(root: &mut JsonValue, chunk: JsonValue) {
    let incoming = match chunk {
        JsonValue::Object(mut obj) => match obj.remove("choices") {
            Some(JsonValue::Array(choices)) => choices,
            _ => return,
        },
        _ => return,
    };

    let Some(obj) = root.as_object_mut() else {
        return;
    };
    match obj.get_mut("choices") {
        Some(JsonValue::Array(existing)) => existing.extend(incoming),
        _ => {
            obj.insert("choices".to_string(), JsonValue::Array(incoming));
        }
    }
}

/// Concatenated text of every choice in a completion result, covering both
/// streamed (`delta.content`) and non-streamed (`message.content`) shapes.
pub fn merged_content(result: &JsonValue) -> String {
    result
        .get("choices")
        .and_then(JsonValue::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|choice| {
                    choice
                        .pointer("/delta/content")
                        .or_else(|| choice.pointer("/message/content"))
                        .and_then(JsonValue::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}
