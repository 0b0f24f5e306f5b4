use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};

use super::repair::{LineKind, classify_line, decode_bytes, repair_escapes, salvage_object};
use super::sse::SseLineBuffer;
use crate::providers::scrub::sanitize_api_error;

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedChunk {
    /// Parsed (possibly after repair) JSON object.
    Data(Value),
    /// Stand-in for a payload that could not be parsed.
    Placeholder(Value),
    /// `data: [DONE]`.
    Done,
}

impl DecodedChunk {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data(value) | Self::Placeholder(value) => Some(value),
            Self::Done => None,
        }
    }
}

/// Chat-completion shaped chunk with an empty delta. `raw` is kept
/// (sanitized, truncated) for diagnosis.
pub fn placeholder(raw: &str) -> Value {
    json!({
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": { "content": "" },
            "finish_reason": null,
        }],
        "decode_error": {
            "kind": "DECODE_ERROR",
            "raw": sanitize_api_error(raw),
        },
    })
}

fn parse_object(payload: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Decode one line. `None` means the line carries nothing (blank line,
/// comment, non-data field). Never fails: unparseable payloads become a
/// [`placeholder`].
pub fn decode_line(line: &[u8]) -> Option<DecodedChunk> {
    let text = decode_bytes(line);
    let payload = match classify_line(&text) {
        LineKind::Skip => return None,
        LineKind::Data(payload) => payload,
        LineKind::Salvaged(payload) => {
            tracing::debug!("salvaging SSE line without data prefix");
            payload
        }
    };

    if payload == "[DONE]" {
        return Some(DecodedChunk::Done);
    }
    if payload.is_empty() {
        return None;
    }

    if let Some(value) = parse_object(payload) {
        return Some(DecodedChunk::Data(value));
    }

    let candidate = salvage_object(payload).unwrap_or(payload);
    if let Some(value) = parse_object(candidate) {
        return Some(DecodedChunk::Data(value));
    }
    if let Some(value) = parse_object(&repair_escapes(candidate)) {
        return Some(DecodedChunk::Data(value));
    }

    tracing::warn!(
        error_kind = "DECODE_ERROR",
        payload_len = payload.len(),
        "Unrepairable stream chunk, emitting placeholder"
    );
    Some(DecodedChunk::Placeholder(placeholder(payload)))
}

/// Lazily decode an upstream byte stream.
///
/// Ends after `[DONE]`, after the upstream closes, or after the first
/// transport error (which is yielded as the final item).
pub fn decode_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<DecodedChunk, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut buffer = SseLineBuffer::new();

        while let Some(item) = bytes.next().await {
            match item {
                Ok(chunk) => {
                    buffer.push_chunk(chunk.as_ref());
                    while let Some(line) = buffer.next_line() {
                        if let Some(decoded) = decode_line(&line) {
                            let done = decoded == DecodedChunk::Done;
                            yield Ok(decoded);
                            if done {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if let Some(decoded) = buffer.finish().and_then(|line| decode_line(&line)) {
            yield Ok(decoded);
        }
    }
}
