//! Incremental decoder for OpenAI-style server-sent events.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines and
//! yields one [`SseEvent`] per complete `data:` line.

use serde::Deserialize;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A non-empty content delta
    Delta(String),
    /// `data: [DONE]` or a chunk with a finish reason and no content
    Done,
}

#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            // Only whole lines are decoded, so a multi-byte character split
            // across chunks is reassembled first.
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Dropping SSE line with invalid UTF-8");
                    continue;
                }
            };
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => {
                    for choice in resp.choices {
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            events.push(SseEvent::Delta(content));
                        }
                        if choice.finish_reason.is_some() {
                            events.push(SseEvent::Done);
                        }
                    }
                }
                Err(e) => trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk"),
            }
        }
        events
    }
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
              data: [DONE]\n\n",
        );
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hel".into()),
                SseEvent::Delta("lo".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let events = decoder.push(b"tent\":\"x\"}}]}\r\n");
        assert_eq!(events, vec![SseEvent::Delta("x".into())]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&line[..split]).is_empty());
        let events = decoder.push(&line[split..]);
        assert_eq!(events, vec![SseEvent::Delta("你好".into())]);
    }

    #[test]
    fn finish_reason_is_done_and_empty_delta_is_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"\"},\"finish_reason\":\"stop\"}]}\n",
        );
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn comments_and_garbage_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: ping\ndata: {not json}\n");
        assert!(events.is_empty());
    }
}
