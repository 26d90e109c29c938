//! Incremental Server-Sent Events decoder.
//!
//! Buffers bytes across network chunk boundaries, joins multi-line `data:`
//! fields, dispatches an event on each blank line, and parses its payload as
//! JSON. Comment lines, `event:`/`id:`/`retry:` fields and the `[DONE]`
//! terminator are ignored.

use serde_json::Value;

/// SSE decoder yielding one JSON value per dispatched event.
///
/// # Example
///
/// ```
/// use llm_resilience::backend::sse::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// let values = decoder.decode(b"data: {\"candidates\":[]}\r\n\r\n");
/// assert_eq!(values.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create a new empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the JSON payloads of every completed event.
    ///
    /// Payloads that are not valid JSON are dropped.
    /// Bytes are buffered until a full line is available, so a multi-byte
    /// character split across chunks is decoded intact.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(value) = self.process_line(line) {
                values.push(value);
            }
        }
        values
    }

    /// Dispatch whatever is left once the body ends.
    pub fn flush(&mut self) -> Vec<Value> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest);
        let mut values = Vec::new();
        for line in rest.lines() {
            if let Some(value) = self.process_line(line) {
                values.push(value);
            }
        }
        values.extend(self.dispatch());
        values
    }

    fn process_line(&mut self, line: &str) -> Option<Value> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<Value> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return None;
        }
        serde_json::from_str(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_basic_decode() {
        let mut decoder = SseDecoder::new();
        let chunk = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n";
        let values = decoder.decode(chunk);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["candidates"][0]["content"]["parts"][0]["text"], "Hi");
    }

    #[test]
    fn test_sse_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: {\"a\":1}\r\n\r\ndata: {\"a\":2}\r\n\r\n");
        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["a"], 2);
    }

    #[test]
    fn test_sse_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"cho").is_empty());
        assert!(decoder.decode(b"ices\":[]}\n").is_empty());
        let values = decoder.decode(b"\n");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_sse_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["a"], 1);
    }

    #[test]
    fn test_sse_ignores_comments_fields_and_done() {
        let mut decoder = SseDecoder::new();
        let chunk = b": keep-alive\n\nevent: message\nid: 7\ndata: {\"x\":1}\n\ndata: [DONE]\n\n";
        let values = decoder.decode(chunk);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["x"], 1);
    }

    #[test]
    fn test_sse_flush_dispatches_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.decode(b"data: {\"done\":true}").is_empty());
        let values = decoder.flush();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["done"], true);
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn test_sse_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let event = "data: {\"t\":\"Résumé – café\"}\n\n".as_bytes();
        // Split between the two bytes of the first "é".
        let split = event.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.decode(&event[..split]).is_empty());
        let values = decoder.decode(&event[split..]);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["t"], "Résumé – café");
    }

    #[test]
    fn test_sse_invalid_json_dropped() {
        let mut decoder = SseDecoder::new();
        let values = decoder.decode(b"data: not json\n\ndata: {\"ok\":true}\n\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["ok"], true);
    }
}
