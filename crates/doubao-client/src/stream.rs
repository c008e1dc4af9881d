// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental decoder for the chat completion event stream.
//!
//! The stream is a sequence of records separated by a blank line. Each
//! record carries one `data: ` line whose payload is a JSON envelope with an
//! integer `event_type` and a JSON-encoded `event_data` string. Fragments
//! arrive at arbitrary byte boundaries, so the decoder buffers raw bytes and
//! only decodes a record once its delimiter has been seen.
//!
//! Two conditions are detected on the raw buffer before any framing: the
//! quota-exhausted sentinel and the gateway error marker. Both may show up
//! outside the regular record format.

use doubao_core::{CompletionResult, DoubaoError};
use tracing::{debug, warn};

use crate::types::{
    CreationContent, CreationImage, Envelope, GatewayErrorBody, MessageEvent, StreamStart,
    TextContent,
};

const QUOTA_SENTINEL: &[u8] = b"tourist conversation reach limited";
const GATEWAY_MARKER: &[u8] = b"event: gateway-error";
const GATEWAY_DATA: &[u8] = b"data: {";
const RECORD_DELIMITER: &[u8] = b"\n\n";
const DATA_PREFIX: &str = "data: ";

const EVENT_MESSAGE: i64 = 2001;
const EVENT_START: i64 = 2002;
const EVENT_END: i64 = 2003;
const EVENT_RATE_LIMITED: i64 = 2005;

const TEXT_CONTENT_TYPES: [i64; 3] = [10000, 2001, 2008];
const IMAGE_CONTENT_TYPE: i64 = 2074;

/// Longest slice of the raw buffer quoted in a protocol error.
const EXCERPT_LIMIT: usize = 512;

/// Stateful decoder for one chat turn. Feed it every fragment in order.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    texts: Vec<String>,
    image_urls: Vec<String>,
    conversation_id: String,
    message_id: String,
    section_id: String,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one fragment.
    ///
    /// Returns `Ok(Some(result))` once the end-of-stream event is decoded,
    /// `Ok(None)` while more input is needed, and `Err` on any terminal
    /// failure. Input fed after the terminal result is ignored.
    pub fn feed(&mut self, fragment: &[u8]) -> Result<Option<CompletionResult>, DoubaoError> {
        if self.finished {
            debug!(len = fragment.len(), "ignoring input after end of stream");
            return Ok(None);
        }
        self.buffer.extend_from_slice(fragment);

        if find(&self.buffer, QUOTA_SENTINEL).is_some() {
            warn!("platform reported exhausted session quota");
            return Err(DoubaoError::QuotaExhausted);
        }

        if let Some(marker) = find(&self.buffer, GATEWAY_MARKER) {
            // Hold off framing until the error payload line is complete.
            return match self.gateway_error(marker) {
                Some(err) => Err(err),
                None => Ok(None),
            };
        }

        while let Some(end) = find(&self.buffer, RECORD_DELIMITER) {
            let record: Vec<u8> = self.buffer.drain(..end + RECORD_DELIMITER.len()).collect();
            if let Some(result) = self.decode_record(&record[..end])? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Called when the transport reports end of body.
    ///
    /// A trailing record without its delimiter is still decoded. Anything
    /// other than a completed turn is a protocol error.
    pub fn finish(&mut self) -> Result<CompletionResult, DoubaoError> {
        if find(&self.buffer, GATEWAY_MARKER).is_some() {
            return Err(DoubaoError::protocol(format!(
                "gateway error with unreadable payload: {}",
                self.excerpt()
            )));
        }
        let rest = std::mem::take(&mut self.buffer);
        if !rest.iter().all(u8::is_ascii_whitespace) {
            if let Some(result) = self.decode_record(&rest)? {
                return Ok(result);
            }
        }
        Err(DoubaoError::protocol(
            "stream ended before the completion event",
        ))
    }

    /// Conversation id announced by the stream-start event, if seen.
    pub fn conversation_id(&self) -> Option<&str> {
        Some(self.conversation_id.as_str()).filter(|id| !id.is_empty())
    }

    /// Returns `Some(err)` once the payload line after `marker` is complete.
    fn gateway_error(&self, marker: usize) -> Option<DoubaoError> {
        let tail = &self.buffer[marker..];
        let data = find(tail, GATEWAY_DATA)?;
        let payload = &tail[data + DATA_PREFIX.len()..];
        let line_end = payload.iter().position(|b| *b == b'\n')?;

        let parsed = std::str::from_utf8(&payload[..line_end])
            .ok()
            .and_then(|line| serde_json::from_str::<GatewayErrorBody>(line).ok());
        Some(match parsed {
            Some(body) => {
                let code = body.code_text();
                let message = body.message.unwrap_or_default();
                warn!(%code, %message, "gateway error in event stream");
                DoubaoError::Gateway { code, message }
            }
            None => DoubaoError::protocol(format!(
                "gateway error with unreadable payload: {}",
                self.excerpt()
            )),
        })
    }

    fn decode_record(&mut self, raw: &[u8]) -> Result<Option<CompletionResult>, DoubaoError> {
        let text = std::str::from_utf8(raw).map_err(|e| DoubaoError::Protocol {
            message: "event record is not valid UTF-8".into(),
            source: Some(Box::new(e)),
        })?;
        let Some(data) = text
            .trim()
            .lines()
            .find_map(|line| line.strip_prefix(DATA_PREFIX))
        else {
            return Ok(None);
        };

        let envelope: Envelope = parse_json(data, "event envelope")?;
        let event_data = envelope.event_data.as_deref().unwrap_or("{}");
        debug!(event_type = envelope.event_type, "decoded stream event");

        match envelope.event_type {
            EVENT_MESSAGE => {
                self.on_message(parse_json(event_data, "message event")?)?;
                Ok(None)
            }
            EVENT_START => {
                let start: StreamStart = parse_json(event_data, "stream start")?;
                self.conversation_id = start.conversation_id.unwrap_or_default();
                self.message_id = start.message_id.unwrap_or_default();
                self.section_id = start.section_id.unwrap_or_default();
                debug!(
                    conversation_id = %self.conversation_id,
                    message_id = %self.message_id,
                    "stream started"
                );
                Ok(None)
            }
            EVENT_END => Ok(Some(self.complete())),
            EVENT_RATE_LIMITED => Err(DoubaoError::RateLimited {
                conversation_id: self.conversation_id().map(str::to_string),
            }),
            other => {
                warn!(event_type = other, "ignoring unknown stream event");
                Ok(None)
            }
        }
    }

    fn on_message(&mut self, event: MessageEvent) -> Result<(), DoubaoError> {
        let Some(message) = event.message else {
            return Ok(());
        };
        let content = message.content.as_deref().unwrap_or("{}");

        match message.content_type {
            Some(kind) if TEXT_CONTENT_TYPES.contains(&kind) => {
                let body: TextContent = parse_json(content, "text content")?;
                if let Some(text) = body.text.filter(|t| !t.is_empty()) {
                    self.texts.push(text);
                }
            }
            Some(IMAGE_CONTENT_TYPE) => {
                let body: CreationContent = parse_json(content, "image content")?;
                for image in body.creations.iter().filter_map(|c| c.image.as_ref()) {
                    if image.status != Some(CreationImage::READY) {
                        continue;
                    }
                    if let Some(url) = image.best_url() {
                        if !self.image_urls.iter().any(|seen| seen == url) {
                            self.image_urls.push(url.to_string());
                        }
                    }
                }
            }
            other => warn!(content_type = ?other, "ignoring message content type"),
        }
        Ok(())
    }

    fn complete(&mut self) -> CompletionResult {
        self.finished = true;
        self.buffer.clear();
        // Trimmed on the joined text only; fragment edges are kept.
        let joined = self.texts.concat();
        let text = joined.trim_matches('\n');
        debug!(
            text_len = text.len(),
            images = self.image_urls.len(),
            "stream completed"
        );
        CompletionResult {
            text: text.to_string(),
            image_urls: std::mem::take(&mut self.image_urls),
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
            section_id: self.section_id.clone(),
        }
    }

    fn excerpt(&self) -> String {
        let raw = String::from_utf8_lossy(&self.buffer);
        raw.chars().take(EXCERPT_LIMIT).collect()
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, DoubaoError> {
    serde_json::from_str(raw).map_err(|e| DoubaoError::Protocol {
        message: format!("malformed {what}: {e}"),
        source: Some(Box::new(e)),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doubao_test_utils::fixtures::{
        gateway_error, image_delta, rate_limited, record, simple_turn, stream_end, stream_start,
        text_delta, text_delta_as,
    };

    fn decode_all(body: &str) -> Result<Option<CompletionResult>, DoubaoError> {
        StreamDecoder::new().feed(body.as_bytes())
    }

    #[test]
    fn decodes_a_simple_turn() {
        let body = simple_turn("conv-1", "msg-1", &["Hello", ", ", "world"]);
        let result = decode_all(&body).unwrap().unwrap();
        assert_eq!(result.text, "Hello, world");
        assert_eq!(result.conversation_id, "conv-1");
        assert_eq!(result.message_id, "msg-1");
        assert_eq!(result.section_id, "section-1");
        assert!(result.image_urls.is_empty());
    }

    #[test]
    fn trims_outer_newlines_and_keeps_inner_ones() {
        let body = simple_turn("c", "m", &["\nline one\n", "line two\n"]);
        let result = decode_all(&body).unwrap().unwrap();
        assert_eq!(result.text, "line one\nline two");
    }

    #[test]
    fn trims_the_joined_text_not_each_fragment() {
        let body = simple_turn("c", "m", &["\n\nfirst\n", "\nsecond\n\n"]);
        let result = decode_all(&body).unwrap().unwrap();
        assert_eq!(result.text, "first\n\nsecond");
    }

    #[test]
    fn accepts_all_text_content_types() {
        let mut body = stream_start("c", "m", "s");
        body.push_str(&text_delta_as(10000, "a"));
        body.push_str(&text_delta_as(2008, "b"));
        body.push_str(&text_delta_as(9999, "ignored"));
        body.push_str(&stream_end());
        assert_eq!(decode_all(&body).unwrap().unwrap().text, "ab");
    }

    #[test]
    fn collects_ready_images_in_first_seen_order() {
        let mut body = stream_start("c", "m", "s");
        body.push_str(&image_delta(&[
            (1, Some("https://img/pending.png"), None, None),
            (2, Some("https://img/a.png"), Some("https://img/a-thumb.png"), None),
            (2, None, Some("https://img/b-thumb.png"), None),
        ]));
        body.push_str(&image_delta(&[
            (2, Some("https://img/a.png"), None, None),
            (2, None, None, Some("https://img/c-ori.png")),
        ]));
        body.push_str(&stream_end());

        let result = decode_all(&body).unwrap().unwrap();
        assert_eq!(
            result.image_urls,
            vec![
                "https://img/a.png",
                "https://img/b-thumb.png",
                "https://img/c-ori.png"
            ]
        );
    }

    #[test]
    fn quota_sentinel_wins_before_any_record_completes() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(stream_start("c", "m", "s").as_bytes()).unwrap().is_none());
        let err = decoder
            .feed(b"data: {\"error\":\"tourist conversation reach limited\"")
            .unwrap_err();
        assert!(matches!(err, DoubaoError::QuotaExhausted));
    }

    #[test]
    fn quota_sentinel_split_across_fragments() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"tourist conversa").unwrap().is_none());
        let err = decoder.feed(b"tion reach limited").unwrap_err();
        assert!(matches!(err, DoubaoError::QuotaExhausted));
    }

    #[test]
    fn rate_limit_event_is_terminal() {
        let mut body = stream_start("conv-9", "m", "s");
        body.push_str(&rate_limited());
        let err = decode_all(&body).unwrap_err();
        assert!(matches!(
            err,
            DoubaoError::RateLimited { conversation_id: Some(ref c) } if c == "conv-9"
        ));
    }

    #[test]
    fn gateway_error_waits_for_complete_payload() {
        let frame = gateway_error(710022004, "system busy");
        let (head, tail) = frame.split_at(frame.len() - 10);

        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(head.as_bytes()).unwrap().is_none());
        let err = decoder.feed(tail.as_bytes()).unwrap_err();
        match err {
            DoubaoError::Gateway { code, message } => {
                assert_eq!(code, "710022004");
                assert_eq!(message, "system busy");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_gateway_payload_is_protocol_error() {
        let err = decode_all("event: gateway-error\ndata: {not json\n\n").unwrap_err();
        match err {
            DoubaoError::Protocol { message, .. } => assert!(message.contains("gateway-error")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_envelope_is_fatal() {
        let err = decode_all("data: {\"event_type\": \n\n").unwrap_err();
        assert!(matches!(err, DoubaoError::Protocol { .. }));
    }

    #[test]
    fn malformed_inner_content_is_fatal() {
        let body = record(2001, serde_json::json!({
            "message": {"content_type": 2001, "content": "{broken"}
        }));
        assert!(matches!(
            decode_all(&body).unwrap_err(),
            DoubaoError::Protocol { .. }
        ));
    }

    #[test]
    fn unknown_events_and_dataless_records_are_skipped() {
        let mut body = String::from(": keep-alive\n\n");
        body.push_str(&record(4242, serde_json::json!({"x": 1})));
        body.push_str(&simple_turn("c", "m", &["ok"]));
        assert_eq!(decode_all(&body).unwrap().unwrap().text, "ok");
    }

    #[test]
    fn finish_without_end_event_is_protocol_error() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(stream_start("c", "m", "s").as_bytes()).unwrap();
        decoder.feed(text_delta("partial").as_bytes()).unwrap();
        assert!(matches!(
            decoder.finish().unwrap_err(),
            DoubaoError::Protocol { .. }
        ));
    }

    #[test]
    fn finish_decodes_trailing_record_without_delimiter() {
        let body = simple_turn("c", "m", &["tail"]);
        let body = body.trim_end_matches('\n');
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(body.as_bytes()).unwrap().is_none());
        assert_eq!(decoder.finish().unwrap().text, "tail");
    }

    #[test]
    fn multibyte_text_survives_split_inside_a_code_point() {
        let body = simple_turn("c", "m", &["你好，世界"]);
        let bytes = body.as_bytes();
        let split = body.find('好').unwrap() + 1;

        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(&bytes[..split]).unwrap().is_none());
        let result = decoder.feed(&bytes[split..]).unwrap().unwrap();
        assert_eq!(result.text, "你好，世界");
    }
}
