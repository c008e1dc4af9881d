// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session records and chat event-stream builders.

use doubao_core::Session;
use serde_json::{json, Value};

/// A logged-in session whose identifiers are derived from `n`.
pub fn test_session(n: usize) -> Session {
    Session {
        device_id: format!("device-{n}"),
        tea_uuid: format!("tea-{n}"),
        web_id: format!("web-{n}"),
        room_id: format!("room-{n}"),
        flow_trace: format!("04-trace-{n}-01"),
        cookie_jar: format!("sessionid=secret-{n}; ttwid=tt-{n}"),
        guest: false,
    }
}

/// Like [`test_session`] but flagged as a guest account.
pub fn guest_session(n: usize) -> Session {
    Session {
        guest: true,
        ..test_session(n)
    }
}

/// The session document format, for writing fixture files.
pub fn session_document(sessions: &[Session]) -> String {
    serde_json::to_string_pretty(sessions).unwrap_or_else(|_| "[]".to_string())
}

/// One framed record: `data: {envelope}` followed by the blank-line delimiter.
///
/// `event_data` is embedded as a JSON-encoded string, as the platform does.
pub fn record(event_type: u32, event_data: Value) -> String {
    let envelope = json!({
        "event_type": event_type,
        "event_data": event_data.to_string(),
    });
    format!("id: 0\nevent: message\ndata: {envelope}\n\n")
}

/// Event 2002 carrying the turn's identifiers.
pub fn stream_start(conversation_id: &str, message_id: &str, section_id: &str) -> String {
    record(
        2002,
        json!({
            "conversation_id": conversation_id,
            "message_id": message_id,
            "section_id": section_id,
        }),
    )
}

/// Event 2001 with a text fragment under the given content type.
pub fn text_delta_as(content_type: u32, text: &str) -> String {
    record(
        2001,
        json!({
            "message": {
                "content_type": content_type,
                "content": json!({ "text": text }).to_string(),
            }
        }),
    )
}

/// Event 2001 with a plain text fragment.
pub fn text_delta(text: &str) -> String {
    text_delta_as(2001, text)
}

/// Event 2001 / content type 2074. Each entry is `(status, raw, thumb, ori)`.
pub fn image_delta(creations: &[(u32, Option<&str>, Option<&str>, Option<&str>)]) -> String {
    let creations: Vec<Value> = creations
        .iter()
        .map(|(status, raw, thumb, ori)| {
            let mut image = json!({ "status": status });
            for (field, url) in [("image_raw", raw), ("image_thumb", thumb), ("image_ori", ori)] {
                if let Some(url) = url {
                    image[field] = json!({ "url": url });
                }
            }
            json!({ "type": 1, "image": image })
        })
        .collect();
    record(
        2001,
        json!({
            "message": {
                "content_type": 2074,
                "content": json!({ "creations": creations }).to_string(),
            }
        }),
    )
}

/// Event 2003, the only success terminal.
pub fn stream_end() -> String {
    record(2003, json!({}))
}

/// Event 2005.
pub fn rate_limited() -> String {
    record(2005, json!({ "code": 710022002 }))
}

/// Gateway-level error frame.
pub fn gateway_error(code: i64, message: &str) -> String {
    format!(
        "event: gateway-error\ndata: {}\n\n",
        json!({ "code": code, "message": message })
    )
}

/// A complete successful turn: start, the given text fragments, end.
pub fn simple_turn(conversation_id: &str, message_id: &str, fragments: &[&str]) -> String {
    let mut body = stream_start(conversation_id, message_id, "section-1");
    for fragment in fragments {
        body.push_str(&text_delta(fragment));
    }
    body.push_str(&stream_end());
    body
}
