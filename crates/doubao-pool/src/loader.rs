// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reads the session document written by the credential capture process.

use std::path::Path;

use doubao_core::{DoubaoError, Session};

/// Parses a JSON array of session records.
///
/// A record with an empty mandatory identifier is rejected; the error names
/// the record's index in the array.
pub fn parse_sessions(json: &str) -> Result<Vec<Session>, DoubaoError> {
    let sessions: Vec<Session> = serde_json::from_str(json)
        .map_err(|e| DoubaoError::Config(format!("invalid session document: {e}")))?;

    for (index, session) in sessions.iter().enumerate() {
        let fields = [
            ("cookie", &session.cookie_jar),
            ("device_id", &session.device_id),
            ("tea_uuid", &session.tea_uuid),
            ("web_id", &session.web_id),
            ("room_id", &session.room_id),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(DoubaoError::Config(format!(
                "session record {index} has an empty `{name}`"
            )));
        }
    }

    Ok(sessions)
}

/// Reads and parses the session document at `path`.
pub fn load_sessions(path: &Path) -> Result<Vec<Session>, DoubaoError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        DoubaoError::Config(format!(
            "cannot read session document {}: {e}",
            path.display()
        ))
    })?;
    parse_sessions(&json)
}
