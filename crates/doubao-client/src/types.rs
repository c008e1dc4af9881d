// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the chat, thread, upload, and storage-broker endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Chat request ---

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletionRequest {
    pub completion_option: CompletionOption,
    /// `"0"` asks the platform to open a new conversation.
    pub conversation_id: String,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    /// Logged-in accounts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletionOption {
    pub is_regen: bool,
    pub with_suggest: bool,
    pub need_create_conversation: bool,
    pub launch_stage: u32,
    pub use_auto_cot: bool,
    pub use_deep_think: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RequestMessage {
    /// JSON-encoded `{"text": prompt}`.
    pub content: String,
    pub content_type: u32,
    pub attachments: Vec<Value>,
    pub references: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteThreadRequest<'a> {
    pub conversation_id: &'a str,
}

// --- Chat event stream ---

/// Outer envelope of one stream record.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub event_type: i64,
    /// Nested JSON document, delivered as a string.
    #[serde(default)]
    pub event_data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageEvent {
    #[serde(default)]
    pub message: Option<StreamMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamMessage {
    #[serde(default)]
    pub content_type: Option<i64>,
    /// Nested JSON document, delivered as a string.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TextContent {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreationContent {
    #[serde(default)]
    pub creations: Vec<Creation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Creation {
    #[serde(default)]
    pub image: Option<CreationImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreationImage {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub image_raw: Option<ImageRef>,
    #[serde(default)]
    pub image_thumb: Option<ImageRef>,
    #[serde(default)]
    pub image_ori: Option<ImageRef>,
}

impl CreationImage {
    /// Status code of a finished image.
    pub const READY: i64 = 2;

    /// First non-empty of raw, thumbnail, original.
    pub fn best_url(&self) -> Option<&str> {
        [&self.image_raw, &self.image_thumb, &self.image_ori]
            .into_iter()
            .filter_map(|r| r.as_ref()?.url.as_deref())
            .find(|url| !url.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageRef {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamStart {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GatewayErrorBody {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl GatewayErrorBody {
    /// The code as sent, without JSON string quoting.
    pub fn code_text(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// --- Upload handshake ---

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PrepareUploadRequest<'a> {
    pub resource_type: u8,
    pub scene_id: &'a str,
    pub tenant_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrepareUploadResponse {
    #[serde(default)]
    pub data: Option<PrepareUploadData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrepareUploadData {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub upload_auth_token: Option<UploadAuthToken>,
}

#[derive(Deserialize)]
pub(crate) struct UploadAuthToken {
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl fmt::Debug for UploadAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadAuthToken")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Ephemeral credential scoped to one upload. Never persisted.
#[derive(Clone)]
pub struct UploadCredential {
    pub service_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

impl fmt::Debug for UploadCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCredential")
            .field("service_id", &self.service_id)
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BrokerResponse<T> {
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl<T> BrokerResponse<T> {
    /// The broker's own error description, when it sent one.
    pub fn error_text(&self) -> Option<String> {
        let error = self.response_metadata.as_ref()?.error.as_ref()?;
        Some(format!(
            "{}: {}",
            error.code.as_deref().unwrap_or("unknown"),
            error.message.as_deref().unwrap_or("")
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub error: Option<BrokerError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BrokerError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ApplyResult {
    #[serde(default)]
    pub upload_address: Option<UploadAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct UploadAddress {
    #[serde(default)]
    pub store_infos: Vec<StoreInfo>,
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StoreInfo {
    pub store_uri: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUploadResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CommitRequest<'a> {
    #[serde(rename = "SessionKey")]
    pub session_key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CommitResult {
    #[serde(default)]
    pub plugin_result: Vec<PluginResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PluginResult {
    pub image_uri: String,
    #[serde(default)]
    pub image_md5: Option<String>,
    #[serde(default)]
    pub image_size: Option<u64>,
    #[serde(default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub image_width: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_omits_absent_fields() {
        let request = CompletionRequest {
            completion_option: CompletionOption {
                is_regen: false,
                with_suggest: false,
                need_create_conversation: true,
                launch_stage: 1,
                use_auto_cot: false,
                use_deep_think: true,
            },
            conversation_id: "0".into(),
            messages: vec![RequestMessage {
                content: r#"{"text":"hi"}"#.into(),
                content_type: 2001,
                attachments: vec![],
                references: vec![],
            }],
            section_id: None,
            local_conversation_id: None,
            local_message_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["conversation_id"], "0");
        assert_eq!(json["completion_option"]["use_deep_think"], true);
        assert!(json.get("section_id").is_none());
        assert!(json.get("local_message_id").is_none());
    }

    #[test]
    fn best_url_skips_missing_and_empty() {
        let image: CreationImage = serde_json::from_value(serde_json::json!({
            "status": 2,
            "image_raw": {"url": ""},
            "image_thumb": {"url": "https://img/thumb.png"},
            "image_ori": {"url": "https://img/ori.png"}
        }))
        .unwrap();
        assert_eq!(image.best_url(), Some("https://img/thumb.png"));
    }

    #[test]
    fn gateway_code_renders_numbers_and_strings() {
        let numeric: GatewayErrorBody =
            serde_json::from_str(r#"{"code": 710022004, "message": "busy"}"#).unwrap();
        assert_eq!(numeric.code_text(), "710022004");
        let text: GatewayErrorBody = serde_json::from_str(r#"{"code": "E1"}"#).unwrap();
        assert_eq!(text.code_text(), "E1");
    }

    #[test]
    fn broker_response_reads_pascal_case() {
        let body = r#"{
            "ResponseMetadata": {"RequestId": "x"},
            "Result": {
                "UploadAddress": {
                    "StoreInfos": [{"StoreUri": "tos-cn-i/abc", "Auth": "SpaceKey/xyz"}],
                    "SessionKey": "sk-1"
                }
            }
        }"#;
        let parsed: BrokerResponse<ApplyResult> = serde_json::from_str(body).unwrap();
        let address = parsed.result.unwrap().upload_address.unwrap();
        assert_eq!(address.store_infos[0].store_uri, "tos-cn-i/abc");
        assert_eq!(address.session_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn credential_debug_hides_secrets() {
        let credential = UploadCredential {
            service_id: "svc".into(),
            access_key: "AK".into(),
            secret_key: "very-secret".into(),
            session_token: "token".into(),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("token"));
    }

    #[test]
    fn prepare_response_debug_hides_secrets() {
        let parsed: PrepareUploadResponse = serde_json::from_str(
            r#"{"data": {"service_id": "svc", "upload_auth_token": {
                "access_key": "AK", "secret_key": "very-secret", "session_token": "sess-tok"
            }}}"#,
        )
        .unwrap();
        let rendered = format!("{parsed:?}");
        assert!(rendered.contains("AK"));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("sess-tok"));
    }
}
