// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Four-phase signed upload.
//!
//! 1. prepare: the platform issues an ephemeral storage credential.
//! 2. apply: signed GET to the storage broker allocates a store target.
//! 3. upload: raw bytes go to the store target with a CRC32 header.
//! 4. commit: signed POST turns the stored object into an attachment.
//!
//! An aborted sequence simply abandons the allocated slot; there is no
//! rollback.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use doubao_config::model::{PlatformConfig, UploadConfig};
use doubao_core::{
    AttachmentDescriptor, AttachmentKind, DoubaoError, ImageDimensions, Session, UploadPhase,
};
use doubao_pool::SessionPool;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::chat::transport_error;
use crate::params::{browser_headers, insert, join, platform_url};
use crate::sigv4::Signer;
use crate::types::{
    ApplyResult, BrokerResponse, CommitRequest, CommitResult, PrepareUploadRequest,
    PrepareUploadResponse, RawUploadResponse, StoreInfo, UploadCredential,
};

/// Marker the store target answers with after accepting the bytes.
const UPLOAD_SUCCESS: &str = "Success";

/// File name used when a downloaded image's URL has no usable name.
const FALLBACK_IMAGE_NAME: &str = "image.jpg";

/// Lowercase 8-digit hex CRC32 of `data`, as sent in `content-crc32`.
pub fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(data))
}

/// `.ext` for a file name with a non-empty extension.
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}

/// Last path segment of `url` when it looks like a file name.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| name.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_IMAGE_NAME.to_string())
}

/// Client for the signed upload handshake.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    pool: Arc<SessionPool>,
    platform: PlatformConfig,
    upload: UploadConfig,
}

impl UploadClient {
    pub fn new(
        platform: PlatformConfig,
        upload: UploadConfig,
        pool: Arc<SessionPool>,
    ) -> Result<Self, DoubaoError> {
        let http = reqwest::Client::builder()
            .user_agent(platform.user_agent.clone())
            .timeout(platform.request_timeout())
            .build()
            .map_err(|e| DoubaoError::Protocol {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            pool,
            platform,
            upload,
        })
    }

    /// Uploads `data` under `file_name` and returns the committed attachment.
    ///
    /// `file_name` must carry an extension; otherwise this fails in the
    /// prepare phase before any network call.
    pub async fn upload(
        &self,
        kind: AttachmentKind,
        file_name: &str,
        data: &[u8],
    ) -> Result<AttachmentDescriptor, DoubaoError> {
        let extension = file_extension(file_name).ok_or_else(|| {
            DoubaoError::upload(
                UploadPhase::Prepare,
                format!("file name `{file_name}` has no extension"),
            )
        })?;

        let pooled = self.pool.acquire(None, None)?;
        info!(%kind, file_name, size = data.len(), session = %pooled.id, "upload started");

        let credential = self.prepare(&pooled.session, kind).await?;
        let signer = Signer::new(
            credential.access_key.clone(),
            credential.secret_key.clone(),
            Some(credential.session_token.clone()),
            self.upload.region.clone(),
            self.upload.service.clone(),
        );

        let (store, session_key) = self
            .apply(&signer, &credential, data.len(), &extension)
            .await?;
        self.transfer(&store, data).await?;
        let descriptor = self
            .commit(&signer, &credential, &session_key, kind, file_name, data)
            .await?;

        info!(%kind, key = %descriptor.key, "upload committed");
        Ok(descriptor)
    }

    /// Reads a local file and uploads it under its own file name.
    pub async fn upload_path(
        &self,
        kind: AttachmentKind,
        path: &Path,
    ) -> Result<AttachmentDescriptor, DoubaoError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DoubaoError::upload(
                    UploadPhase::Prepare,
                    format!("path {} has no file name", path.display()),
                )
            })?
            .to_string();
        let data = tokio::fs::read(path).await.map_err(|e| {
            DoubaoError::upload(
                UploadPhase::Prepare,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        self.upload(kind, &file_name, &data).await
    }

    /// Downloads an image (following redirects) and uploads it.
    ///
    /// The file name is the URL's last path segment, or `image.jpg` when that
    /// segment has no extension.
    pub async fn upload_from_url(
        &self,
        image_url: &str,
    ) -> Result<AttachmentDescriptor, DoubaoError> {
        let url = Url::parse(image_url)
            .map_err(|e| DoubaoError::protocol(format!("invalid image URL `{image_url}`: {e}")))?;
        let file_name = file_name_from_url(&url);

        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DoubaoError::protocol(format!(
                "image download returned {status}"
            )));
        }
        let data = response.bytes().await.map_err(transport_error)?;
        debug!(file_name, size = data.len(), "image downloaded");

        self.upload(AttachmentKind::Image, &file_name, &data).await
    }

    async fn prepare(
        &self,
        session: &Session,
        kind: AttachmentKind,
    ) -> Result<UploadCredential, DoubaoError> {
        let phase = UploadPhase::Prepare;
        let url = platform_url(&self.platform, "/alice/resource/prepare_upload", session)?;
        let mut headers = browser_headers(&self.platform, session, "chat/")?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = PrepareUploadRequest {
            resource_type: kind.resource_type(),
            scene_id: &self.upload.scene_id,
            tenant_id: &self.upload.tenant_id,
        };
        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| phase_error(phase, e))?;
        let body: PrepareUploadResponse = read_json(phase, response).await?;

        let data = body
            .data
            .ok_or_else(|| DoubaoError::upload(phase, "response has no `data`"))?;
        let token = data
            .upload_auth_token
            .ok_or_else(|| DoubaoError::upload(phase, "response has no upload token"))?;
        let require = |value: Option<String>, name: &str| {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DoubaoError::upload(phase, format!("response has no `{name}`")))
        };

        let credential = UploadCredential {
            service_id: require(data.service_id, "service_id")?,
            access_key: require(token.access_key, "access_key")?,
            secret_key: require(token.secret_key, "secret_key")?,
            session_token: require(token.session_token, "session_token")?,
        };
        debug!(service_id = %credential.service_id, "upload credential issued");
        Ok(credential)
    }

    async fn apply(
        &self,
        signer: &Signer,
        credential: &UploadCredential,
        size: usize,
        extension: &str,
    ) -> Result<(StoreInfo, String), DoubaoError> {
        let phase = UploadPhase::Apply;
        let mut url = self.broker_url("ApplyImageUpload", credential)?;
        url.query_pairs_mut()
            .append_pair("NeedFallback", "true")
            .append_pair("FileSize", &size.to_string())
            .append_pair("FileExtension", extension);

        let signed = signer.sign("GET", &url, b"", Utc::now())?;
        let response = self
            .http
            .get(url)
            .headers(to_header_map(&signed.0)?)
            .send()
            .await
            .map_err(|e| phase_error(phase, e))?;
        let body: BrokerResponse<ApplyResult> = read_json(phase, response).await?;
        let broker_error = body.error_text();

        let address = body
            .result
            .and_then(|r| r.upload_address)
            .ok_or_else(|| {
                DoubaoError::upload(
                    phase,
                    broker_error.unwrap_or_else(|| "response has no upload address".into()),
                )
            })?;
        let session_key = address
            .session_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DoubaoError::upload(phase, "response has no session key"))?;
        let store = address
            .store_infos
            .into_iter()
            .next()
            .ok_or_else(|| DoubaoError::upload(phase, "response lists no store targets"))?;

        debug!(store_uri = %store.store_uri, "store target allocated");
        Ok((store, session_key))
    }

    async fn transfer(&self, store: &StoreInfo, data: &[u8]) -> Result<(), DoubaoError> {
        let phase = UploadPhase::Upload;
        let url = join(&self.upload.upload_url, &store.store_uri)?;

        let mut headers = HeaderMap::new();
        insert(&mut headers, "authorization", &store.auth)?;
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(
            "content-disposition",
            HeaderValue::from_static("attachment; filename=\"undefined\""),
        );
        insert(&mut headers, "content-crc32", &crc32_hex(data))?;

        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| phase_error(phase, e))?;
        let body: RawUploadResponse = read_json(phase, response).await?;

        match body.message.as_deref() {
            Some(UPLOAD_SUCCESS) => {
                debug!(size = data.len(), "bytes stored");
                Ok(())
            }
            other => Err(DoubaoError::upload(
                phase,
                format!("store target answered {:?}", other.unwrap_or("")),
            )),
        }
    }

    async fn commit(
        &self,
        signer: &Signer,
        credential: &UploadCredential,
        session_key: &str,
        kind: AttachmentKind,
        file_name: &str,
        data: &[u8],
    ) -> Result<AttachmentDescriptor, DoubaoError> {
        let phase = UploadPhase::Commit;
        let url = self.broker_url("CommitImageUpload", credential)?;
        let payload = serde_json::to_vec(&CommitRequest { session_key })
            .map_err(|e| DoubaoError::upload(phase, format!("cannot encode request: {e}")))?;

        let signed = signer.sign("POST", &url, &payload, Utc::now())?;
        let mut headers = to_header_map(&signed.0)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .map_err(|e| phase_error(phase, e))?;
        let body: BrokerResponse<CommitResult> = read_json(phase, response).await?;
        let broker_error = body.error_text();

        let result = body
            .result
            .and_then(|r| r.plugin_result.into_iter().next())
            .ok_or_else(|| {
                DoubaoError::upload(
                    phase,
                    broker_error.unwrap_or_else(|| "response lists no results".into()),
                )
            })?;

        Ok(match kind {
            AttachmentKind::Image => AttachmentDescriptor {
                key: result.image_uri,
                name: file_name.to_string(),
                kind,
                size: result.image_size,
                dimensions: match (result.image_width, result.image_height) {
                    (Some(width), Some(height)) => Some(ImageDimensions { width, height }),
                    _ => None,
                },
                checksum: None,
            },
            AttachmentKind::Document => AttachmentDescriptor {
                key: result.image_uri,
                name: file_name.to_string(),
                kind,
                size: Some(result.image_size.unwrap_or(data.len() as u64)),
                dimensions: None,
                checksum: Some(
                    result
                        .image_md5
                        .filter(|sum| !sum.is_empty())
                        .unwrap_or_else(|| md5_hex(data)),
                ),
            },
        })
    }

    fn broker_url(
        &self,
        action: &str,
        credential: &UploadCredential,
    ) -> Result<Url, DoubaoError> {
        let mut url = Url::parse(&self.upload.imagex_url).map_err(|e| {
            DoubaoError::Config(format!("invalid imagex_url `{}`: {e}", self.upload.imagex_url))
        })?;
        url.query_pairs_mut()
            .append_pair("Action", action)
            .append_pair("Version", &self.upload.api_version)
            .append_pair("ServiceId", &credential.service_id);
        Ok(url)
    }
}

fn to_header_map(pairs: &[(&'static str, String)]) -> Result<HeaderMap, DoubaoError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        insert(&mut headers, *name, value)?;
    }
    Ok(headers)
}

fn phase_error(phase: UploadPhase, e: reqwest::Error) -> DoubaoError {
    DoubaoError::upload(phase, format!("request failed: {e}"))
}

async fn read_json<T: DeserializeOwned>(
    phase: UploadPhase,
    response: reqwest::Response,
) -> Result<T, DoubaoError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| phase_error(phase, e))?;
    if !status.is_success() {
        return Err(DoubaoError::upload(
            phase,
            format!("endpoint returned {status}: {body}"),
        ));
    }
    serde_json::from_str(&body)
        .map_err(|e| DoubaoError::upload(phase, format!("unreadable response: {e}")))
}
