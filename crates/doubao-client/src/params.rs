// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! URL and header construction shared by every platform endpoint.

use doubao_config::model::PlatformConfig;
use doubao_core::{DoubaoError, Session};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

/// `{base_url}{path}` with the fixed platform identifiers and the session's
/// device identifiers in the query string.
pub(crate) fn platform_url(
    platform: &PlatformConfig,
    path: &str,
    session: &Session,
) -> Result<Url, DoubaoError> {
    let mut url = join(&platform.base_url, path)?;
    url.query_pairs_mut()
        .append_pair("aid", &platform.aid)
        .append_pair("device_id", &session.device_id)
        .append_pair("device_platform", "web")
        .append_pair("language", &platform.language)
        .append_pair("pc_version", &platform.pc_version)
        .append_pair("pkg_type", "release_version")
        .append_pair("real_aid", &platform.aid)
        .append_pair("region", &platform.region)
        .append_pair("samantha_web", "1")
        .append_pair("sys_region", &platform.region)
        .append_pair("tea_uuid", &session.tea_uuid)
        .append_pair("use-olympus-account", "1")
        .append_pair("version_code", &platform.version_code)
        .append_pair("web_id", &session.web_id);
    Ok(url)
}

/// Resolves `path` against `base`, keeping any path prefix on `base`.
pub(crate) fn join(base: &str, path: &str) -> Result<Url, DoubaoError> {
    let raw = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| DoubaoError::Config(format!("invalid URL `{raw}`: {e}")))
}

/// Adds a header whose value comes from session data or a server response.
pub(crate) fn insert(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
) -> Result<(), DoubaoError> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| DoubaoError::Config(format!("invalid `{name}` header value: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Cookie, origin, and referer headers that make a call look like the web app.
pub(crate) fn browser_headers(
    platform: &PlatformConfig,
    session: &Session,
    referer_path: &str,
) -> Result<HeaderMap, DoubaoError> {
    let base = platform.base_url.trim_end_matches('/');
    let mut headers = HeaderMap::new();
    insert(&mut headers, "cookie", &session.cookie_jar)?;
    insert(&mut headers, "origin", base)?;
    insert(
        &mut headers,
        "referer",
        &format!("{base}/{}", referer_path.trim_start_matches('/')),
    )?;
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doubao_test_utils::test_session;

    #[test]
    fn query_carries_fixed_and_session_identifiers() {
        let platform = PlatformConfig::default();
        let url = platform_url(&platform, "/samantha/chat/completion", &test_session(3)).unwrap();
        assert_eq!(url.path(), "/samantha/chat/completion");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("aid"), Some("497858"));
        assert_eq!(get("real_aid"), Some("497858"));
        assert_eq!(get("device_id"), Some("device-3"));
        assert_eq!(get("tea_uuid"), Some("tea-3"));
        assert_eq!(get("web_id"), Some("web-3"));
        assert_eq!(get("version_code"), Some("20800"));
        assert_eq!(get("use-olympus-account"), Some("1"));
    }

    #[test]
    fn join_keeps_base_prefix() {
        let url = join("http://127.0.0.1:9000/proxy/", "/alice/resource/prepare_upload").unwrap();
        assert_eq!(url.path(), "/proxy/alice/resource/prepare_upload");
    }

    #[test]
    fn header_values_with_newlines_are_rejected() {
        let mut session = test_session(0);
        session.cookie_jar = "a=1\r\nx: y".into();
        let err = browser_headers(&PlatformConfig::default(), &session, "chat/").unwrap_err();
        assert!(matches!(err, DoubaoError::Config(ref msg) if msg.contains("cookie")));
    }
}
