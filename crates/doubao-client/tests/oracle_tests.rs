// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use doubao_client::MarkupVideoOracle;
use doubao_config::model::PlatformConfig;
use doubao_core::{DoubaoError, VideoOracle};
use doubao_pool::SessionPool;
use doubao_test_utils::test_session;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn oracle_for(server: &MockServer, pool: Arc<SessionPool>) -> MarkupVideoOracle {
    let platform = PlatformConfig {
        base_url: server.uri(),
        ..PlatformConfig::default()
    };
    MarkupVideoOracle::new(platform, pool).unwrap()
}

fn bound_pool(conversation_id: &str) -> Arc<SessionPool> {
    let pool = Arc::new(SessionPool::new(vec![test_session(0), test_session(1)]));
    let second = pool.snapshot().unwrap()[1].id;
    pool.bind(conversation_id, second, false).unwrap();
    pool
}

#[tokio::test]
async fn page_with_video_reports_success_using_bound_cookies() {
    let server = MockServer::start().await;
    let page = r#"<html><script>window.__DATA__={"video":"https:\/\/v9.douyinvod.com\/abc\/out.mp4"}</script></html>"#;
    Mock::given(method("GET"))
        .and(path("/chat/conv-1"))
        .and(header("cookie", "sessionid=secret-1; ttwid=tt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = oracle_for(&server, bound_pool("conv-1"));
    let report = oracle.fetch("conv-1", Duration::from_secs(5)).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.video_urls, vec!["https://v9.douyinvod.com/abc/out.mp4"]);
}

#[tokio::test]
async fn page_without_video_is_a_failed_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conv-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>generating</html>"))
        .mount(&server)
        .await;

    let oracle = oracle_for(&server, bound_pool("conv-2"));
    let report = oracle.fetch("conv-2", Duration::from_secs(5)).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.error.as_deref(), Some("no video found"));
}

#[tokio::test]
async fn error_status_is_a_failed_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conv-3"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let oracle = oracle_for(&server, bound_pool("conv-3"));
    let report = oracle.fetch("conv-3", Duration::from_secs(5)).await.unwrap();
    assert!(!report.is_success());
    assert!(report.error.unwrap().contains("403"));
}

#[tokio::test]
async fn slow_page_times_out_as_failed_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/conv-4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let oracle = oracle_for(&server, bound_pool("conv-4"));
    let report = oracle
        .fetch("conv-4", Duration::from_millis(100))
        .await
        .unwrap();
    assert!(!report.is_success());
}

#[tokio::test]
async fn evicted_session_is_an_error() {
    let server = MockServer::start().await;
    let pool = bound_pool("conv-5");
    let second = pool.snapshot().unwrap()[1].id;
    pool.evict(second).unwrap();

    let oracle = oracle_for(&server, pool);
    let err = oracle
        .fetch("conv-5", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DoubaoError::SessionNotFound { .. }));
}
