// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use doubao_client::{ChatAttachment, ChatClient, UploadClient};
use doubao_config::model::{PlatformConfig, UploadConfig};
use doubao_core::{DoubaoError, TaskKey, VideoTaskStatus};
use doubao_pool::SessionPool;
use doubao_test_utils::fixtures::simple_turn;
use doubao_test_utils::{MemoryTaskStore, MockOracle, test_session};
use doubao_video::{
    RetrySchedule, VideoGenerationService, VideoImage, VideoRequest, VideoRetryScheduler,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    service: VideoGenerationService,
    store: MemoryTaskStore,
    oracle: MockOracle,
}

fn harness(server: &MockServer) -> Harness {
    let platform = PlatformConfig {
        base_url: server.uri(),
        ..PlatformConfig::default()
    };
    let upload = UploadConfig {
        imagex_url: format!("{}/", server.uri()),
        upload_url: format!("{}/upload/v1", server.uri()),
        ..UploadConfig::default()
    };
    let pool = Arc::new(SessionPool::new(vec![test_session(0)]));
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::new();
    let scheduler = VideoRetryScheduler::new(
        Arc::new(store.clone()),
        Arc::new(oracle.clone()),
        RetrySchedule {
            warmup: Duration::from_secs(60),
            retry_interval: Duration::from_secs(60),
            max_retries: 2,
            oracle_timeout: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        },
    );
    let service = VideoGenerationService::new(
        ChatClient::new(platform.clone(), Arc::clone(&pool)).unwrap(),
        UploadClient::new(platform, upload, pool).unwrap(),
        scheduler,
    );
    Harness {
        service,
        store,
        oracle,
    }
}

async fn sent_message(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/samantha/chat/completion")
        .unwrap();
    let body: Value = serde_json::from_slice(&chat.body).unwrap();
    body["messages"][0].clone()
}

#[tokio::test]
async fn text_to_video_submits_pending_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/samantha/chat/completion"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(simple_turn("conv-v", "msg-v", &["正在生成"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let ticket = h
        .service
        .generate(VideoRequest::new("a sunset over the sea, 5 seconds"))
        .await
        .unwrap();

    assert_eq!(ticket.conversation_id, "conv-v");
    assert_eq!(ticket.message_id, "msg-v");
    assert_eq!(ticket.reply, "正在生成");
    assert_eq!(ticket.task.status, VideoTaskStatus::Pending);
    assert_eq!(ticket.task.max_retries, 2);

    let key = TaskKey::new("conv-v", "msg-v");
    assert!(h.store.history().await.iter().any(|t| t.key() == key));
    assert_eq!(h.service.scheduler().active_jobs().unwrap(), vec![key]);

    let message = sent_message(&server).await;
    assert_eq!(message["content_type"], 2020);
    assert_eq!(message["attachments"], json!([]));
    assert_eq!(h.oracle.call_count().await, 0);
    h.service.scheduler().shutdown().await.unwrap();
}

#[tokio::test]
async fn prebuilt_image_attachment_is_sent_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/samantha/chat/completion"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(simple_turn("conv-i", "msg-i", &["ok"]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let attachment = json!({
        "type": "vlm_image",
        "key": "tos-cn-i-abc/cat.jpeg",
        "name": "cat.jpeg",
        "file_review_state": 3,
        "file_parse_state": 3,
        "identifier": "fixed-id",
    });
    let h = harness(&server);
    h.service
        .generate(
            VideoRequest::new("make it move")
                .with_image(VideoImage::Attachment(ChatAttachment::Raw(attachment.clone()))),
        )
        .await
        .unwrap();

    let message = sent_message(&server).await;
    assert_eq!(message["attachments"], json!([attachment]));
    h.service.scheduler().shutdown().await.unwrap();
}

#[tokio::test]
async fn turn_without_message_id_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/samantha/chat/completion"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(simple_turn("conv-x", "", &["hm"]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let h = harness(&server);
    let err = h
        .service
        .generate(VideoRequest::new("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, DoubaoError::Protocol { .. }));
    assert!(h.service.scheduler().active_jobs().unwrap().is_empty());
    assert!(h.store.history().await.is_empty());
}
