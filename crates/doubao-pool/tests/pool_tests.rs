// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the session pool.

use std::io::Write;
use std::sync::Arc;

use doubao_core::DoubaoError;
use doubao_pool::{SessionPool, SessionStatus};
use doubao_test_utils::fixtures::session_document;
use doubao_test_utils::{guest_session, test_session};
use proptest::prelude::*;

#[test]
fn loads_pool_from_document_on_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let doc = session_document(&[test_session(0), guest_session(1)]);
    file.write_all(doc.as_bytes()).unwrap();

    let pool = SessionPool::from_path(file.path()).unwrap();
    assert_eq!(pool.available().unwrap(), 2);
    let guest = pool.acquire(None, Some(true)).unwrap();
    assert_eq!(guest.session.device_id, "device-1");
    assert_eq!(guest.session.cookie_jar, "sessionid=secret-1; ttwid=tt-1");
}

#[test]
fn invalid_document_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"cookie": "", "device_id": "d", "tea_uuid": "t", "web_id": "w", "room_id": "r", "x_flow_trace": "f"}]"#)
        .unwrap();
    let err = SessionPool::from_path(file.path()).unwrap_err();
    assert!(matches!(err, DoubaoError::Config(ref msg) if msg.contains("record 0")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_binds_keep_one_session_per_conversation() {
    let pool = Arc::new(SessionPool::new((0..4).map(test_session).collect()));

    let mut handles = Vec::new();
    for n in 0..32 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let conversation_id = format!("conv-{}", n % 8);
            let picked = pool.acquire(Some(&conversation_id), None)?;
            pool.bind(&conversation_id, picked.id, false)?;
            Ok::<_, DoubaoError>((conversation_id, picked.id))
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut owners = std::collections::HashMap::new();
    for summary in pool.snapshot().unwrap() {
        if let SessionStatus::Bound { conversation_ids } = summary.status {
            for conversation_id in conversation_ids {
                assert!(
                    owners.insert(conversation_id.clone(), summary.id).is_none(),
                    "{conversation_id} bound twice"
                );
            }
        }
    }
    assert_eq!(owners.len(), 8);
}

#[derive(Debug, Clone)]
enum Op {
    Acquire(u8),
    Bind(u8, bool),
    EvictBoundTo(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6).prop_map(Op::Acquire),
        ((0u8..6), any::<bool>()).prop_map(|(c, r)| Op::Bind(c, r)),
        (0u8..6).prop_map(Op::EvictBoundTo),
    ]
}

proptest! {
    /// Once evicted, a session is never handed out again and conversations
    /// that were bound to it resolve to SessionNotFound.
    #[test]
    fn evicted_sessions_never_return(ops in prop::collection::vec(op(), 1..60)) {
        let pool = SessionPool::new((0..4).map(test_session).collect());
        let mut evicted = std::collections::HashSet::new();
        let mut orphaned = std::collections::HashSet::new();

        for op in ops {
            match op {
                Op::Acquire(c) => {
                    let conversation_id = format!("c{c}");
                    match pool.acquire(Some(&conversation_id), None) {
                        Ok(picked) => {
                            prop_assert!(!evicted.contains(&picked.id));
                            prop_assert!(!orphaned.contains(&conversation_id));
                        }
                        Err(DoubaoError::SessionNotFound { .. }) => {}
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                }
                Op::Bind(c, rate_limited) => {
                    let conversation_id = format!("c{c}");
                    if let Ok(picked) = pool.acquire(Some(&conversation_id), None) {
                        pool.bind(&conversation_id, picked.id, rate_limited).unwrap();
                    }
                }
                Op::EvictBoundTo(c) => {
                    let conversation_id = format!("c{c}");
                    if let Ok(picked) = pool.acquire(Some(&conversation_id), None) {
                        for summary in pool.snapshot().unwrap() {
                            if summary.id != picked.id {
                                continue;
                            }
                            if let SessionStatus::Bound { conversation_ids }
                            | SessionStatus::RateLimited { conversation_ids } = summary.status
                            {
                                orphaned.extend(conversation_ids);
                            }
                        }
                        pool.evict(picked.id).unwrap();
                        evicted.insert(picked.id);
                    }
                }
            }
        }

        for id in &evicted {
            prop_assert_eq!(pool.status(*id).unwrap(), Some(SessionStatus::Exhausted));
        }
    }
}
