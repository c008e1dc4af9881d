// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding must not depend on how the transport splits the body.

use doubao_client::StreamDecoder;
use doubao_core::{CompletionResult, DoubaoError};
use doubao_test_utils::fixtures::{
    gateway_error, image_delta, rate_limited, stream_end, stream_start, text_delta,
};
use proptest::prelude::*;

fn turn_body() -> String {
    let mut body = stream_start("conv-1", "msg-1", "section-1");
    body.push_str(&text_delta("\n你好，"));
    body.push_str(&text_delta("世界 🌏\n"));
    body.push_str(&image_delta(&[
        (2, Some("https://img.example.com/raw.png"), None, None),
        (1, Some("https://img.example.com/pending.png"), None, None),
    ]));
    body.push_str(&stream_end());
    body
}

/// Feeds `body` split at the given cut points (taken modulo its length).
fn decode_split(body: &[u8], cuts: &[usize]) -> Result<CompletionResult, DoubaoError> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    points.push(0);
    points.push(body.len());
    points.sort_unstable();
    points.dedup();

    let mut decoder = StreamDecoder::new();
    for window in points.windows(2) {
        if let Some(result) = decoder.feed(&body[window[0]..window[1]])? {
            return Ok(result);
        }
    }
    decoder.finish()
}

proptest! {
    #[test]
    fn completed_turn_is_split_invariant(cuts in prop::collection::vec(any::<usize>(), 0..24)) {
        let body = turn_body();
        let whole = decode_split(body.as_bytes(), &[]).unwrap();
        let split = decode_split(body.as_bytes(), &cuts).unwrap();
        prop_assert_eq!(&split, &whole);
        prop_assert_eq!(split.text.as_str(), "你好，世界 🌏");
        prop_assert_eq!(split.image_urls, vec!["https://img.example.com/raw.png".to_string()]);
    }

    #[test]
    fn rate_limit_is_split_invariant(cuts in prop::collection::vec(any::<usize>(), 0..16)) {
        let mut body = stream_start("conv-7", "msg-1", "section-1");
        body.push_str(&text_delta("partial"));
        body.push_str(&rate_limited());
        let err = decode_split(body.as_bytes(), &cuts).unwrap_err();
        let is_rate_limited = matches!(
            err,
            DoubaoError::RateLimited { conversation_id: Some(ref id) } if id == "conv-7"
        );
        prop_assert!(is_rate_limited);
    }

    #[test]
    fn gateway_error_is_split_invariant(cuts in prop::collection::vec(any::<usize>(), 0..16)) {
        let mut body = stream_start("conv-8", "msg-1", "section-1");
        body.push_str(&gateway_error(500, "busy"));
        let err = decode_split(body.as_bytes(), &cuts).unwrap_err();
        let is_gateway = matches!(
            err,
            DoubaoError::Gateway { ref code, ref message } if code == "500" && message == "busy"
        );
        prop_assert!(is_gateway);
    }
}
