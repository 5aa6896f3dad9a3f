// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for retry and backoff behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;

#[test]
fn test_backoff_intervals_grow_and_cap() {
    let mut backoff = default_backoff();

    let first = backoff.next_backoff().unwrap();
    // ±10% jitter around 100ms.
    assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));

    // Drain a number of intervals; the raw interval doubles each time and
    // caps at the max.
    for _ in 0..20 {
        backoff.next_backoff();
    }
    assert!(backoff.current_interval <= Duration::from_secs(30));
}

#[test]
fn test_backoff_respects_max_elapsed_time() {
    let mut backoff = ExponentialBackoff {
        current_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(10),
        max_elapsed_time: Some(Duration::ZERO),
        multiplier: 2.0,
        randomization_factor: 0.0,
        start_time: std::time::Instant::now(),
    };
    assert!(backoff.next_backoff().is_none());
}

fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(Box::new(kube::core::ErrorResponse {
        status: Some(kube::core::response::StatusSummary::Failure),
        message: format!("code {code}"),
        reason: String::new(),
        code,
        ..Default::default()
    }))
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_errors() {
    let attempts = AtomicUsize::new(0);
    let value = retry_api_call(
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(api_error(503))
                } else {
                    Ok(42)
                }
            }
        },
        "test operation",
    )
    .await
    .unwrap();
    assert_eq!(value, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_fails_fast_on_client_error() {
    let attempts = AtomicUsize::new(0);
    let result: anyhow::Result<i32> = retry_api_call(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(api_error(404)) }
        },
        "test operation",
    )
    .await;
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "404 must not retry");
}

#[tokio::test]
async fn test_retry_treats_429_as_transient() {
    let attempts = AtomicUsize::new(0);
    let value = retry_api_call(
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(api_error(429))
                } else {
                    Ok("ok")
                }
            }
        },
        "test operation",
    )
    .await
    .unwrap();
    assert_eq!(value, "ok");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
