// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the staged reconciliation pipeline.

use std::time::Duration;

use futures::future::BoxFuture;

use super::*;

/// Per-invocation spy context recording which stages ran.
#[derive(Default)]
struct SpyCtx {
    ran: Vec<&'static str>,
}

fn record<'a>(ctx: &'a mut SpyCtx, name: &'static str) -> BoxFuture<'a, StageResult> {
    Box::pin(async move {
        ctx.ran.push(name);
        proceed()
    })
}

fn stage_first<'a>(ctx: &'a mut SpyCtx) -> BoxFuture<'a, StageResult> {
    record(ctx, "first")
}

fn stage_requeues<'a>(ctx: &'a mut SpyCtx) -> BoxFuture<'a, StageResult> {
    Box::pin(async move {
        ctx.ran.push("requeues");
        requeue(7)
    })
}

fn stage_errors<'a>(ctx: &'a mut SpyCtx) -> BoxFuture<'a, StageResult> {
    Box::pin(async move {
        ctx.ran.push("errors");
        anyhow::bail!("stage failed")
    })
}

fn stage_spy<'a>(ctx: &'a mut SpyCtx) -> BoxFuture<'a, StageResult> {
    record(ctx, "spy")
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let mut ctx = SpyCtx::default();
    let stages = [
        Stage { name: "first", run: stage_first },
        Stage { name: "spy", run: stage_spy },
    ];
    let flow = run_stages(&mut ctx, &stages).await.unwrap();
    assert_eq!(flow, Flow::Proceed);
    assert_eq!(ctx.ran, vec!["first", "spy"]);
}

#[tokio::test]
async fn test_requeue_short_circuits_remaining_stages() {
    let mut ctx = SpyCtx::default();
    let stages = [
        Stage { name: "first", run: stage_first },
        Stage { name: "requeues", run: stage_requeues },
        Stage { name: "spy", run: stage_spy },
    ];
    let flow = run_stages(&mut ctx, &stages).await.unwrap();
    assert_eq!(flow, Flow::Requeue(Duration::from_secs(7)));
    assert_eq!(
        ctx.ran,
        vec!["first", "requeues"],
        "the spy stage must not run after a requeue"
    );
}

#[tokio::test]
async fn test_error_short_circuits_remaining_stages() {
    let mut ctx = SpyCtx::default();
    let stages = [
        Stage { name: "errors", run: stage_errors },
        Stage { name: "spy", run: stage_spy },
    ];
    let err = run_stages(&mut ctx, &stages).await.unwrap_err();
    assert!(err.to_string().contains("stage failed"));
    assert_eq!(ctx.ran, vec!["errors"]);
}

#[test]
fn test_flow_to_action_requeue_preserves_delay() {
    let action = flow_to_action(Flow::Requeue(Duration::from_secs(42)), false);
    assert_eq!(action, Action::requeue(Duration::from_secs(42)));
}

#[test]
fn test_flow_to_action_steady_state_intervals() {
    assert_eq!(
        flow_to_action(Flow::Done, true),
        Action::requeue(Duration::from_secs(300))
    );
    assert_eq!(
        flow_to_action(Flow::Done, false),
        Action::requeue(Duration::from_secs(30))
    );
}
