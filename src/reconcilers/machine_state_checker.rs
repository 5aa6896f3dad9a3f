// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStackMachineStateChecker reconciliation logic.
//!
//! A liveness loop, not a one-shot reconcile: every tick compares the
//! CloudStack VM state against the CAPI machine phase. A VM that CloudStack
//! reports not-Running, or a CAPI machine stuck non-Running for more than
//! five minutes while the VM runs (a stuck-bootstrap detector), gets its
//! CAPI Machine deleted so the replica authority re-provisions it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::api::DeleteParams;
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use crate::capi::Machine;
use crate::constants::{
    MACHINE_STATE_CHECK_INTERVAL_SECS, MACHINE_STUCK_TIMEOUT_SECS, VM_STATE_RUNNING,
};
use crate::context::Context;
use crate::crd::{
    CloudStackFailureDomain, CloudStackMachine, CloudStackMachineStateChecker,
    CloudStackMachineStateCheckerStatus,
};
use crate::reconcilers::runner::{
    done, get_owner_of_kind, patch_status, requeue, StageResult,
};

/// CAPI machine phase indicating a healthy machine.
const CAPI_PHASE_RUNNING: &str = "Running";

/// Decision of one watchdog tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Both sides agree the machine runs.
    Healthy,

    /// The machine must be recycled (CAPI Machine deleted).
    Recycle,

    /// Not healthy yet, but within tolerances; keep polling.
    Wait,
}

/// Evaluate one tick of the state checker.
///
/// * CloudStack not-Running → recycle.
/// * CloudStack Running + CAPI Running → healthy.
/// * CloudStack Running + CAPI stuck non-Running past the timeout → recycle.
/// * Otherwise → wait.
#[must_use]
pub fn checker_verdict(
    cloudstack_state: Option<&str>,
    capi_phase: Option<&str>,
    capi_phase_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Verdict {
    if cloudstack_state != Some(VM_STATE_RUNNING) {
        return Verdict::Recycle;
    }
    if capi_phase == Some(CAPI_PHASE_RUNNING) {
        return Verdict::Healthy;
    }
    match capi_phase_since {
        Some(since) if (now - since).num_seconds() > MACHINE_STUCK_TIMEOUT_SECS => {
            Verdict::Recycle
        }
        _ => Verdict::Wait,
    }
}

/// Reconciles a `CloudStackMachineStateChecker` resource.
///
/// Always reschedules itself on the poll interval; this reconciler never
/// reaches a terminal state while its machine exists.
///
/// # Errors
///
/// Returns an error when CloudStack or Kubernetes operations fail.
pub async fn reconcile_machine_state_checker(
    ctx: Arc<Context>,
    checker: CloudStackMachineStateChecker,
) -> StageResult {
    let namespace = checker.namespace().unwrap_or_default();
    let name = checker.name_any();
    debug!("Checking machine state: {}/{}", namespace, name);

    if checker.metadata.deletion_timestamp.is_some() {
        // No cloud resources of its own; garbage collection handles the rest.
        return done();
    }

    // The owning CloudStackMachine, then its owning CAPI Machine.
    let Some(cs_machine) =
        get_owner_of_kind::<CloudStackMachine>(&ctx.client, &checker).await?
    else {
        return requeue(MACHINE_STATE_CHECK_INTERVAL_SECS);
    };
    let Some(capi_machine) = get_owner_of_kind::<Machine>(&ctx.client, &cs_machine).await? else {
        return requeue(MACHINE_STATE_CHECK_INTERVAL_SECS);
    };

    // Scoped client through the machine's failure domain.
    let Some(fd_name) = cs_machine.spec.failure_domain_name.clone() else {
        return requeue(MACHINE_STATE_CHECK_INTERVAL_SECS);
    };
    let fd_api: Api<CloudStackFailureDomain> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(failure_domain) = fd_api.get_opt(&fd_name).await? else {
        return requeue(MACHINE_STATE_CHECK_INTERVAL_SECS);
    };
    let (cloud, _domain_id) = ctx.failure_domain_manager(&failure_domain).await?;

    // Fresh VM state; a vanished VM reports as not-Running.
    let mut probe = cs_machine.clone();
    let cloudstack_state = match cloud.resolve_vm_instance_details(&mut probe).await {
        Ok(()) => probe
            .status
            .as_ref()
            .and_then(|s| s.instance_state.clone()),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    let capi_phase = capi_machine
        .status
        .as_ref()
        .and_then(|s| s.phase.clone());
    let capi_phase_since = capi_machine.status.as_ref().and_then(|s| s.last_updated);

    let verdict = checker_verdict(
        cloudstack_state.as_deref(),
        capi_phase.as_deref(),
        capi_phase_since,
        Utc::now(),
    );
    debug!(?verdict, ?cloudstack_state, ?capi_phase, "state checker tick");

    match verdict {
        Verdict::Healthy => {
            let ready = checker.status.as_ref().is_some_and(|s| s.ready);
            if !ready {
                patch_status(
                    &ctx.client,
                    &checker,
                    &CloudStackMachineStateCheckerStatus { ready: true },
                )
                .await?;
            }
        }
        Verdict::Recycle => {
            warn!(
                machine = %capi_machine.name_any(),
                ?cloudstack_state,
                ?capi_phase,
                "machine state check failed, deleting CAPI machine"
            );
            let api: Api<Machine> = Api::namespaced(ctx.client.clone(), &namespace);
            if capi_machine.metadata.deletion_timestamp.is_none() {
                match api
                    .delete(&capi_machine.name_any(), &DeleteParams::default())
                    .await
                {
                    Ok(_) => info!("Deleted CAPI Machine {}", capi_machine.name_any()),
                    Err(kube::Error::Api(e)) if e.code == 404 => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Verdict::Wait => {}
    }

    // Liveness loop: always poll again.
    requeue(MACHINE_STATE_CHECK_INTERVAL_SECS)
}

#[cfg(test)]
#[path = "machine_state_checker_tests.rs"]
mod machine_state_checker_tests;
