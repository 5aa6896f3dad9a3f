// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::fmt::Debug;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use capc::cloud::{http_client_factory, CloudConfig};
use capc::constants::{
    CLOUD_CONFIG_FILE_ENV, ERROR_REQUEUE_DURATION_SECS, METRICS_SERVER_BIND_ADDRESS,
    METRICS_SERVER_PORT, TOKIO_WORKER_THREADS,
};
use capc::context::Context;
use capc::crd::{
    CloudStackAffinityGroup, CloudStackCluster, CloudStackFailureDomain,
    CloudStackIsolatedNetwork, CloudStackMachine, CloudStackMachineStateChecker,
};
use capc::metrics::{
    gather_metrics, record_error, record_reconciliation_error, record_reconciliation_requeue,
    record_reconciliation_success,
};
use capc::reconcilers::runner::{flow_to_action, Flow, StageResult};
use capc::reconcilers::{
    reconcile_affinity_group, reconcile_cks_cluster, reconcile_cks_machine,
    reconcile_cloudstack_cluster, reconcile_cloudstack_machine, reconcile_failure_domain,
    reconcile_isolated_network, reconcile_machine_state_checker,
};
use futures::StreamExt;
use kube::core::NamespaceResourceScope;
use kube::runtime::{controller::Action, watcher::Config, Controller};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("capc-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG for the filter and RUST_LOG_FORMAT for text/json
    // output, matching the deployment manifests.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting CloudStack infrastructure provider");

    // A configured cloud-config file must parse; per-failure-domain secrets
    // take over from there.
    if let Ok(path) = std::env::var(CLOUD_CONFIG_FILE_ENV) {
        let config = CloudConfig::from_file(Path::new(&path))?;
        info!(api_url = %config.api_url, "validated cloud-config file");
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let namespace = std::env::var("WATCH_NAMESPACE").ok();
    info!(
        "Watching {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    let ctx = Arc::new(Context::new(client.clone(), http_client_factory()));

    info!("Starting all controllers");

    // Controllers should never exit - if one does, log it and exit the
    // main process so the deployment restarts us.
    tokio::select! {
        result = run_controller(
            api_for::<CloudStackCluster>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackCluster",
            |ctx, cluster| async move { reconcile_cloudstack_cluster(ctx, cluster).await },
        ) => {
            error!("CRITICAL: CloudStackCluster controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackFailureDomain>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackFailureDomain",
            |ctx, fd| async move { reconcile_failure_domain(ctx, fd).await },
        ) => {
            error!("CRITICAL: CloudStackFailureDomain controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackIsolatedNetwork>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackIsolatedNetwork",
            |ctx, net| async move { reconcile_isolated_network(ctx, net).await },
        ) => {
            error!("CRITICAL: CloudStackIsolatedNetwork controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackMachine>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackMachine",
            |ctx, machine| async move { reconcile_cloudstack_machine(ctx, machine).await },
        ) => {
            error!("CRITICAL: CloudStackMachine controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackAffinityGroup>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackAffinityGroup",
            |ctx, group| async move { reconcile_affinity_group(ctx, group).await },
        ) => {
            error!("CRITICAL: CloudStackAffinityGroup controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackMachineStateChecker>(&client, namespace.as_deref()),
            ctx.clone(),
            "CloudStackMachineStateChecker",
            |ctx, checker| async move { reconcile_machine_state_checker(ctx, checker).await },
        ) => {
            error!("CRITICAL: CloudStackMachineStateChecker controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackCluster>(&client, namespace.as_deref()),
            ctx.clone(),
            "CksCloudStackCluster",
            |ctx, cluster| async move { reconcile_cks_cluster(ctx, cluster).await },
        ) => {
            error!("CRITICAL: CKS cluster controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_controller(
            api_for::<CloudStackMachine>(&client, namespace.as_deref()),
            ctx.clone(),
            "CksCloudStackMachine",
            |ctx, machine| async move { reconcile_cks_machine(ctx, machine).await },
        ) => {
            error!("CRITICAL: CKS machine controller exited unexpectedly: {:?}", result);
            result
        }
        result = run_observability_server() => {
            error!("CRITICAL: observability server exited unexpectedly: {:?}", result);
            result
        }
    }
}

/// Build a namespaced or cluster-wide API handle per the watch scope.
fn api_for<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Run one controller loop over a resource kind.
///
/// The wrapper converts the reconciler's [`Flow`] outcome into a
/// controller-runtime action and records metrics per invocation.
async fn run_controller<K, F, Fut>(
    api: Api<K>,
    ctx: Arc<Context>,
    kind: &'static str,
    reconcile: F,
) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    F: Fn(Arc<Context>, K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StageResult> + Send + 'static,
{
    info!("Starting {} controller", kind);

    Controller::new(api, Config::default())
        .run(
            move |resource: Arc<K>, ctx: Arc<Context>| {
                let started = Instant::now();
                let fut = reconcile(ctx, (*resource).clone());
                let name = resource.name_any();
                async move {
                    match fut.await {
                        Ok(flow) => {
                            match flow {
                                Flow::Requeue(_) => record_reconciliation_requeue(kind),
                                Flow::Proceed | Flow::Done => {
                                    record_reconciliation_success(kind, started.elapsed());
                                }
                            }
                            debug!(kind, name = %name, ?flow, "reconciled");
                            Ok(flow_to_action(flow, matches!(flow, Flow::Done)))
                        }
                        Err(e) => {
                            record_reconciliation_error(kind, started.elapsed());
                            record_error(kind, "reconcile");
                            error!(kind, name = %name, "Failed to reconcile: {:#}", e);
                            Err(ReconcileError(e))
                        }
                    }
                }
            },
            error_policy,
            ctx,
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Error policy for all controllers: fixed-interval retry on error.
fn error_policy(
    _resource: Arc<impl Debug>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve `/metrics`, `/healthz` and `/readyz`.
async fn run_observability_server() -> Result<()> {
    let port = std::env::var("METRICS_BIND_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(METRICS_SERVER_PORT);
    let addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");

    let app = Router::new()
        .route(
            "/metrics",
            get(|| async {
                gather_metrics().unwrap_or_else(|e| format!("# metrics encoding failed: {e}\n"))
            }),
        )
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));

    info!("Serving metrics and health endpoints on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
