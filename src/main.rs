// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Clustersnap controller entrypoint.
//!
//! Starts the Snapshot and Restore controllers against the configured
//! namespace, the periodic object-store syncer, and the Prometheus metrics
//! server, then runs until SIGINT/SIGTERM.

use anyhow::{bail, Result};
use axum::{routing::get, Router};
use clustersnap::cluster::ClusterCmd;
use clustersnap::constants::{
    DEFAULT_MAX_RETRY_MIN, DEFAULT_NAMESPACE, DEFAULT_RESTORE_WORKERS, DEFAULT_SNAPSHOT_WORKERS,
    DEFAULT_SYNC_PERIOD_SECS, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH,
    METRICS_SERVER_PORT, TOKIO_WORKER_THREADS,
};
use clustersnap::context::Context;
use clustersnap::crd::{ObjectstoreConfig, Restore, Snapshot};
use clustersnap::metrics;
use clustersnap::objectstore::DefaultBucketFactory;
use clustersnap::reconcilers::{
    error_policy_restore, error_policy_snapshot, reconcile_restore, reconcile_snapshot,
};
use clustersnap::syncer::{sync_objects, SyncToggles};
use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::controller::Config as RunnerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("clustersnap-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to
/// INFO level. Respects `RUST_LOG_FORMAT` environment variable for output
/// format (json or text).
fn initialize_logging() {
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

    info!("Starting Clustersnap controller");
}

/// Controller tunables, loaded from the environment with hard defaults.
struct ControllerSettings {
    namespace: String,
    snapshot_workers: usize,
    restore_workers: usize,
    max_retry_min: u64,
    housekeep_orphans: bool,
    restore_orphans: bool,
    validate_fileinfo: bool,
    insecure: bool,
    sync_period_secs: u64,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

/// Load controller settings from `CLUSTERSNAP_*` environment variables.
fn load_controller_settings() -> ControllerSettings {
    ControllerSettings {
        namespace: std::env::var("CLUSTERSNAP_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string()),
        snapshot_workers: env_parsed("CLUSTERSNAP_SNAPSHOT_THREADS", DEFAULT_SNAPSHOT_WORKERS),
        restore_workers: env_parsed("CLUSTERSNAP_RESTORE_THREADS", DEFAULT_RESTORE_WORKERS),
        max_retry_min: env_parsed("CLUSTERSNAP_MAX_RETRY_MIN", DEFAULT_MAX_RETRY_MIN),
        housekeep_orphans: env_parsed("CLUSTERSNAP_HOUSEKEEP_ORPHANS", false),
        restore_orphans: env_parsed("CLUSTERSNAP_RESTORE_ORPHANS", false),
        validate_fileinfo: env_parsed("CLUSTERSNAP_VALIDATE_FILEINFO", true),
        insecure: env_parsed("CLUSTERSNAP_INSECURE", false),
        sync_period_secs: env_parsed("CLUSTERSNAP_SYNC_PERIOD_SECS", DEFAULT_SYNC_PERIOD_SECS),
    }
}

/// Start the Prometheus metrics HTTP server
fn start_metrics_server() -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = METRICS_SERVER_BIND_ADDRESS,
        port = METRICS_SERVER_PORT,
        path = METRICS_SERVER_PATH,
        "Starting Prometheus metrics HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(metrics_text) => metrics_text,
                Err(e) => {
                    error!("Failed to gather metrics: {}", e);
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

        let bind_addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{METRICS_SERVER_PORT}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_addr}: {e}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_addr}{METRICS_SERVER_PATH}");

        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

/// Verify every configured bucket exists before accepting work.
///
/// A missing bucket or unresolvable credential is an unrecoverable setup
/// failure: the process exits non-zero.
async fn check_buckets(ctx: &Context) -> Result<()> {
    info!("Checking objectstore buckets");
    let configs: Api<ObjectstoreConfig> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let configs = configs.list(&ListParams::default()).await?;
    if configs.items.is_empty() {
        warn!("no ObjectstoreConfig found in namespace {}", ctx.namespace);
        return Ok(());
    }
    for config in configs.items {
        let name = config.metadata.name.clone().unwrap_or_default();
        let bucket = ctx.get_bucket(&name).await?;
        let found = bucket.chk_bucket().await?;
        if !found {
            bail!("Bucket {} not found", bucket.bucket_name());
        }
        info!(config = %name, bucket = bucket.bucket_name(), "bucket ready");
    }
    Ok(())
}

/// Run the Snapshot controller with the configured worker concurrency.
async fn run_snapshot_controller(ctx: Arc<Context>, workers: usize) -> Result<()> {
    info!(workers, "Starting Snapshot controller");
    let api: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    Controller::new(api, WatcherConfig::default())
        .with_config(RunnerConfig::default().concurrency(workers as u16))
        .run(reconcile_snapshot, error_policy_snapshot, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!("Snapshot controller event error: {e:?}");
            }
            futures::future::ready(())
        })
        .await;
    Ok(())
}

/// Run the Restore controller with the configured worker concurrency.
async fn run_restore_controller(ctx: Arc<Context>, workers: usize) -> Result<()> {
    info!(workers, "Starting Restore controller");
    let api: Api<Restore> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    Controller::new(api, WatcherConfig::default())
        .with_config(RunnerConfig::default().concurrency(workers as u16))
        .run(reconcile_restore, error_policy_restore, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!("Restore controller event error: {e:?}");
            }
            futures::future::ready(())
        })
        .await;
    Ok(())
}

/// Run the object-store syncer on its configured period.
async fn run_object_syncer(ctx: Arc<Context>, toggles: SyncToggles, period_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = sync_objects(&ctx, toggles).await {
            metrics::record_sync("error");
            error!("object-store sync failed: {e}");
        }
    }
}

async fn async_main() -> Result<()> {
    initialize_logging();

    let settings = load_controller_settings();
    info!(
        namespace = %settings.namespace,
        snapshot_workers = settings.snapshot_workers,
        restore_workers = settings.restore_workers,
        max_retry_min = settings.max_retry_min,
        "loaded controller settings"
    );

    let client = Client::try_default().await?;

    let ctx = Arc::new(Context {
        client,
        namespace: settings.namespace.clone(),
        cluster: Arc::new(ClusterCmd::new()),
        bucket_factory: Arc::new(DefaultBucketFactory),
        max_retry_min: settings.max_retry_min,
        insecure: settings.insecure,
    });

    check_buckets(&ctx).await?;

    let _metrics_handle = start_metrics_server();

    let toggles = SyncToggles {
        delete_orphans: settings.housekeep_orphans,
        restore_orphans: settings.restore_orphans,
        validate_fileinfo: settings.validate_fileinfo,
    };

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM, initiating graceful shutdown...");
            result
        }

        result = run_snapshot_controller(ctx.clone(), settings.snapshot_workers) => {
            error!("CRITICAL: Snapshot controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("Snapshot controller exited unexpectedly without error")
        }

        result = run_restore_controller(ctx.clone(), settings.restore_workers) => {
            error!("CRITICAL: Restore controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("Restore controller exited unexpectedly without error")
        }

        () = run_object_syncer(ctx.clone(), toggles, settings.sync_period_secs) => {
            anyhow::bail!("object-store syncer exited unexpectedly")
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}
