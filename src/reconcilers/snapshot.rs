// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Snapshot reconciliation: the phase machine for the Snapshot kind.
//!
//! One reconcile pass performs one phase step and requeues. The queuer step
//! (phase "") only writes defaults and the `InQueue` phase; the executor
//! step (`InQueue`) runs the snapshot engine and the upload under the retry
//! budget. A resource observed `InProgress` at reconcile entry can only be
//! left over from a stopped controller, since the executor moves to a
//! terminal phase before returning.

use super::expire;
use super::retry::retry_engine;
use super::status::update_snapshot_status;
use super::{queue_step, QueueStep, ReconcileError};
use crate::constants::{
    DEFAULT_SNAPSHOT_TTL, ERROR_REQUEUE_DURATION_SECS, PHASE_COMPLETED, PHASE_FAILED,
    PHASE_IN_PROGRESS, PHASE_IN_QUEUE, PHASE_NONE, REASON_PAST_AVAILABLE_UNTIL,
    REASON_SNAPSHOT_STALE,
};
use crate::context::Context;
use crate::crd::Snapshot;
use crate::errors::EngineError;
use crate::metrics;
use anyhow::{anyhow, Result};
use chrono::Utc;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Reconcile one Snapshot resource.
///
/// # Errors
///
/// Returns an error only for control-plane write failures; engine failures
/// surface as the `Failed` phase instead.
pub async fn reconcile_snapshot(
    snapshot: Arc<Snapshot>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_inner(&snapshot, &ctx).await;
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_reconciliation("Snapshot", status, start.elapsed());
    result.map_err(ReconcileError::from)
}

/// Error policy: requeue with a fixed delay; the phase machine keeps its
/// own retry budget for engine work.
pub fn error_policy_snapshot(
    _snapshot: Arc<Snapshot>,
    err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    error!(error = %err, "Snapshot reconcile failed");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

async fn reconcile_inner(snapshot: &Snapshot, ctx: &Context) -> Result<Action> {
    let api: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let name = snapshot.name_any();

    match snapshot.phase() {
        PHASE_NONE => {
            match queue_step(
                snapshot.spec.available_until,
                snapshot.spec.ttl.as_deref(),
                DEFAULT_SNAPSHOT_TTL,
                Utc::now(),
            ) {
                QueueStep::FailPast => {
                    info!(snapshot = %name, "AvailableUntil already past, not queuing");
                    update_snapshot_status(&api, snapshot, PHASE_FAILED, REASON_PAST_AVAILABLE_UNTIL)
                        .await?;
                }
                QueueStep::Queue { set_default_ttl } => {
                    if let Some(ttl) = set_default_ttl {
                        api.patch(
                            &name,
                            &PatchParams::default(),
                            &Patch::Merge(json!({ "spec": { "ttl": ttl } })),
                        )
                        .await?;
                    }
                    info!(snapshot = %name, "Queued");
                    update_snapshot_status(&api, snapshot, PHASE_IN_QUEUE, "").await?;
                }
            }
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_IN_QUEUE => {
            let mut snap =
                update_snapshot_status(&api, snapshot, PHASE_IN_PROGRESS, "").await?;
            match run_snapshot(ctx, &mut snap).await {
                Ok(()) => {
                    update_snapshot_status(&api, &snap, PHASE_COMPLETED, "").await?;
                    info!(snapshot = %name, "Completed");
                }
                Err(e) => {
                    warn!(snapshot = %name, error = %e, "Snapshot failed");
                    update_snapshot_status(&api, &snap, PHASE_FAILED, &e.message()).await?;
                }
            }
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_IN_PROGRESS => {
            // Only a stopped controller leaves this phase behind.
            warn!(snapshot = %name, "found in-progress snapshot on startup");
            update_snapshot_status(&api, snapshot, PHASE_FAILED, REASON_SNAPSHOT_STALE).await?;
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_COMPLETED | PHASE_FAILED => handle_expiration(&api, snapshot, ctx).await,

        other => {
            warn!(snapshot = %name, phase = other, "unknown phase, ignoring");
            Ok(Action::await_change())
        }
    }
}

/// Executor body: resolve the bucket, take the snapshot, upload it. Both
/// engine calls run under the per-operation retry budget.
async fn run_snapshot(ctx: &Context, snap: &mut Snapshot) -> Result<(), EngineError> {
    let bucket = ctx
        .get_bucket(&snap.spec.objectstore_config)
        .await
        .map_err(EngineError::Permanent)?;

    let deadline = Duration::from_secs(ctx.max_retry_min * 60);

    let snapped = retry_engine(deadline, "snapshot", || {
        let mut attempt = snap.clone();
        let cluster = ctx.cluster.clone();
        async move { cluster.snapshot(&mut attempt).await.map(|()| attempt) }
    })
    .await?;
    *snap = snapped;

    let uploaded = retry_engine(deadline, "upload snapshot", || {
        let mut attempt = snap.clone();
        let cluster = ctx.cluster.clone();
        let bucket = bucket.clone();
        async move {
            cluster
                .upload_snapshot(&mut attempt, bucket.as_ref())
                .await
                .map(|()| attempt)
        }
    })
    .await?;
    *snap = uploaded;

    Ok(())
}

/// Materialize expiration onto the status, delete once past, requeue at the
/// expiry otherwise.
async fn handle_expiration(
    api: &Api<Snapshot>,
    snapshot: &Snapshot,
    ctx: &Context,
) -> Result<Action> {
    let name = snapshot.name_any();
    let creation = snapshot
        .metadata
        .creation_timestamp
        .as_ref()
        .map_or_else(Utc::now, |t| t.0);
    let expiration = expire::evaluate(
        creation,
        snapshot.spec.available_until,
        snapshot.spec.ttl.as_deref(),
        snapshot.status.as_ref().and_then(|s| s.available_until),
        Utc::now(),
    )
    .map_err(|e| anyhow!("evaluating expiration for {name}: {e}"))?;

    let mut snapshot = snapshot.clone();
    if let Some((until, ttl)) = expiration.set_status {
        info!(snapshot = %name, available_until = %until, "materializing expiration");
        let status = snapshot.status.get_or_insert_with(Default::default);
        status.available_until = Some(until);
        status.ttl = ttl;
        let phase = status.phase.clone();
        let reason = status.reason.clone();
        snapshot = update_snapshot_status(api, &snapshot, &phase, &reason).await?;
    }

    if expiration.expired {
        info!(snapshot = %name, "expired, deleting");
        delete_snapshot_archive(ctx, &snapshot).await;
        api.delete(&name, &DeleteParams::default()).await?;
        return Ok(Action::await_change());
    }

    match expiration.requeue_after {
        Some(after) => Ok(Action::requeue(after)),
        None => Ok(Action::await_change()),
    }
}

/// Best-effort deletion of an expired snapshot's archive object.
async fn delete_snapshot_archive(ctx: &Context, snapshot: &Snapshot) {
    let object_name = snapshot.object_name();
    match ctx.get_bucket(&snapshot.spec.objectstore_config).await {
        Ok(bucket) => {
            if let Err(e) = bucket.delete(&object_name).await {
                warn!(object = %object_name, "could not delete archive: {e}");
            }
        }
        Err(e) => warn!(object = %object_name, "could not resolve bucket: {e}"),
    }
}
