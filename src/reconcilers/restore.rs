// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Restore reconciliation: the phase machine for the Restore kind.
//!
//! The executor step resolves every indirection fresh on each pass (the
//! referenced Snapshot, the RestorePreference, the ObjectstoreConfig and
//! its Secret) under a read-only view, then runs the restore engine under
//! the retry budget. Missing references and a non-Completed snapshot are
//! invalid input: the phase fails immediately with the lookup error
//! verbatim.

use super::expire;
use super::retry::retry_engine;
use super::status::update_restore_status;
use super::{queue_step, QueueStep, ReconcileError};
use crate::constants::{
    DEFAULT_RESTORE_TTL, ERROR_REQUEUE_DURATION_SECS, PHASE_COMPLETED, PHASE_FAILED,
    PHASE_IN_PROGRESS, PHASE_IN_QUEUE, PHASE_NONE, REASON_PAST_AVAILABLE_UNTIL,
    REASON_RESTORE_STALE, REASON_SNAPSHOT_NOT_COMPLETED,
};
use crate::context::Context;
use crate::crd::{Restore, RestorePreference, Snapshot};
use crate::errors::{kube_error_message, EngineError};
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

/// Reconcile one Restore resource.
///
/// # Errors
///
/// Returns an error only for control-plane write failures; engine failures
/// surface as the `Failed` phase instead.
pub async fn reconcile_restore(
    restore: Arc<Restore>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_inner(&restore, &ctx).await;
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_reconciliation("Restore", status, start.elapsed());
    result.map_err(ReconcileError::from)
}

/// Error policy: requeue with a fixed delay.
pub fn error_policy_restore(
    _restore: Arc<Restore>,
    err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    error!(error = %err, "Restore reconcile failed");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

async fn reconcile_inner(restore: &Restore, ctx: &Context) -> Result<Action> {
    let api: Api<Restore> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let name = restore.name_any();

    match restore.phase() {
        PHASE_NONE => {
            match queue_step(
                restore.spec.available_until,
                restore.spec.ttl.as_deref(),
                DEFAULT_RESTORE_TTL,
                Utc::now(),
            ) {
                QueueStep::FailPast => {
                    info!(restore = %name, "AvailableUntil already past, not queuing");
                    update_restore_status(&api, restore, PHASE_FAILED, REASON_PAST_AVAILABLE_UNTIL)
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
                    info!(restore = %name, "Queued");
                    update_restore_status(&api, restore, PHASE_IN_QUEUE, "").await?;
                }
            }
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_IN_QUEUE => {
            let mut rest = update_restore_status(&api, restore, PHASE_IN_PROGRESS, "").await?;
            match run_restore(ctx, &mut rest).await {
                Ok(()) => {
                    update_restore_status(&api, &rest, PHASE_COMPLETED, "").await?;
                    info!(restore = %name, "Completed");
                }
                Err(e) => {
                    warn!(restore = %name, error = %e, "Restore failed");
                    update_restore_status(&api, &rest, PHASE_FAILED, &e.message()).await?;
                }
            }
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_IN_PROGRESS => {
            warn!(restore = %name, "found in-progress restore on startup");
            update_restore_status(&api, restore, PHASE_FAILED, REASON_RESTORE_STALE).await?;
            Ok(Action::requeue(Duration::ZERO))
        }

        PHASE_COMPLETED | PHASE_FAILED => handle_expiration(&api, restore).await,

        other => {
            warn!(restore = %name, phase = other, "unknown phase, ignoring");
            Ok(Action::await_change())
        }
    }
}

/// Executor body: resolve the snapshot, preference and bucket, then run the
/// restore engine under the retry budget.
async fn run_restore(ctx: &Context, rest: &mut Restore) -> Result<(), EngineError> {
    let snapshots: Api<Snapshot> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let snapshot = snapshots
        .get(&rest.spec.snapshot_name)
        .await
        .map_err(|e| EngineError::Permanent(anyhow!(kube_error_message(&e))))?;
    if snapshot.phase() != PHASE_COMPLETED {
        return Err(EngineError::Permanent(anyhow!(
            REASON_SNAPSHOT_NOT_COMPLETED
        )));
    }

    let preferences: Api<RestorePreference> =
        Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let preference = preferences
        .get(&rest.spec.restore_preference_name)
        .await
        .map_err(|e| EngineError::Permanent(anyhow!(kube_error_message(&e))))?;

    let bucket = ctx
        .get_bucket(&snapshot.spec.objectstore_config)
        .await
        .map_err(EngineError::Permanent)?;

    let deadline = Duration::from_secs(ctx.max_retry_min * 60);
    let restored = retry_engine(deadline, "restore", || {
        let mut attempt = rest.clone();
        let cluster = ctx.cluster.clone();
        let preference = preference.clone();
        let bucket = bucket.clone();
        async move {
            cluster
                .restore(&mut attempt, &preference, bucket.as_ref())
                .await
                .map(|()| attempt)
        }
    })
    .await?;
    *rest = restored;

    Ok(())
}

/// Materialize expiration onto the status, delete once past, requeue at the
/// expiry otherwise.
async fn handle_expiration(api: &Api<Restore>, restore: &Restore) -> Result<Action> {
    let name = restore.name_any();
    let creation = restore
        .metadata
        .creation_timestamp
        .as_ref()
        .map_or_else(Utc::now, |t| t.0);
    let expiration = expire::evaluate(
        creation,
        restore.spec.available_until,
        restore.spec.ttl.as_deref(),
        restore.status.as_ref().and_then(|s| s.available_until),
        Utc::now(),
    )
    .map_err(|e| anyhow!("evaluating expiration for {name}: {e}"))?;

    let mut restore = restore.clone();
    if let Some((until, ttl)) = expiration.set_status {
        info!(restore = %name, available_until = %until, "materializing expiration");
        let status = restore.status.get_or_insert_with(Default::default);
        status.available_until = Some(until);
        status.ttl = ttl;
        let phase = status.phase.clone();
        let reason = status.reason.clone();
        update_restore_status(api, &restore, &phase, &reason).await?;
    }

    if expiration.expired {
        info!(restore = %name, "expired, deleting");
        api.delete(&name, &DeleteParams::default()).await?;
        return Ok(Action::await_change());
    }

    match expiration.requeue_after {
        Some(after) => Ok(Action::requeue(after)),
        None => Ok(Action::await_change()),
    }
}
