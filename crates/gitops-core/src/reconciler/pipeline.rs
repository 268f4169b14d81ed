//! One reconciliation run, from resolve to record.
//!
//! The pipeline is deliberately free of worker machinery: given providers, a
//! definition, and the prior status, it produces an outcome plus the status
//! the application should carry afterwards. The caller owns persistence of
//! that status and all locking.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{info, warn};

use gitops_diff::{NormalizeRules, diff};
use gitops_model::ResourceManifest;

use crate::application::{AggregateSync, AppStatus, Application, DriftSummary, PlanSummary};
use crate::backend::{ExecutorBackend, LiveStateProvider, TrackingSelector};
use crate::error::Result;
use crate::executor::{RetryPolicy, RunToken, run_plan};
use crate::health::{HealthStatus, resource_health};
use crate::history::{Initiator, OpResult, ResourceOutcome, SyncPhase, SyncRecord};
use crate::plan::{build_plan, validate_manifest_set};
use crate::provider::{ResolvedSource, SourceProvider};
use crate::registry::{Baseline, DataDir};

/// Where a run's desired state comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Resolve the application's configured revision pointer
    Source,
    /// Replay the baseline of the last successful sync
    Baseline,
    /// Resolve a specific revision, for rollback
    Pinned(String),
}

/// What a run concluded.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The executor ran; here is its record
    Synced(SyncRecord),
    /// The plan is non-empty but execution is gated on a manual trigger
    Planned(PlanSummary),
    /// Divergence was found and reported, but self-heal is off
    Drifted(DriftSummary),
    /// Nothing to do
    UpToDate,
}

/// Borrowed provider set for one run.
pub(crate) struct PipelineCtx<'a> {
    pub source: &'a dyn SourceProvider,
    pub live: &'a dyn LiveStateProvider,
    pub backend: &'a dyn ExecutorBackend,
    pub data: &'a DataDir,
}

/// Run one reconciliation and compute the application's next status.
///
/// With `gate_execution` set, a non-empty plan is surfaced instead of run.
/// Nothing is recorded in that case; records only ever follow the executor.
pub(crate) async fn run(
    ctx: &PipelineCtx<'_>,
    app: &Application,
    prior: &AppStatus,
    mode: SyncMode,
    initiator: Initiator,
    gate_execution: bool,
    token: &RunToken,
) -> Result<(ReconcileOutcome, AppStatus)> {
    let started_at = Utc::now();

    let resolved = match &mode {
        SyncMode::Source => ctx.source.resolve(&app.source).await?,
        SyncMode::Pinned(revision) => {
            let mut source = app.source.clone();
            source.revision = revision.clone();
            ctx.source.resolve(&source).await?
        }
        SyncMode::Baseline => match ctx.data.load_baseline(&app.name)? {
            Some(baseline) => ResolvedSource::new(baseline.revision, baseline.manifests),
            // Nothing has ever synced, so there is nothing to heal against
            None => return Ok((ReconcileOutcome::UpToDate, prior.clone())),
        },
    };

    validate_manifest_set(&resolved.manifests, &app.destination.namespace)?;

    let rules = NormalizeRules::new().with_ignore_paths(app.ignore_paths.iter().cloned());
    let live = ctx
        .live
        .list(&app.destination, &TrackingSelector::All)
        .await?;
    let report = diff(
        &app.name,
        &resolved.manifests,
        &live,
        &rules,
        &app.destination.namespace,
    );
    let plan = build_plan(
        &resolved.revision,
        &report,
        &resolved.manifests,
        &app.policy,
        &app.destination.namespace,
    );

    // Providers answered, so any outage condition is stale from here on
    let mut status = prior.clone();
    status.condition = None;
    status.drift = None;

    if plan.is_noop() {
        status.pending = None;

        // A noop plan over a dirty report means owned extras are lingering
        // with prune disabled. Nothing is executable, but the application is
        // not in sync either.
        if !report.is_clean() {
            let summary = drift_summary(&report);
            warn!(
                app = %app.name,
                extra = summary.extra,
                "owned extras persist with prune disabled"
            );
            status.sync = AggregateSync::OutOfSync;
            status.drift = Some(summary.clone());
            status.health = assess_health(ctx, app, &resolved.manifests, &[]).await;
            return Ok((ReconcileOutcome::Drifted(summary), status));
        }

        // Live state already matches this revision; move the baseline
        // forward so self-heal converges on it. No record: records only
        // ever follow the executor.
        if mode != SyncMode::Baseline
            && prior.last_synced_revision.as_deref() != Some(resolved.revision.as_str())
        {
            ctx.data.save_baseline(
                &app.name,
                &Baseline {
                    revision: resolved.revision.clone(),
                    manifests: resolved.manifests.clone(),
                },
            )?;
            status.last_synced_revision = Some(resolved.revision.clone());
        }
        status.sync = AggregateSync::Synced;
        status.health = assess_health(ctx, app, &resolved.manifests, &[]).await;
        return Ok((ReconcileOutcome::UpToDate, status));
    }

    if gate_execution {
        let summary = PlanSummary {
            revision: resolved.revision.clone(),
            operations: plan.describe(),
        };
        info!(
            app = %app.name,
            revision = %summary.revision,
            operations = summary.operations.len(),
            "plan awaiting manual trigger"
        );
        status.sync = AggregateSync::OutOfSync;
        status.pending = Some(summary.clone());
        status.health = assess_health(ctx, app, &resolved.manifests, &[]).await;
        return Ok((ReconcileOutcome::Planned(summary), status));
    }

    let retry = RetryPolicy::with_limit(app.policy.retry_limit);
    let exec = run_plan(
        ctx.backend,
        &app.destination,
        &app.marker,
        &plan,
        &retry,
        token,
    )
    .await;

    let mut outcomes = exec.outcomes;
    for skip in &plan.skipped {
        outcomes.push(ResourceOutcome::failed(
            skip.id.clone(),
            skip.action,
            skip.kind,
            skip.message.clone(),
        ));
    }
    let phase = match exec.phase {
        SyncPhase::Succeeded if !plan.skipped.is_empty() => SyncPhase::Failed,
        phase => phase,
    };

    let record = SyncRecord::new(&plan.revision, initiator, phase, started_at, outcomes);
    ctx.data.history(&app.name).append(&record)?;
    info!(
        app = %app.name,
        revision = %record.revision,
        phase = ?record.phase,
        operations = record.outcomes.len(),
        "sync finished"
    );

    if record.is_success() {
        if mode != SyncMode::Baseline {
            ctx.data.save_baseline(
                &app.name,
                &Baseline {
                    revision: plan.revision.clone(),
                    manifests: resolved.manifests.clone(),
                },
            )?;
        }
        status.last_synced_revision = Some(plan.revision.clone());
        status.sync = AggregateSync::Synced;
    } else {
        status.sync = AggregateSync::OutOfSync;
    }
    status.pending = None;
    status.health = assess_health(ctx, app, &resolved.manifests, &record.outcomes).await;

    Ok((ReconcileOutcome::Synced(record), status))
}

/// Application health: the worst of every tracked resource's health, with
/// desired-but-absent resources counted as missing and any failed outcome
/// from the run just finished counted as degraded.
pub(crate) async fn assess_health(
    ctx: &PipelineCtx<'_>,
    app: &Application,
    desired: &[ResourceManifest],
    outcomes: &[ResourceOutcome],
) -> HealthStatus {
    let tracked = match ctx
        .live
        .list(
            &app.destination,
            &TrackingSelector::Application(app.name.clone()),
        )
        .await
    {
        Ok(tracked) => tracked,
        Err(e) => {
            warn!(app = %app.name, error = %e, "health listing failed");
            return HealthStatus::Unknown;
        }
    };

    let live_ids: HashSet<_> = tracked.iter().map(|r| r.id.clone()).collect();
    let mut statuses: Vec<HealthStatus> = tracked.iter().map(resource_health).collect();
    for manifest in desired {
        if !live_ids.contains(&manifest.id_in(&app.destination.namespace)) {
            statuses.push(HealthStatus::Missing);
        }
    }
    if outcomes
        .iter()
        .any(|o| matches!(o.result, OpResult::Failed { .. }))
    {
        statuses.push(HealthStatus::Degraded);
    }

    HealthStatus::aggregate(statuses)
}

/// Summarize a diff report for the drift status field.
pub(crate) fn drift_summary(report: &gitops_diff::DiffReport) -> DriftSummary {
    use gitops_diff::SyncState;

    let count = |state: SyncState| report.entries.iter().filter(|e| e.state == state).count();
    DriftSummary {
        detected_at: Utc::now(),
        out_of_sync: count(SyncState::OutOfSync),
        missing: count(SyncState::Missing),
        extra: count(SyncState::Extra),
        conflicts: count(SyncState::Conflict),
    }
}
