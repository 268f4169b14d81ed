//! The per-application control loop.
//!
//! One worker task per application consumes triggers from a single pending
//! slot; a shared ticker turns the drift interval into `Trigger::Drift` for
//! every registered application. All reconciliation for an application runs
//! under its lease, so there is never more than one in-flight run, and a
//! newer trigger supersedes an older run only at operation boundaries.

mod pipeline;
mod trigger;

pub use pipeline::{ReconcileOutcome, SyncMode};
pub use trigger::Trigger;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use gitops_diff::{NormalizeRules, diff};

use crate::application::{AggregateSync, AppStatus, Application, StatusCondition};
use crate::backend::{ExecutorBackend, LiveStateProvider, TrackingSelector};
use crate::error::Result;
use crate::history::{Initiator, SyncRecord};
use crate::provider::SourceProvider;
use crate::registry::{AppEntry, DataDir, Registry};
use pipeline::PipelineCtx;
use trigger::AppHandle;

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the engine's persisted state
    pub data_dir: PathBuf,

    /// How often every application is checked for drift
    pub drift_interval: Duration,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            drift_interval: Duration::from_secs(60),
        }
    }

    pub fn with_drift_interval(mut self, interval: Duration) -> Self {
        self.drift_interval = interval;
        self
    }
}

/// The reconciliation engine: registry, providers, and per-application
/// workers behind one handle.
pub struct Reconciler {
    config: EngineConfig,
    data: DataDir,
    registry: tokio::sync::Mutex<Registry>,
    source: Arc<dyn SourceProvider>,
    live: Arc<dyn LiveStateProvider>,
    backend: Arc<dyn ExecutorBackend>,
    handles: Mutex<HashMap<String, Arc<AppHandle>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl Reconciler {
    /// Load persisted state and wire up the providers. Workers are not
    /// spawned until [`start`](Self::start).
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn SourceProvider>,
        live: Arc<dyn LiveStateProvider>,
        backend: Arc<dyn ExecutorBackend>,
    ) -> Result<Self> {
        let data = DataDir::new(&config.data_dir);
        let registry = Registry::load(data.registry_path())?;
        let handles = registry
            .names()
            .into_iter()
            .map(|name| (name, Arc::new(AppHandle::new())))
            .collect();
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            data,
            registry: tokio::sync::Mutex::new(registry),
            source,
            live,
            backend,
            handles: Mutex::new(handles),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
        })
    }

    /// Spawn one worker per registered application plus the drift ticker,
    /// and nudge every application so restarts converge promptly.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let handles: Vec<(String, Arc<AppHandle>)> = self
            .handles_lock()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();
        for (name, handle) in &handles {
            self.spawn_worker(name.clone(), handle.clone());
        }
        for (_, handle) in &handles {
            handle.enqueue(Trigger::Revision);
        }
        self.spawn_ticker();
        info!(applications = handles.len(), "engine started");
    }

    /// Stop the ticker and every worker, waiting for them to finish their
    /// current operation boundary.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks_lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "worker join failed");
            }
        }
        info!("engine stopped");
    }

    /// Register an application and queue its first reconciliation.
    pub async fn register(self: &Arc<Self>, app: Application) -> Result<()> {
        let name = app.name.clone();
        self.registry.lock().await.add(app)?;

        let handle = Arc::new(AppHandle::new());
        self.handles_lock().insert(name.clone(), handle.clone());
        if self.started.load(Ordering::SeqCst) {
            self.spawn_worker(name.clone(), handle.clone());
        }
        handle.enqueue(Trigger::Revision);
        info!(app = %name, "application registered");
        Ok(())
    }

    /// Deregister an application and destroy its persisted state.
    ///
    /// An in-flight run is allowed to reach its next operation boundary
    /// before the state is removed.
    pub async fn deregister(&self, name: &str) -> Result<()> {
        let handle = self.handle(name)?;
        handle.retire();
        let _lease = handle.lease.lock().await;

        self.registry.lock().await.remove(name)?;
        self.data.remove_app_state(name)?;
        self.handles_lock().remove(name);
        info!(app = %name, "application deregistered");
        Ok(())
    }

    /// Synchronize now, superseding any in-flight automated run.
    ///
    /// Manual syncs always execute; the automated flag only gates triggers
    /// the engine generates itself.
    pub async fn sync(&self, name: &str) -> Result<ReconcileOutcome> {
        self.handle(name)?.bump();
        self.run_reconcile(name, SyncMode::Source, Initiator::Manual, false)
            .await
    }

    /// Replay an earlier revision as a brand-new sync.
    pub async fn rollback(&self, name: &str, revision: &str) -> Result<ReconcileOutcome> {
        self.handle(name)?.bump();
        self.run_reconcile(
            name,
            SyncMode::Pinned(revision.to_string()),
            Initiator::Rollback,
            false,
        )
        .await
    }

    /// Queue a revision trigger, as if the source had just moved.
    pub fn refresh(&self, name: &str) -> Result<()> {
        self.handle(name)?.enqueue(Trigger::Revision);
        Ok(())
    }

    /// One drift pass: compare live state against the last synced baseline,
    /// self-healing when the policy allows it.
    pub async fn check_drift(&self, name: &str) -> Result<ReconcileOutcome> {
        let handle = self.handle(name)?;
        let _lease = handle.lease.lock().await;
        let (app, prior) = self.snapshot(name).await?;
        let result = self.drift_pass(&handle, &app, &prior).await;
        self.finish(name, result).await
    }

    /// Current definition and status of one application.
    pub async fn status(&self, name: &str) -> Result<AppEntry> {
        self.registry.lock().await.get(name).map(AppEntry::clone)
    }

    /// All registered applications with their status.
    pub async fn list(&self) -> Vec<AppEntry> {
        self.registry.lock().await.entries().to_vec()
    }

    /// Full sync history of one application, oldest first.
    pub async fn history(&self, name: &str) -> Result<Vec<SyncRecord>> {
        self.registry.lock().await.get(name)?;
        self.data.history(name).load()
    }

    async fn run_reconcile(
        &self,
        name: &str,
        mode: SyncMode,
        initiator: Initiator,
        gate_execution: bool,
    ) -> Result<ReconcileOutcome> {
        let handle = self.handle(name)?;
        let _lease = handle.lease.lock().await;
        let (app, prior) = self.snapshot(name).await?;
        let token = handle.run_token();
        let result = pipeline::run(
            &self.ctx(),
            &app,
            &prior,
            mode,
            initiator,
            gate_execution,
            &token,
        )
        .await;
        self.finish(name, result).await
    }

    async fn drift_pass(
        &self,
        handle: &AppHandle,
        app: &Application,
        prior: &AppStatus,
    ) -> Result<(ReconcileOutcome, AppStatus)> {
        let Some(baseline) = self.data.load_baseline(&app.name)? else {
            // Nothing has ever synced; there is no baseline to drift from
            return Ok((ReconcileOutcome::UpToDate, prior.clone()));
        };

        let rules = NormalizeRules::new().with_ignore_paths(app.ignore_paths.iter().cloned());
        let live = self
            .live
            .list(&app.destination, &TrackingSelector::All)
            .await?;
        let report = diff(
            &app.name,
            &baseline.manifests,
            &live,
            &rules,
            &app.destination.namespace,
        );

        if !report.is_clean() && app.policy.self_heal && report.needs_sync(app.policy.prune) {
            let token = handle.run_token();
            return pipeline::run(
                &self.ctx(),
                app,
                prior,
                SyncMode::Baseline,
                Initiator::Automated,
                false,
                &token,
            )
            .await;
        }

        let mut status = prior.clone();
        status.condition = None;
        status.health = pipeline::assess_health(&self.ctx(), app, &baseline.manifests, &[]).await;

        if report.is_clean() {
            status.sync = AggregateSync::Synced;
            status.drift = None;
            return Ok((ReconcileOutcome::UpToDate, status));
        }

        let summary = pipeline::drift_summary(&report);
        warn!(
            app = %app.name,
            out_of_sync = summary.out_of_sync,
            missing = summary.missing,
            extra = summary.extra,
            conflicts = summary.conflicts,
            "drift detected"
        );
        status.sync = AggregateSync::OutOfSync;
        status.drift = Some(summary.clone());
        Ok((ReconcileOutcome::Drifted(summary), status))
    }

    /// Persist the status a run produced, or record its failure condition.
    async fn finish(
        &self,
        name: &str,
        result: Result<(ReconcileOutcome, AppStatus)>,
    ) -> Result<ReconcileOutcome> {
        match result {
            Ok((outcome, status)) => {
                self.registry
                    .lock()
                    .await
                    .update_status(name, |s| *s = status)?;
                Ok(outcome)
            }
            Err(e) => {
                if let Some(condition) = StatusCondition::from_error(&e) {
                    let persisted = self
                        .registry
                        .lock()
                        .await
                        .update_status(name, |s| s.condition = Some(condition));
                    if let Err(persist_err) = persisted {
                        warn!(app = %name, error = %persist_err, "failed to record condition");
                    }
                }
                Err(e)
            }
        }
    }

    async fn revision_pass(&self, name: &str) -> Result<ReconcileOutcome> {
        let (app, _) = self.snapshot(name).await?;
        let gate_execution = !app.policy.automated;
        self.run_reconcile(name, SyncMode::Source, Initiator::Automated, gate_execution)
            .await
    }

    async fn worker(self: Arc<Self>, name: String, handle: Arc<AppHandle>) {
        debug!(app = %name, "worker started");
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = handle.triggered() => {}
                _ = shutdown.changed() => break,
            }
            while let Some(trigger) = handle.take_pending() {
                if handle.is_retired() {
                    break;
                }
                let result = match trigger {
                    Trigger::Revision => self.revision_pass(&name).await,
                    Trigger::Drift => self.check_drift(&name).await,
                };
                if let Err(e) = result {
                    warn!(app = %name, ?trigger, error = %e, "background pass failed");
                }
            }
            if handle.is_retired() {
                break;
            }
        }
        debug!(app = %name, "worker stopped");
    }

    fn spawn_worker(self: &Arc<Self>, name: String, handle: Arc<AppHandle>) {
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.worker(name, handle).await });
        self.tasks_lock().push(task);
    }

    fn spawn_ticker(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut shutdown = engine.shutdown_tx.subscribe();
            let mut ticker = tokio::time::interval(engine.config.drift_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let handles: Vec<Arc<AppHandle>> =
                            engine.handles_lock().values().cloned().collect();
                        for handle in handles {
                            handle.enqueue(Trigger::Drift);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("drift ticker stopped");
        });
        self.tasks_lock().push(task);
    }

    fn ctx(&self) -> PipelineCtx<'_> {
        PipelineCtx {
            source: self.source.as_ref(),
            live: self.live.as_ref(),
            backend: self.backend.as_ref(),
            data: &self.data,
        }
    }

    async fn snapshot(&self, name: &str) -> Result<(Application, AppStatus)> {
        let registry = self.registry.lock().await;
        let entry = registry.get(name)?;
        Ok((entry.app.clone(), entry.status.clone()))
    }

    fn handle(&self, name: &str) -> Result<Arc<AppHandle>> {
        self.handles_lock()
            .get(name)
            .cloned()
            .ok_or_else(|| crate::Error::AppNotFound {
                name: name.to_string(),
            })
    }

    fn handles_lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AppHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks_lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
