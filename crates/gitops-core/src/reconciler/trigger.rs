//! Per-application trigger plumbing.
//!
//! Triggers do not queue. Each application has a single pending slot holding
//! the strongest outstanding request, a notification for its worker, and a
//! monotonic generation counter that tells an in-flight run when a newer
//! trigger has superseded it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, watch};

use crate::executor::RunToken;

/// Why an application should reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The source may have moved; resolve it fresh
    Revision,
    /// Periodic comparison against the last synced baseline
    Drift,
}

/// Runtime state for one application's worker.
#[derive(Debug)]
pub struct AppHandle {
    /// Held for the duration of a reconciliation; at most one in flight
    pub lease: tokio::sync::Mutex<()>,
    pending: Mutex<Option<Trigger>>,
    notify: Notify,
    generation: watch::Sender<u64>,
    retired: AtomicBool,
}

impl AppHandle {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            lease: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            notify: Notify::new(),
            generation,
            retired: AtomicBool::new(false),
        }
    }

    /// Queue a trigger, coalescing with whatever is already pending.
    ///
    /// Revision triggers also invalidate the in-flight run; drift ticks
    /// never do, since they compare against a baseline an in-flight sync is
    /// about to refresh anyway.
    pub fn enqueue(&self, trigger: Trigger) {
        {
            let mut slot = self.slot();
            let pending = slot.take();
            *slot = Some(coalesce(pending, trigger));
        }
        if trigger == Trigger::Revision {
            self.bump();
        }
        self.notify.notify_one();
    }

    /// Take the pending trigger, if any.
    pub fn take_pending(&self) -> Option<Trigger> {
        self.slot().take()
    }

    /// Wait until a trigger may be pending.
    pub async fn triggered(&self) {
        self.notify.notified().await;
    }

    /// Invalidate the in-flight run at its next operation boundary.
    pub fn bump(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Snapshot the current generation for a run that is about to start.
    pub fn run_token(&self) -> RunToken {
        RunToken::new(self.generation.subscribe())
    }

    /// Mark the application as deregistered and wake the worker so it exits.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.bump();
        self.notify.notify_one();
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Trigger>> {
        // The slot holds a plain Option; a poisoned guard is still usable
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for AppHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep the stronger of two outstanding triggers. A revision trigger implies
/// a fresh resolve, which covers everything a drift tick would find.
fn coalesce(pending: Option<Trigger>, incoming: Trigger) -> Trigger {
    match (pending, incoming) {
        (Some(Trigger::Revision), Trigger::Drift) => Trigger::Revision,
        (_, incoming) => incoming,
    }
}
