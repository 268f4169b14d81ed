//! Full-engine test harness.
//!
//! [`TestEngine`] wires a [`ScriptedSource`] and an [`InMemoryCluster`] to a
//! [`Reconciler`] over a temp data directory, so a scenario test can stand up
//! a working engine in two lines. Extracted from the integration suite for
//! reuse across crate test suites.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use gitops_core::{Application, Destination, EngineConfig, Reconciler, SourceRef, SyncPolicy};

use crate::{InMemoryCluster, ScriptedSource};

/// Cluster name used by applications built through the harness.
pub const CLUSTER: &str = "test-cluster";

/// Default namespace used by applications built through the harness.
pub const NAMESPACE: &str = "default";

/// A reconciler wired to scriptable fakes on a temp data directory.
///
/// Workers are not started; call `engine.start()` for scenarios that need
/// background reconciliation. Dropping the harness removes the data
/// directory.
pub struct TestEngine {
    pub engine: Arc<Reconciler>,
    pub source: Arc<ScriptedSource>,
    pub cluster: Arc<InMemoryCluster>,
    temp: TempDir,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    /// Stand up an engine on a fresh temp data directory.
    ///
    /// # Panics
    /// Panics if the temp directory or the engine cannot be created.
    pub fn new() -> Self {
        let temp = TempDir::new()
            .unwrap_or_else(|e| panic!("TestEngine: failed to create temp dir: {e}"));
        let source = Arc::new(ScriptedSource::new());
        let cluster = Arc::new(InMemoryCluster::new());
        let engine = Reconciler::new(
            EngineConfig::new(temp.path()),
            source.clone(),
            cluster.clone(),
            cluster.clone(),
        )
        .unwrap_or_else(|e| panic!("TestEngine: failed to build engine: {e}"));
        Self {
            engine: Arc::new(engine),
            source,
            cluster,
            temp,
        }
    }

    /// Path of the engine's data directory.
    pub fn data_dir(&self) -> &Path {
        self.temp.path()
    }

    /// An application watching `pointer` on the scripted source, destined
    /// for [`CLUSTER`]/[`NAMESPACE`].
    pub fn app(name: &str, pointer: &str, policy: SyncPolicy) -> Application {
        Application::new(
            name,
            SourceRef::new("scripted", pointer, "."),
            Destination::new(CLUSTER, NAMESPACE),
            policy,
        )
    }

    /// Register an application built by [`app`](Self::app).
    ///
    /// # Panics
    /// Panics if registration fails. Tests exercising registration failures
    /// should call `engine.register` directly.
    pub async fn register(&self, name: &str, pointer: &str, policy: SyncPolicy) -> Application {
        let app = Self::app(name, pointer, policy);
        self.engine
            .register(app.clone())
            .await
            .unwrap_or_else(|e| panic!("TestEngine: failed to register {name}: {e}"));
        app
    }
}
