//! Persisted application registry and on-disk data layout.
//!
//! The registry is the engine's source of truth for which applications exist
//! and what their last known status was. It is a single TOML file, rewritten
//! atomically on every change, so a crash mid-save never corrupts it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gitops_model::ResourceManifest;

use crate::application::{AppStatus, Application};
use crate::error::{Error, Result};
use crate::history::HistoryLog;
use crate::persist;

/// Registry schema version written to new files
const REGISTRY_VERSION: &str = "1";

/// One registered application plus its runtime status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub app: Application,
    #[serde(default)]
    pub status: AppStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: String,
    #[serde(default)]
    applications: Vec<AppEntry>,
}

/// The set of registered applications, persisted as `applications.toml`.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    entries: Vec<AppEntry>,
}

impl Registry {
    /// Load the registry, treating a missing file as empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match persist::read_locked(&path)? {
            Some(content) => toml::from_str::<RegistryFile>(&content)?.applications,
            None => Vec::new(),
        };
        Ok(Self { path, entries })
    }

    /// Write the registry back to disk.
    pub fn save(&self) -> Result<()> {
        let file = RegistryFile {
            version: REGISTRY_VERSION.to_string(),
            applications: self.entries.clone(),
        };
        let content = toml::to_string_pretty(&file)?;
        persist::write_atomic(&self.path, content.as_bytes())
    }

    /// Register a new application and persist the change.
    pub fn add(&mut self, app: Application) -> Result<()> {
        validate_name(&app.name)?;
        if self.entries.iter().any(|e| e.app.name == app.name) {
            return Err(Error::AppExists { name: app.name });
        }
        self.entries.push(AppEntry {
            app,
            status: AppStatus::default(),
        });
        self.save()
    }

    /// Remove an application and persist the change.
    pub fn remove(&mut self, name: &str) -> Result<AppEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.app.name == name)
            .ok_or_else(|| Error::AppNotFound {
                name: name.to_string(),
            })?;
        let entry = self.entries.remove(idx);
        self.save()?;
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Result<&AppEntry> {
        self.entries
            .iter()
            .find(|e| e.app.name == name)
            .ok_or_else(|| Error::AppNotFound {
                name: name.to_string(),
            })
    }

    /// Mutate one application's status and persist the change.
    pub fn update_status(&mut self, name: &str, f: impl FnOnce(&mut AppStatus)) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.app.name == name)
            .ok_or_else(|| Error::AppNotFound {
                name: name.to_string(),
            })?;
        f(&mut entry.status);
        self.save()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.app.name.clone()).collect()
    }

    pub fn entries(&self) -> &[AppEntry] {
        &self.entries
    }
}

/// Application names become file names, so they are restricted up front.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidAppName {
            name: name.to_string(),
            reason: "name must not be empty".to_string(),
        });
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if !valid || name.starts_with('-') {
        return Err(Error::InvalidAppName {
            name: name.to_string(),
            reason: "only alphanumerics, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// The manifest set of the last fully successful sync, kept for drift
/// comparison and served as desired state between revision triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub revision: String,
    pub manifests: Vec<ResourceManifest>,
}

/// Layout of the engine's data directory.
///
/// ```text
/// <root>/
///   applications.toml      registry (definitions plus status)
///   history/<app>.jsonl    append-only sync records
///   baseline/<app>.json    manifest set of the last successful sync
/// ```
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("applications.toml")
    }

    pub fn history(&self, app: &str) -> HistoryLog {
        HistoryLog::new(self.root.join("history").join(format!("{app}.jsonl")))
    }

    fn baseline_path(&self, app: &str) -> PathBuf {
        self.root.join("baseline").join(format!("{app}.json"))
    }

    pub fn load_baseline(&self, app: &str) -> Result<Option<Baseline>> {
        match persist::read_locked(&self.baseline_path(app))? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    pub fn save_baseline(&self, app: &str, baseline: &Baseline) -> Result<()> {
        let content = serde_json::to_string_pretty(baseline)?;
        persist::write_atomic(&self.baseline_path(app), content.as_bytes())
    }

    /// Destroy everything recorded for an application. Used at
    /// deregistration; registration of the same name later starts clean.
    pub fn remove_app_state(&self, app: &str) -> Result<()> {
        for path in [
            self.baseline_path(app),
            self.root.join("history").join(format!("{app}.jsonl")),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
