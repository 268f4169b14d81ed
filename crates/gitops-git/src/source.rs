//! Revision resolution and manifest extraction.

use std::path::Path;

use async_trait::async_trait;
use git2::{ObjectType, Repository, Tree};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use gitops_core::{Error, ResolvedSource, Result, SourceProvider, SourceRef};
use gitops_model::ResourceManifest;

/// Source provider reading manifests out of local git repositories.
///
/// The provider is stateless: each resolve opens the repository named by the
/// source ref, so one instance serves any number of applications.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitSourceProvider;

impl GitSourceProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceProvider for GitSourceProvider {
    async fn resolve(&self, source: &SourceRef) -> Result<ResolvedSource> {
        let repo = Repository::open(&source.repo).map_err(|e| Error::SourceUnavailable {
            reason: format!("cannot open repository '{}': {}", source.repo, e.message()),
        })?;

        let commit = resolve_commit(&repo, &source.revision)?;
        let tree = commit.tree().map_err(|e| Error::SourceUnavailable {
            reason: format!("cannot read tree of {}: {}", commit.id(), e.message()),
        })?;
        let dir = locate_dir(&repo, &tree, source)?;
        let manifests = read_manifests(&repo, &dir)?;

        debug!(
            repo = %source.repo,
            revision = %source.revision,
            commit = %commit.id(),
            manifests = manifests.len(),
            "source resolved"
        );
        Ok(ResolvedSource::new(commit.id().to_string(), manifests))
    }
}

/// Resolve a branch name, tag, or commit id to a commit.
fn resolve_commit<'r>(repo: &'r Repository, revision: &str) -> Result<git2::Commit<'r>> {
    let not_found = || Error::RevisionNotFound {
        revision: revision.to_string(),
    };
    let object = repo.revparse_single(revision).map_err(|_| not_found())?;
    object.peel_to_commit().map_err(|_| not_found())
}

/// Find the manifest directory inside the commit tree.
///
/// A missing path is addressed the way git addresses it: the revision
/// `<rev>:<path>` does not exist.
fn locate_dir<'r>(repo: &'r Repository, tree: &Tree<'r>, source: &SourceRef) -> Result<Tree<'r>> {
    if source.path.is_empty() || source.path == "." {
        return repo
            .find_tree(tree.id())
            .map_err(|e| Error::SourceUnavailable {
                reason: e.message().to_string(),
            });
    }

    let not_found = || Error::RevisionNotFound {
        revision: format!("{}:{}", source.revision, source.path),
    };
    let entry = tree
        .get_path(Path::new(&source.path))
        .map_err(|_| not_found())?;
    entry
        .to_object(repo)
        .map_err(|_| not_found())?
        .into_tree()
        .map_err(|_| not_found())
}

/// Parse every manifest document under the directory, in file-name order.
///
/// Only direct children with a `.json`, `.yaml`, or `.yml` extension count;
/// anything else in the directory is ignored.
fn read_manifests(repo: &Repository, dir: &Tree<'_>) -> Result<Vec<ResourceManifest>> {
    let mut files: Vec<(String, git2::Oid)> = dir
        .iter()
        .filter_map(|entry| {
            let name = entry.name()?.to_string();
            let is_manifest =
                entry.kind() == Some(ObjectType::Blob) && has_manifest_extension(&name);
            is_manifest.then_some((name, entry.id()))
        })
        .collect();
    // Tree iteration is already name-ordered, but the ordering is a
    // contract here, so it is enforced rather than assumed
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut manifests = Vec::new();
    for (name, oid) in files {
        let blob = repo.find_blob(oid).map_err(|e| Error::SourceUnavailable {
            reason: format!("cannot read '{name}': {}", e.message()),
        })?;
        let text = std::str::from_utf8(blob.content()).map_err(|_| Error::ManifestInvalid {
            reason: format!("{name}: not valid UTF-8"),
        })?;
        parse_documents(&name, text, &mut manifests)?;
    }
    Ok(manifests)
}

fn has_manifest_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "json" | "yaml" | "yml"))
}

/// Parse one file into zero or more manifests.
///
/// YAML files may hold several documents separated by `---`; JSON files may
/// hold a single document or an array of documents.
fn parse_documents(file: &str, text: &str, out: &mut Vec<ResourceManifest>) -> Result<()> {
    if file.ends_with(".json") {
        let value: Value = serde_json::from_str(text).map_err(|e| Error::ManifestInvalid {
            reason: format!("{file}: {e}"),
        })?;
        return push_documents(file, value, out);
    }

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document).map_err(|e| Error::ManifestInvalid {
            reason: format!("{file}: {e}"),
        })?;
        // An empty document between separators parses as null
        if value.is_null() {
            continue;
        }
        push_documents(file, value, out)?;
    }
    Ok(())
}

fn push_documents(file: &str, value: Value, out: &mut Vec<ResourceManifest>) -> Result<()> {
    let documents = match value {
        Value::Array(items) => items,
        value => vec![value],
    };
    for document in documents {
        let manifest = ResourceManifest::parse(document).map_err(|e| Error::ManifestInvalid {
            reason: format!("{file}: {e}"),
        })?;
        out.push(manifest);
    }
    Ok(())
}
