//! Sandboxed repository workspaces.
//!
//! A [`RepoWorkspace`] owns one on-disk clone, rooted at
//! `<workspace_root>/<task id>`. It provides the version-control operations
//! the orchestrator needs (clone, hard reset, unified diff) and a file CRUD
//! surface in which every path is confined to the workspace root.
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwright::workspace::RepoWorkspace;
//!
//! let workspace = RepoWorkspace::for_task("_patchwright_temp_", &task.id());
//! workspace.clone_repository("https://github.com/owner/repo").await?;
//! workspace.create_file("LICENSE", "MIT License ...").await?;
//! let patch = workspace.diff().await?;
//! workspace.delete().await?;
//! ```

pub mod git;
pub mod sandbox;

pub use sandbox::resolve_within;

use crate::error::{IntoPatchwrightError, PatchwrightError, Result};
use sandbox::VCS_DIR;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// Run filesystem work on the blocking pool so it never stalls the runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PatchwrightError::Other(e.into()))?
}

fn remove_tree(root: &Path) -> Result<()> {
    match fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn walk_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != VCS_DIR);

    for entry in walker {
        let entry = entry.into_repository_error("list")?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }

    files.sort();
    Ok(files)
}

/// An isolated, path-confined clone of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoWorkspace {
    root: PathBuf,
}

impl RepoWorkspace {
    /// Create a workspace handle for an explicit root directory.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Create the workspace handle bound to a task identifier.
    #[must_use]
    pub fn for_task<P: AsRef<Path>>(base: P, task_id: &Uuid) -> Self {
        Self::new(base.as_ref().join(task_id.to_string()))
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether the workspace root exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    // =========================================================================
    // Version control
    // =========================================================================

    /// Clone `reference` into the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `Repository` on network, authentication or malformed-URL
    /// failures.
    pub async fn clone_repository(&self, reference: &str) -> Result<()> {
        git::clone_into(&self.root, reference).await
    }

    /// Discard every uncommitted change, restoring the cloned commit.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if git fails.
    pub async fn reset(&self) -> Result<()> {
        git::hard_reset(&self.root).await
    }

    /// Unified diff of the working tree (untracked and ignored files
    /// included) against the cloned commit. Empty when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if git fails.
    pub async fn diff(&self) -> Result<String> {
        git::staged_diff(&self.root).await
    }

    /// Remove the workspace root recursively. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory exists but cannot be removed.
    pub async fn delete(&self) -> Result<()> {
        let root = self.root.clone();
        blocking(move || remove_tree(&root)).await
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// List every file relative to the root as a POSIX-style path, excluding
    /// version-control metadata. Sorted for stable prompts.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the tree cannot be walked.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        blocking(move || walk_files(&root)).await
    }

    /// Resolve a repo-relative path to its confined absolute location.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` if the path escapes the root or names
    /// version-control metadata.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        resolve_within(&self.root, path)
    }

    /// Read a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` for escaping paths and `Io` if the read fails.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let root = self.root.clone();
        let path = path.to_string();
        blocking(move || {
            let target = resolve_within(&root, &path)?;
            Ok(fs::read_to_string(target)?)
        })
        .await
    }

    /// Replace a file's content, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` for escaping paths and `Io` if the write fails.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let root = self.root.clone();
        let path = path.to_string();
        let content = content.to_string();
        blocking(move || {
            let target = resolve_within(&root, &path)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
            Ok(())
        })
        .await
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// An existing file is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` for escaping paths and `Io` if the write fails.
    pub async fn create_file(&self, path: &str, content: &str) -> Result<()> {
        self.write_file(path, content).await
    }

    /// Delete a file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` for escaping paths and `Io` if removal fails.
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let root = self.root.clone();
        let path = path.to_string();
        blocking(move || {
            let target = resolve_within(&root, &path)?;
            match fs::remove_file(target) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}
