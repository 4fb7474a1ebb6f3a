//! Test fixtures for creating reproducible origin repositories.
//!
//! An [`OriginRepo`] is a local git repository in a temporary directory that
//! workspaces can clone by path, so tests never touch the network.

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// A temporary git repository usable as a clone source.
///
/// Automatically cleaned up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let origin = OriginRepo::sample();
/// workspace.clone_repository(&origin.url()).await?;
/// ```
pub struct OriginRepo {
    temp_dir: TempDir,
}

impl OriginRepo {
    /// A repository with no commits.
    ///
    /// # Panics
    ///
    /// Panics if git initialization fails.
    #[must_use]
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        git(temp_dir.path(), &["init", "--quiet"]);
        Self { temp_dir }
    }

    /// A repository with one commit containing `files`.
    ///
    /// # Panics
    ///
    /// Panics if file creation or git fails.
    #[must_use]
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let origin = Self::empty();
        for (path, content) in files {
            let target = origin.path().join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create directories");
            }
            std::fs::write(target, content).expect("Failed to write fixture file");
        }
        git(origin.path(), &["add", "--all"]);
        git(
            origin.path(),
            &[
                "-c",
                "user.name=Test User",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                "Initial commit",
            ],
        );
        origin
    }

    /// A small Rust project: README, a library root and one nested module.
    #[must_use]
    pub fn sample() -> Self {
        Self::with_files(&[
            ("README.md", "# Sample\n\nA small sample project.\n"),
            ("src/lib.rs", "pub mod util;\n\npub fn answer() -> u32 {\n    41\n}\n"),
            (
                "src/util/math.rs",
                "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
            ),
        ])
    }

    /// Directory of the repository.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Reference to pass to `git clone`.
    #[must_use]
    pub fn url(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_origin_has_committed_files() {
        let origin = OriginRepo::sample();
        assert!(origin.path().join(".git").is_dir());
        assert!(origin.path().join("src/util/math.rs").is_file());

        let log = Command::new("git")
            .args(["log", "--oneline"])
            .current_dir(origin.path())
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&log.stdout).contains("Initial commit"));
    }

    #[test]
    fn test_empty_origin_has_no_commits() {
        let origin = OriginRepo::empty();
        let head = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", "HEAD"])
            .current_dir(origin.path())
            .output()
            .unwrap();
        assert!(!head.status.success());
    }
}
