//! Path confinement for workspace file operations.
//!
//! Every repo-relative path handed to the workspace is resolved against the
//! canonical workspace root one component at a time. Symlinks that already
//! exist on disk are followed exactly as the OS would follow them, `..` is
//! applied to the resolved prefix rather than to the raw text, and absolute
//! components restart resolution at the filesystem root. Containment is then
//! checked component-wise with [`Path::starts_with`], never by string prefix.
//!
//! The `.git` directory is off limits: git reads commands from its config
//! and hooks, so writing there would run code outside the workspace.

use crate::error::{PatchwrightError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Version-control metadata directory.
pub(crate) const VCS_DIR: &str = ".git";

/// True if any component below `root` is the metadata directory.
fn names_vcs_dir(root: &Path, resolved: &Path) -> bool {
    resolved.strip_prefix(root).map_or(true, |relative| {
        relative
            .components()
            .any(|c| c.as_os_str().eq_ignore_ascii_case(VCS_DIR))
    })
}

/// Resolve `relative` beneath `root`.
///
/// Returns the absolute target path when it lies strictly inside the root.
/// The root itself, anything outside it, anything inside `.git`, and
/// anything reached through a dangling symlink is rejected with
/// [`PatchwrightError::UnsafeAccess`].
///
/// # Errors
///
/// Returns `Repository` if the root cannot be canonicalized and
/// `UnsafeAccess` if the path escapes.
///
/// # Example
///
/// ```rust,ignore
/// let target = resolve_within(workspace.root(), "src/lib.rs")?;
/// assert!(resolve_within(workspace.root(), "../outside.txt").is_err());
/// ```
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let root = root.canonicalize().map_err(|e| {
        PatchwrightError::repository("resolve", format!("{}: {}", root.display(), e))
    })?;

    let mut resolved = root.clone();
    for component in Path::new(relative).components() {
        match component {
            Component::Prefix(prefix) => resolved = PathBuf::from(prefix.as_os_str()),
            Component::RootDir => resolved.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let next = resolved.join(name);
                resolved = match fs::symlink_metadata(&next) {
                    Ok(meta) if meta.file_type().is_symlink() => next
                        .canonicalize()
                        .map_err(|_| PatchwrightError::unsafe_access(relative))?,
                    _ => next,
                };
            }
        }
    }

    if resolved != root && resolved.starts_with(&root) && !names_vcs_dir(&root, &resolved) {
        Ok(resolved)
    } else {
        Err(PatchwrightError::unsafe_access(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn is_within(root: &Path, relative: &str) -> bool {
        resolve_within(root, relative).is_ok()
    }

    fn root() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "pub fn f() {}").unwrap();
        temp
    }

    #[test]
    fn test_plain_relative_paths_resolve_inside_root() {
        let temp = root();
        let canonical = temp.path().canonicalize().unwrap();

        let existing = resolve_within(temp.path(), "src/lib.rs").unwrap();
        assert_eq!(existing, canonical.join("src/lib.rs"));

        let missing = resolve_within(temp.path(), "src/new/dir/file.txt").unwrap();
        assert_eq!(missing, canonical.join("src/new/dir/file.txt"));
    }

    #[test]
    fn test_inner_parent_segments_are_allowed() {
        let temp = root();
        let canonical = temp.path().canonicalize().unwrap();

        let resolved = resolve_within(temp.path(), "src/nested/../lib.rs").unwrap();
        assert_eq!(resolved, canonical.join("src/lib.rs"));

        let resolved = resolve_within(temp.path(), "./src/./lib.rs").unwrap();
        assert_eq!(resolved, canonical.join("src/lib.rs"));
    }

    #[test]
    fn test_traversal_sequences_are_rejected() {
        let temp = root();
        for path in [
            "..",
            "../outside.txt",
            "src/../../outside.txt",
            "src/nested/../../../etc/passwd",
            "missing/../../x",
        ] {
            let err = resolve_within(temp.path(), path).unwrap_err();
            assert!(err.is_sandbox_violation(), "{path} should be rejected");
        }
    }

    #[test]
    fn test_root_itself_is_rejected() {
        let temp = root();
        for path in ["", ".", "src/..", "./"] {
            assert!(
                !is_within(temp.path(), path),
                "{path:?} resolves to the root and must be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_override_is_rejected() {
        let temp = root();
        assert!(!is_within(temp.path(), "/etc/passwd"));
        assert!(!is_within(temp.path(), "/"));
    }

    #[test]
    fn test_absolute_path_inside_root_is_allowed() {
        let temp = root();
        let inside = temp.path().canonicalize().unwrap().join("src/lib.rs");
        assert!(is_within(temp.path(), inside.to_str().unwrap()));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_rejected() {
        let parent = TempDir::new().unwrap();
        let ws = parent.path().join("ws");
        let sibling = parent.path().join("ws-evil");
        fs::create_dir_all(&ws).unwrap();
        fs::create_dir_all(&sibling).unwrap();

        assert!(!is_within(&ws, "../ws-evil/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let temp = root();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("escape")).unwrap();

        assert!(!is_within(temp.path(), "escape/secret.txt"));
        assert!(!is_within(temp.path(), "escape/new.txt"));
        assert!(!is_within(temp.path(), "escape"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_is_followed() {
        let temp = root();
        std::os::unix::fs::symlink(temp.path().join("src"), temp.path().join("alias")).unwrap();
        let canonical = temp.path().canonicalize().unwrap();

        let resolved = resolve_within(temp.path(), "alias/lib.rs").unwrap();
        assert_eq!(resolved, canonical.join("src/lib.rs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected() {
        let temp = root();
        std::os::unix::fs::symlink("/nonexistent/target", temp.path().join("dangling")).unwrap();

        assert!(!is_within(temp.path(), "dangling"));
    }

    #[test]
    fn test_vcs_metadata_is_rejected() {
        let temp = root();
        fs::create_dir_all(temp.path().join(".git/hooks")).unwrap();
        fs::write(temp.path().join(".git/config"), "[core]\n").unwrap();

        for path in [
            ".git",
            ".git/config",
            ".git/hooks/post-checkout",
            "src/../.git/config",
            "src/.git/config",
            ".Git/config",
        ] {
            let err = resolve_within(temp.path(), path).unwrap_err();
            assert!(err.is_sandbox_violation(), "{path} should be rejected");
        }

        assert!(is_within(temp.path(), ".gitignore"));
        assert!(is_within(temp.path(), ".github/workflows/ci.yml"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_vcs_metadata_is_rejected() {
        let temp = root();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        std::os::unix::fs::symlink(temp.path().join(".git"), temp.path().join("meta")).unwrap();

        assert!(!is_within(temp.path(), "meta/config"));
    }

    #[test]
    fn test_missing_root_is_a_repository_error() {
        let temp = TempDir::new().unwrap();
        let err = resolve_within(&temp.path().join("absent"), "file.txt").unwrap_err();
        assert!(matches!(err, PatchwrightError::Repository { .. }));
    }
}
