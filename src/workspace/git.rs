//! Version-control plumbing for a workspace clone.
//!
//! All operations shell out to the `git` CLI. Prompts for credentials are
//! disabled so an unauthenticated clone fails instead of hanging the task,
//! and repository-configured commands (fsmonitor, hooks) never run.

use crate::error::{IntoPatchwrightError, PatchwrightError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Overrides applied to every invocation, ahead of the subcommand.
const SAFE_CONFIG: [&str; 4] = [
    "-c",
    "core.fsmonitor=false",
    "-c",
    "core.hooksPath=/dev/null",
];

/// Run a git command in `dir` and return its stdout.
///
/// A non-zero exit status is reported as a `Repository` error carrying the
/// trimmed stderr.
pub(crate) async fn run_git(dir: Option<&Path>, operation: &str, args: &[&str]) -> Result<String> {
    let mut command = AsyncCommand::new("git");
    command
        .args(SAFE_CONFIG)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes -o ConnectTimeout=10")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    debug!("git {}", args.join(" "));

    let output = command
        .output()
        .await
        .map_err(|e| PatchwrightError::repository(operation, format!("failed to run git: {e}")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PatchwrightError::repository(
            operation,
            format!(
                "git exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ))
    }
}

/// Clone `reference` into `root`, creating the directory if needed.
pub(crate) async fn clone_into(root: &Path, reference: &str) -> Result<()> {
    if reference.trim().is_empty() {
        return Err(PatchwrightError::repository(
            "clone",
            "repository reference is empty",
        ));
    }

    tokio::fs::create_dir_all(root)
        .await
        .into_repository_error("clone")?;

    let target = root.to_string_lossy();
    run_git(None, "clone", &["clone", "--quiet", "--", reference, &target]).await?;
    Ok(())
}

/// Check whether the clone has a commit to reset to.
pub(crate) async fn has_head(root: &Path) -> bool {
    run_git(Some(root), "rev-parse", &["rev-parse", "--verify", "--quiet", "HEAD"])
        .await
        .is_ok()
}

/// Restore the working tree to the cloned commit and drop untracked files.
///
/// An unborn branch (empty repository) has no commit, so the index is
/// emptied instead of reset.
pub(crate) async fn hard_reset(root: &Path) -> Result<()> {
    if has_head(root).await {
        run_git(Some(root), "reset", &["reset", "--hard", "--quiet", "HEAD"]).await?;
    } else {
        run_git(Some(root), "reset", &["read-tree", "--empty"]).await?;
    }
    run_git(Some(root), "reset", &["clean", "-fdxq"]).await?;
    Ok(())
}

/// Stage every change (including untracked and ignored files) and diff
/// against HEAD.
///
/// Without a HEAD commit `git diff --cached` compares against the empty tree.
pub(crate) async fn staged_diff(root: &Path) -> Result<String> {
    run_git(Some(root), "diff", &["add", "--all", "--force"]).await?;
    run_git(
        Some(root),
        "diff",
        &[
            "-c",
            "core.quotepath=false",
            "diff",
            "--cached",
            "--no-color",
            "--no-ext-diff",
        ],
    )
    .await
}
