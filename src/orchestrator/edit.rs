//! Structured edit operations emitted by the model.
//!
//! The model can only change the workspace through three tools:
//! `create_file`, `modify_file` and `delete_file`. Each tool call is decoded
//! into an [`EditOperation`]; anything else is rejected before it reaches
//! the filesystem.

use crate::error::{PatchwrightError, Result};
use crate::llm::{ToolCall, ToolSchema};
use crate::orchestrator::selection::RelevantFileSet;
use crate::workspace::RepoWorkspace;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub const CREATE_FILE: &str = "create_file";
pub const MODIFY_FILE: &str = "modify_file";
pub const DELETE_FILE: &str = "delete_file";

/// One change to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOperation {
    Create { path: String, content: String },
    Modify { path: String, content: String },
    Delete { path: String },
}

/// Why a tool call could not become an [`EditOperation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

fn schema(name: &str, description: &str, with_content: bool) -> ToolSchema {
    let mut properties = json!({
        "file_path": {
            "type": "string",
            "description": "Path of the file relative to the repository root",
        }
    });
    let mut required = vec!["file_path"];
    if with_content {
        properties["content"] = json!({
            "type": "string",
            "description": "Complete content of the file",
        });
        required.push("content");
    }

    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Schemas of the edit tools exposed to the model.
#[must_use]
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        schema(
            CREATE_FILE,
            "Create a new file with the given content",
            true,
        ),
        schema(
            MODIFY_FILE,
            "Replace the content of an existing file with the given content",
            true,
        ),
        schema(DELETE_FILE, "Delete a file", false),
    ]
}

fn required_str(call: &ToolCall, key: &str) -> std::result::Result<String, ToolCallError> {
    if !call.arguments.is_object() {
        return Err(ToolCallError::InvalidArguments {
            tool: call.name.clone(),
            reason: "arguments are not a JSON object".to_string(),
        });
    }
    match call.arguments.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ToolCallError::InvalidArguments {
            tool: call.name.clone(),
            reason: format!("'{key}' must be a string"),
        }),
        None => Err(ToolCallError::InvalidArguments {
            tool: call.name.clone(),
            reason: format!("missing '{key}'"),
        }),
    }
}

impl EditOperation {
    /// Decode a tool call.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` for names outside the edit tool set and
    /// `InvalidArguments` when a required string field is missing.
    pub fn from_tool_call(call: &ToolCall) -> std::result::Result<Self, ToolCallError> {
        match call.name.as_str() {
            CREATE_FILE => Ok(Self::Create {
                path: required_str(call, "file_path")?,
                content: required_str(call, "content")?,
            }),
            MODIFY_FILE => Ok(Self::Modify {
                path: required_str(call, "file_path")?,
                content: required_str(call, "content")?,
            }),
            DELETE_FILE => Ok(Self::Delete {
                path: required_str(call, "file_path")?,
            }),
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// Tool name this operation came from.
    #[must_use]
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Create { .. } => CREATE_FILE,
            Self::Modify { .. } => MODIFY_FILE,
            Self::Delete { .. } => DELETE_FILE,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::Modify { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Apply to the workspace and keep `files` in sync.
    ///
    /// # Errors
    ///
    /// Returns `UnsafeAccess` for paths outside the workspace or inside its
    /// git metadata, `Repository` if the workspace root is gone, and `Apply`
    /// when the filesystem operation fails.
    pub async fn apply(&self, workspace: &RepoWorkspace, files: &mut RelevantFileSet) -> Result<()> {
        let outcome = match self {
            Self::Create { path, content } | Self::Modify { path, content } => {
                workspace.write_file(path, content).await
            }
            Self::Delete { path } => workspace.delete_file(path).await,
        };

        outcome.map_err(|e| match e {
            passthrough @ (PatchwrightError::UnsafeAccess { .. }
            | PatchwrightError::Repository { .. }) => passthrough,
            other => PatchwrightError::apply(
                format!("{} {}", self.tool_name(), self.path()),
                other.to_string(),
            ),
        })?;

        match self {
            Self::Create { path, .. } | Self::Modify { path, .. } => {
                files.insert(path.clone());
            }
            Self::Delete { path } => {
                files.remove(path);
            }
        }
        Ok(())
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { path, content } | Self::Modify { path, content } => write!(
                f,
                "{} {} ({} bytes)",
                self.tool_name(),
                path,
                content.len()
            ),
            Self::Delete { path } => write!(f, "{} {}", self.tool_name(), path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::OriginRepo;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn cloned() -> (OriginRepo, TempDir, RepoWorkspace) {
        let origin = OriginRepo::sample();
        let base = TempDir::new().unwrap();
        let workspace = RepoWorkspace::for_task(base.path(), &Uuid::new_v4());
        workspace.clone_repository(&origin.url()).await.unwrap();
        (origin, base, workspace)
    }

    #[test]
    fn test_tool_schemas_require_string_fields() {
        let schemas = tool_schemas();
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["create_file", "modify_file", "delete_file"]);

        assert_eq!(
            schemas[0].parameters["required"],
            json!(["file_path", "content"])
        );
        assert_eq!(schemas[2].parameters["required"], json!(["file_path"]));
        assert_eq!(
            schemas[1].parameters["properties"]["content"]["type"],
            "string"
        );
    }

    #[test]
    fn test_from_tool_call_decodes_each_tool() {
        let create = ToolCall::new("1", "create_file", json!({"file_path": "a", "content": "x"}));
        assert_eq!(
            EditOperation::from_tool_call(&create).unwrap(),
            EditOperation::Create {
                path: "a".to_string(),
                content: "x".to_string()
            }
        );

        let modify = ToolCall::new("2", "modify_file", json!({"file_path": "b", "content": ""}));
        assert!(matches!(
            EditOperation::from_tool_call(&modify).unwrap(),
            EditOperation::Modify { .. }
        ));

        let delete = ToolCall::new("3", "delete_file", json!({"file_path": "c"}));
        assert_eq!(
            EditOperation::from_tool_call(&delete).unwrap(),
            EditOperation::Delete {
                path: "c".to_string()
            }
        );
    }

    #[test]
    fn test_from_tool_call_rejects_unknown_tool() {
        let call = ToolCall::new("1", "run_shell", json!({"command": "rm -rf /"}));
        assert_eq!(
            EditOperation::from_tool_call(&call).unwrap_err(),
            ToolCallError::UnknownTool("run_shell".to_string())
        );
    }

    #[test]
    fn test_from_tool_call_rejects_bad_arguments() {
        let missing = ToolCall::new("1", "create_file", json!({"file_path": "a"}));
        assert!(matches!(
            EditOperation::from_tool_call(&missing).unwrap_err(),
            ToolCallError::InvalidArguments { .. }
        ));

        let wrong_type = ToolCall::new("2", "delete_file", json!({"file_path": 7}));
        assert!(EditOperation::from_tool_call(&wrong_type).is_err());

        let unparsed = ToolCall::new("3", "delete_file", Value::String("{oops".to_string()));
        let err = EditOperation::from_tool_call(&unparsed).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[tokio::test]
    async fn test_apply_keeps_relevant_files_in_sync() {
        let (_origin, _base, workspace) = cloned().await;
        let mut files: RelevantFileSet = ["README.md"].into_iter().collect();

        EditOperation::Create {
            path: "docs/new.md".to_string(),
            content: "new".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap();
        EditOperation::Modify {
            path: "src/lib.rs".to_string(),
            content: "pub fn answer() -> u32 { 42 }\n".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap();
        EditOperation::Delete {
            path: "README.md".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap();

        assert_eq!(
            files.iter().collect::<Vec<_>>(),
            vec!["docs/new.md", "src/lib.rs"]
        );
        assert_eq!(workspace.read_file("docs/new.md").await.unwrap(), "new");
        assert!(!workspace.root().join("README.md").exists());
    }

    #[tokio::test]
    async fn test_apply_rejects_escaping_path() {
        let (_origin, base, workspace) = cloned().await;
        let mut files = RelevantFileSet::new();

        let err = EditOperation::Create {
            path: "../escape.txt".to_string(),
            content: "x".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap_err();

        assert!(err.is_sandbox_violation());
        assert!(files.is_empty());
        assert!(!base.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_apply_failure_is_apply_error() {
        let (_origin, _base, workspace) = cloned().await;
        let mut files = RelevantFileSet::new();

        // A directory cannot be overwritten as a file
        let err = EditOperation::Modify {
            path: "src".to_string(),
            content: "x".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap_err();

        assert!(matches!(err, PatchwrightError::Apply { .. }));
        assert!(!err.is_fatal_to_run());
    }

    #[tokio::test]
    async fn test_apply_rejects_git_metadata() {
        let (_origin, _base, workspace) = cloned().await;
        let config = workspace.root().join(".git/config");
        let original = std::fs::read_to_string(&config).unwrap();
        let mut files = RelevantFileSet::new();

        let err = EditOperation::Modify {
            path: ".git/config".to_string(),
            content: "[core]\n\tfsmonitor = \"touch pwned; false\"\n".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap_err();

        assert!(err.is_sandbox_violation());
        assert!(files.is_empty());
        assert_eq!(std::fs::read_to_string(&config).unwrap(), original);
    }

    #[tokio::test]
    async fn test_apply_without_workspace_is_fatal() {
        let (_origin, _base, workspace) = cloned().await;
        workspace.delete().await.unwrap();
        let mut files = RelevantFileSet::new();

        let err = EditOperation::Create {
            path: "LICENSE".to_string(),
            content: "MIT".to_string(),
        }
        .apply(&workspace, &mut files)
        .await
        .unwrap_err();

        assert!(matches!(err, PatchwrightError::Repository { .. }));
        assert!(err.is_fatal_to_run());
    }

    #[test]
    fn test_display() {
        let op = EditOperation::Create {
            path: "LICENSE".to_string(),
            content: "MIT".to_string(),
        };
        assert_eq!(op.to_string(), "create_file LICENSE (3 bytes)");
        assert_eq!(
            EditOperation::Delete {
                path: "x".to_string()
            }
            .to_string(),
            "delete_file x"
        );
    }
}
