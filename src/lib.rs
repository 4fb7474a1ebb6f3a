//! Patchwright - LLM-driven repository patch generation
//!
//! Given a git repository URL and a natural-language change request,
//! Patchwright clones the repository into an isolated workspace, asks a
//! language model to select relevant files, plan the change, emit structured
//! edit operations and judge the result, and finally returns a unified diff.
//!
//! # Architecture
//!
//! - [`workspace`] - Sandboxed per-task clone with git reset/diff and file CRUD
//! - [`llm`] - Language model client trait and the OpenAI-compatible provider
//! - [`task`] - Task state machine and the in-memory task registry
//! - [`orchestrator`] - The select/propose/generate/assess control loop
//! - [`server`] - HTTP request layer
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Scripted model and git fixtures for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwright::{create_client, AppConfig, EditOrchestrator, Task};
//!
//! let config = AppConfig::load_or_default(None)?;
//! let orchestrator = EditOrchestrator::new(config.clone(), create_client(&config.llm)?);
//!
//! let task = Task::new("https://github.com/owner/repo", "add a LICENSE file");
//! orchestrator.run(&task).await;
//! println!("{}", task.result().unwrap_or_default());
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod server;
pub mod task;
pub mod testing;
pub mod workspace;

// Re-export commonly used types
pub use error::{IntoPatchwrightError, PatchwrightError, Result};

pub use config::{AppConfig, EmptySelectionPolicy, LlmSettings};

pub use llm::{
    create_client, ChatMessage, GeneratedMessage, GenerationRequest, LanguageModelClient,
    OpenAiClient, Role, ToolCall, ToolSchema,
};

pub use task::{StatusCounts, Task, TaskId, TaskRegistry, TaskSnapshot, TaskStatus};

pub use orchestrator::{EditOrchestrator, RunOutcome};

pub use workspace::RepoWorkspace;

pub use server::{app_router, serve, AppState};

pub use testing::ScriptedLanguageModel;
