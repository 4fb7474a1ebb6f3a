//! The edit orchestration loop.
//!
//! [`EditOrchestrator::run`] drives one [`Task`] end to end:
//!
//! 1. clone the repository into a workspace bound to the task id
//! 2. repeat up to `max_retries` attempts of
//!    select files → propose changes → generate edits → apply → self-assess
//! 3. diff the workspace against the cloned commit, delete it, and store
//!    the diff as the task result
//!
//! An unsatisfied attempt resets the workspace before the next one; the
//! last attempt's changes are kept even when the model never reports
//! satisfaction. Any phase-level failure ends the run with the task in
//! `ERROR`. Cancellation is checked before each attempt and each phase.

pub mod edit;
pub mod prompts;
pub mod selection;

pub use edit::{tool_schemas, EditOperation, ToolCallError};
pub use selection::{parse_paths, RelevantFileSet};

use crate::config::{AppConfig, EmptySelectionPolicy};
use crate::error::PatchwrightError;
use crate::llm::{ChatMessage, GeneratedMessage, GenerationRequest, LanguageModelClient};
use crate::task::Task;
use crate::workspace::RepoWorkspace;
use std::sync::Arc;

/// How a run ended. The same information is written into the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Diff stored as the task result.
    Completed {
        /// Attempts executed, at most `max_retries`
        attempts: u32,
        /// Whether self-assessment accepted the final attempt
        satisfied: bool,
    },
    /// The task was cancelled; no result was written.
    Cancelled,
    /// The task ended in `ERROR`.
    Failed,
}

/// Reason a run stopped early.
#[derive(Debug)]
enum Interrupt {
    Cancelled,
    Failed(PatchwrightError),
}

impl From<PatchwrightError> for Interrupt {
    fn from(err: PatchwrightError) -> Self {
        Self::Failed(err)
    }
}

type Step<T> = std::result::Result<T, Interrupt>;

/// Result of one attempt.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Satisfied,
    Rejected { feedback: Option<String> },
}

/// Drives the language model through the phase loop for a task.
pub struct EditOrchestrator {
    config: AppConfig,
    client: Arc<dyn LanguageModelClient>,
}

impl EditOrchestrator {
    #[must_use]
    pub fn new(config: AppConfig, client: Arc<dyn LanguageModelClient>) -> Self {
        Self { config, client }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Workspace a task runs in.
    #[must_use]
    pub fn workspace_for(&self, task: &Task) -> RepoWorkspace {
        RepoWorkspace::for_task(&self.config.workspace_root, &task.id())
    }

    /// Run `task` to completion. Never fails: every outcome is recorded in
    /// the task itself.
    pub async fn run(&self, task: &Task) -> RunOutcome {
        if let Err(e) = task.start() {
            if task.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            task.error(&format!("Cannot run task: {}", e));
            return RunOutcome::Failed;
        }

        let workspace = self.workspace_for(task);

        match self.execute(task, &workspace).await {
            Ok((attempts, satisfied, diff)) => match task.set_result(diff) {
                Ok(()) => RunOutcome::Completed {
                    attempts,
                    satisfied,
                },
                Err(_) => RunOutcome::Cancelled,
            },
            Err(Interrupt::Cancelled) => {
                task.info("Stopping at cancellation checkpoint");
                self.cleanup(task, &workspace).await;
                RunOutcome::Cancelled
            }
            Err(Interrupt::Failed(e)) => {
                self.cleanup(task, &workspace).await;
                if task.is_cancelled() {
                    task.warn(&format!("Error after cancellation: {}", e));
                    return RunOutcome::Cancelled;
                }
                // Fails only if a concurrent cancel already made the task terminal
                let _ = task.set_error(e.to_string());
                RunOutcome::Failed
            }
        }
    }

    /// Best-effort workspace removal. Failures are logged, never raised.
    async fn cleanup(&self, task: &Task, workspace: &RepoWorkspace) {
        task.info("Cleaning up the cloned repository");
        match workspace.delete().await {
            Ok(()) => task.info("Repository cleaned up successfully"),
            Err(e) => task.error(&format!("Error cleaning up the cloned repository: {}", e)),
        }
    }

    fn checkpoint(&self, task: &Task) -> Step<()> {
        if task.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn execute(&self, task: &Task, workspace: &RepoWorkspace) -> Step<(u32, bool, String)> {
        task.info("==================================================");
        task.info(&format!("Task ID: {}", task.id()));
        task.info(&format!("Repository URL: {}", task.repo_url()));
        task.info(&format!("Prompt: {}", task.prompt()));
        task.info("==================================================");

        self.checkpoint(task)?;
        task.info(&format!("Cloning repository: {}", task.repo_url()));
        workspace.clone_repository(task.repo_url()).await?;
        let all_files = workspace.list_files().await?;
        task.info(&format!(
            "Repository cloned successfully ({} files)",
            all_files.len()
        ));

        let max_retries = self.config.max_retries.max(1);
        let mut feedback: Option<String> = None;
        let mut attempts = 0;
        let mut satisfied = false;

        for attempt in 1..=max_retries {
            self.checkpoint(task)?;
            attempts = attempt;
            task.info(&format!("Attempt {}/{}", attempt, max_retries));

            match self
                .attempt(task, workspace, &all_files, feedback.as_deref())
                .await?
            {
                Verdict::Satisfied => {
                    task.info(&format!("Change accepted on attempt {}", attempt));
                    satisfied = true;
                    break;
                }
                Verdict::Rejected { feedback: reason } => {
                    if attempt < max_retries {
                        task.info("Resetting workspace for the next attempt");
                        workspace.reset().await?;
                    }
                    if self.config.feedback_to_next_attempt {
                        feedback = reason;
                    }
                }
            }
        }

        if !satisfied {
            task.warn(&format!(
                "No attempt was accepted after {} attempts; keeping the last attempt's changes",
                attempts
            ));
        }

        self.checkpoint(task)?;
        let diff = workspace.diff().await?;
        task.info(&format!("Generated diff ({} bytes)", diff.len()));
        self.cleanup(task, workspace).await;

        Ok((attempts, satisfied, diff))
    }

    async fn attempt(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        all_files: &[String],
        feedback: Option<&str>,
    ) -> Step<Verdict> {
        self.checkpoint(task)?;
        let mut files = self.select_files(task, workspace, all_files).await?;
        if files.is_empty() {
            match self.config.empty_selection {
                EmptySelectionPolicy::Proceed => {
                    task.warn("No relevant files selected; continuing with an empty set");
                }
                EmptySelectionPolicy::Retry => {
                    task.warn("No relevant files selected; ending attempt");
                    return Ok(Verdict::Rejected { feedback: None });
                }
                EmptySelectionPolicy::Fail => {
                    return Err(PatchwrightError::NoRelevantFiles.into());
                }
            }
        }

        self.checkpoint(task)?;
        let plan = self.propose_changes(task, workspace, &files, feedback).await?;

        self.checkpoint(task)?;
        let operations = self.generate_edits(task, workspace, &files, &plan).await?;

        self.checkpoint(task)?;
        self.apply_operations(task, workspace, &mut files, &operations)
            .await?;

        self.checkpoint(task)?;
        self.self_assess(task, workspace, &files).await
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn generate(
        &self,
        task: &Task,
        phase: &str,
        messages: Vec<ChatMessage>,
        with_tools: bool,
    ) -> Step<GeneratedMessage> {
        let mut request =
            GenerationRequest::new(&self.config.llm.model, self.config.llm.temperature)
                .with_messages(messages);
        if with_tools {
            request = request.with_tools(tool_schemas());
        }

        task.info(&format!(
            "[{}] Calling {} with {} messages ({} chars)",
            phase,
            request.model,
            request.messages.len(),
            request.content_len()
        ));
        let reply = self.client.generate(request).await?;
        task.info(&format!(
            "[{}] Received {} chars and {} tool calls",
            phase,
            reply.text().len(),
            reply.tool_calls.len()
        ));
        Ok(reply)
    }

    async fn render_files(&self, workspace: &RepoWorkspace, files: &RelevantFileSet) -> String {
        let mut contents = Vec::with_capacity(files.len());
        for path in files.iter() {
            let content = workspace
                .read_file(path)
                .await
                .unwrap_or_else(|e| format!("(unreadable: {})", e));
            contents.push((path.to_string(), content));
        }
        prompts::file_blocks(&contents)
    }

    async fn select_files(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        all_files: &[String],
    ) -> Step<RelevantFileSet> {
        let mut messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::select_files(task.prompt(), all_files)),
        ];
        let reasoning = self.generate(task, "select", messages.clone(), false).await?;
        if prompts::is_sentinel(reasoning.text(), prompts::NO_RELEVANT_FILES) {
            task.info("Model reported no relevant files");
            return Ok(RelevantFileSet::new());
        }

        messages.push(reasoning.into_assistant_message());
        messages.push(ChatMessage::user(prompts::list_selected_files()));
        self.checkpoint(task)?;
        let listing = self.generate(task, "select", messages, false).await?;
        let mut files = parse_paths(listing.text());

        if self.config.verify_selected_files {
            let mut readable = RelevantFileSet::new();
            for path in files.iter() {
                match workspace.read_file(path).await {
                    Ok(_) => {
                        readable.insert(path);
                    }
                    Err(e) => {
                        task.warn(&format!("Dropping unreadable selection {}: {}", path, e))
                    }
                }
            }
            files = readable;
        }

        task.info(&format!(
            "Selected {} relevant files: {}",
            files.len(),
            files.as_slice().join(", ")
        ));
        Ok(files)
    }

    async fn propose_changes(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        files: &RelevantFileSet,
        feedback: Option<&str>,
    ) -> Step<String> {
        let rendered = self.render_files(workspace, files).await;
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::propose_changes(task.prompt(), &rendered, feedback)),
        ];
        let reply = self.generate(task, "propose", messages, false).await?;
        if reply.text().trim().is_empty() {
            task.warn("Model returned an empty change plan");
        }
        Ok(reply.text().to_string())
    }

    async fn generate_edits(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        files: &RelevantFileSet,
        plan: &str,
    ) -> Step<Vec<EditOperation>> {
        let rendered = self.render_files(workspace, files).await;
        let mut messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::generate_edits(task.prompt(), plan, &rendered)),
        ];
        let mut operations = Vec::new();
        let max_turns = self.config.max_tool_turns.max(1);
        let mut finished = false;

        for turn in 1..=max_turns {
            if turn > 1 {
                self.checkpoint(task)?;
            }
            let reply = self.generate(task, "edit", messages.clone(), true).await?;
            if !reply.has_tool_calls() {
                finished = true;
                break;
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply.into_assistant_message());
            for call in calls {
                let outcome = match EditOperation::from_tool_call(&call) {
                    Ok(operation) => {
                        task.info(&format!("Proposed {}", operation));
                        operations.push(operation);
                        "ok".to_string()
                    }
                    Err(e) => {
                        task.warn(&format!("Ignoring tool call {}: {}", call.id, e));
                        format!("error: {}", e)
                    }
                };
                messages.push(ChatMessage::tool_result(&call.id, outcome));
            }
        }

        if !finished {
            task.warn(&format!(
                "Tool-call turn limit ({}) reached; continuing with {} operations",
                max_turns,
                operations.len()
            ));
        }
        Ok(operations)
    }

    /// Apply operations in order. Sandbox violations and per-operation
    /// failures only skip that operation; a lost workspace ends the run.
    async fn apply_operations(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        files: &mut RelevantFileSet,
        operations: &[EditOperation],
    ) -> Step<()> {
        for operation in operations {
            match operation.apply(workspace, files).await {
                Ok(()) => task.info(&format!("Applied {}", operation)),
                Err(e) if e.is_sandbox_violation() => {
                    task.error(&format!("Blocked {}: {}", operation, e));
                }
                Err(e) if !e.is_fatal_to_run() => {
                    task.warn(&format!("Skipped {}: {}", operation, e));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn self_assess(
        &self,
        task: &Task,
        workspace: &RepoWorkspace,
        files: &RelevantFileSet,
    ) -> Step<Verdict> {
        let rendered = self.render_files(workspace, files).await;
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::self_assess(task.prompt(), &rendered)),
        ];
        let reply = self.generate(task, "assess", messages, false).await?;
        let text = reply.text().trim();

        if prompts::is_sentinel(text, prompts::DONE) {
            return Ok(Verdict::Satisfied);
        }
        if text.is_empty() {
            task.warn("Self-assessment was empty; treating the attempt as unsatisfied");
            Ok(Verdict::Rejected { feedback: None })
        } else {
            task.info(&format!("Self-assessment feedback: {}", text));
            Ok(Verdict::Rejected {
                feedback: Some(text.to_string()),
            })
        }
    }
}
