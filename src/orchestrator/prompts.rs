//! Prompt text for each orchestrator phase.
//!
//! Builders are pure functions of their inputs so the exact wording sent to
//! the model can be asserted in tests.

/// Reply meaning "no file in the repository is relevant".
pub const NO_RELEVANT_FILES: &str = "NO_RELEVANT_FILES";

/// Reply meaning "the change request is fully satisfied".
pub const DONE: &str = "DONE";

/// Check a reply against a sentinel: trimmed, case-insensitive, exact.
#[must_use]
pub fn is_sentinel(reply: &str, sentinel: &str) -> bool {
    reply.trim().eq_ignore_ascii_case(sentinel)
}

pub const SYSTEM_PROMPT: &str = "You are a senior software engineer working inside a checked-out \
repository. You make precise, minimal changes that fulfil the user's request and you follow the \
existing conventions of the codebase.";

/// Phase 1, first turn: decide which files matter.
#[must_use]
pub fn select_files(request: &str, files: &[String]) -> String {
    let listing = if files.is_empty() {
        "(the repository is empty)".to_string()
    } else {
        files.join("\n")
    };
    format!(
        "The user wants the following change:\n\n{request}\n\n\
         These are all the files in the repository:\n\n{listing}\n\n\
         Think about which of these files need to be read or changed to fulfil the request. \
         If none of them are relevant, reply with exactly {NO_RELEVANT_FILES} and nothing else."
    )
}

/// Phase 1, follow-up turn: the machine-readable list.
#[must_use]
pub fn list_selected_files() -> String {
    "Now list the relevant file paths exactly as they appear in the repository listing, one path \
     per line, with no numbering, commentary or formatting."
        .to_string()
}

/// Serialize files as tagged blocks carrying path and content.
#[must_use]
pub fn file_blocks(files: &[(String, String)]) -> String {
    if files.is_empty() {
        return "(no files selected)".to_string();
    }
    files
        .iter()
        .map(|(path, content)| format!("<file path=\"{path}\">\n{content}\n</file>"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Phase 2: reason about the change and describe a plan.
#[must_use]
pub fn propose_changes(request: &str, files: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "The user wants the following change:\n\n{request}\n\n\
         Here are the relevant files:\n\n{files}\n\n"
    );
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "A previous attempt at this change was rejected with this feedback:\n\n{feedback}\n\n\
             Take it into account.\n\n"
        ));
    }
    prompt.push_str(
        "Explain your reasoning, then describe step by step which files to create, modify or \
         delete and what each change is.",
    );
    prompt
}

/// Phase 3: turn the plan into tool calls.
#[must_use]
pub fn generate_edits(request: &str, plan: &str, files: &str) -> String {
    format!(
        "The user wants the following change:\n\n{request}\n\n\
         Current contents of the relevant files:\n\n{files}\n\n\
         The agreed plan:\n\n{plan}\n\n\
         Carry out the plan using the create_file, modify_file and delete_file tools. \
         modify_file replaces the whole file, so always pass the complete new content. \
         Paths are relative to the repository root. When every change has been made, reply \
         without calling any tool."
    )
}

/// Phase 5: judge the result.
#[must_use]
pub fn self_assess(request: &str, files: &str) -> String {
    format!(
        "The user asked for the following change:\n\n{request}\n\n\
         This is the current state of the relevant files:\n\n{files}\n\n\
         If the change is complete and correct, reply with exactly {DONE} and nothing else. \
         Otherwise explain what is wrong or missing."
    )
}
