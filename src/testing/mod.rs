//! Testing infrastructure for Patchwright.
//!
//! - **Mocks**: [`ScriptedLanguageModel`], a replayable language model
//! - **Fixtures**: local origin repositories to clone from (test-only)
//!
//! # Example
//!
//! ```rust,ignore
//! use patchwright::testing::ScriptedLanguageModel;
//!
//! let model = ScriptedLanguageModel::new()
//!     .with_text("src/lib.rs")
//!     .with_text("DONE");
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

pub use mocks::*;
