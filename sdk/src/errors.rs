//! Error types and handling
//!
//! This module provides the error taxonomy shared by the engine and by
//! candidate programs. Every error implements [`DarwinErrorExt`], which
//! supplies a short operator hint and tells the search loop whether the
//! failure is worth another attempt.
//!
//! # Error Categories
//!
//! - **Oracle**: rate limiting, context overflow and other completion failures
//! - **Candidate**: shape violations, compile errors, runtime failures
//! - **Policy**: accuracy floor and debug-repair budget
//! - **Storage**: archive persistence and dataset loading
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{DarwinErrorExt, EngineError};
//!
//! let error = EngineError::CandidateShape("2 things in namespace".to_string());
//! assert!(!error.is_recoverable());
//!
//! let error = EngineError::OracleRateLimited;
//! assert!(error.is_recoverable());
//! println!("Hint: {}", error.user_hint());
//! ```

use thiserror::Error;

/// Message surfaced verbatim when a candidate overflows the oracle context.
pub const CONTEXT_TOO_LONG_MESSAGE: &str =
    "The context is too long. Please try to design the agent to have shorter context.";

/// Trait for Darwin error extensions
pub trait DarwinErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors may succeed when the same generation is attempted
    /// again. Non-recoverable errors reject the candidate or stop the run.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Oracle errors
    #[error("Oracle rate limit exceeded")]
    OracleRateLimited,

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("{}", CONTEXT_TOO_LONG_MESSAGE)]
    ContextTooLong,

    // Candidate errors
    #[error("Candidate rejected: {0}")]
    CandidateShape(String),

    #[error("Candidate failed to compile: {0}")]
    CandidateCompile(String),

    #[error("Candidate execution failed: {0}")]
    ProgramExecution(String),

    #[error("Sandbox limit exceeded: {0}")]
    SandboxLimit(String),

    // Search policy errors
    #[error("All 0 accuracy (mean {mean:.3} below floor {floor:.3})")]
    AccuracyBelowFloor { mean: f64, floor: f64 },

    #[error("Debug budget exhausted after {attempts} attempts")]
    DebugBudgetExhausted { attempts: u32 },

    #[error("Generation {generation} abandoned {abandons} times in a row")]
    SearchStalled { generation: u32, abandons: u32 },

    // Storage errors
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Refusing to shrink archive from {persisted} to {attempted} entries")]
    ArchiveShrink { persisted: usize, attempted: usize },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DarwinErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::OracleRateLimited => "Oracle is throttling requests. Lower max_workers",
            Self::Oracle(_) => "Oracle call failed. Check the endpoint, model and API key",
            Self::ContextTooLong => "Candidate prompts are too long for the agent model",

            Self::CandidateShape(_) => "Candidate must define exactly one callable entry point",
            Self::CandidateCompile(_) => "Candidate source is not a valid agent program",
            Self::ProgramExecution(_) => "Candidate failed while answering a question",
            Self::SandboxLimit(_) => "Candidate exceeded a sandbox limit",

            Self::AccuracyBelowFloor { .. } => "Candidate answered almost nothing correctly",
            Self::DebugBudgetExhausted { .. } => "Raise search.debug_max to allow more repairs",
            Self::SearchStalled { .. } => "Check oracle availability; rerun to resume from the archive",

            Self::Archive(_) => "Archive file could not be read or written",
            Self::ArchiveShrink { .. } => "Another process may be writing the same archive",
            Self::Dataset(_) => "Check the dataset directory and split files",
            Self::Scoring(_) => "Scoring needs at least one evaluated question",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::CandidateShape(_)
            | Self::DebugBudgetExhausted { .. }
            | Self::SearchStalled { .. }
            | Self::Config(_)
            | Self::ArchiveShrink { .. }
            | Self::Dataset(_) => false,

            _ => true,
        }
    }
}
