//! Darwin SDK
//!
//! Shared library providing the types, the candidate program contract and the
//! error taxonomy used by the Darwin search engine.

/// Error types and handling
pub mod errors;

/// Candidate program contract
pub mod program;

/// Messages, candidates and questions
pub mod types;

// Re-export commonly used types
pub use errors::{DarwinErrorExt, EngineError};
pub use program::{AgentFactory, AgentProgram, AgentSpec, PrimitiveAgent, ProgramContext};
pub use types::{AgentOutput, Author, Candidate, Generation, Message, QuestionItem};
