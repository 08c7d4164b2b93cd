//! Darwin Engine Library
//!
//! This library provides the core functionality of the Darwin engine.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret handling and scrubbing module
pub mod secrets;

/// Oracle abstraction layer
pub mod llm;

/// Agent primitive runtime
pub mod agent;

/// Candidate loader, sandbox and interpreter
pub mod runtime;

/// Concurrent evaluation harness
pub mod harness;

/// Bootstrap fitness scorer
pub mod scorer;

/// Meta-agent prompts, seeds and proposer
pub mod meta_agent;

/// Archive persistence
pub mod archive;

/// Question sources
pub mod dataset;

/// Search and evaluation phases
pub mod search;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
