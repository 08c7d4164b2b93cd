//! Agent Primitive Runtime
//!
//! Candidate programs build their behaviour out of [`LlmAgent`]s: one oracle
//! call per query, a fixed set of declared output fields, and an explicit
//! author identity on every produced message. [`AgentRuntime`] is the
//! factory handed to a program through its `ProgramContext`.

pub mod core;
pub mod runtime;

pub use core::{random_instance_id, LlmAgent};
pub use runtime::{AgentRuntime, AgentSettings, EvalMode};
