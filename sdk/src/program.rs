//! Candidate program contract
//!
//! Every candidate, whether written by hand or compiled from model-authored
//! source, implements [`AgentProgram`]: a single `forward` entry point that
//! takes the task message and returns an [`AgentOutput`].
//!
//! Programs never reach the oracle directly. They receive a [`ProgramContext`]
//! that hands out [`PrimitiveAgent`]s, and the engine decides which oracle,
//! model and evaluation mode those agents use. A context is built per
//! evaluation run, so two concurrent runs never share agent state.

use crate::errors::EngineError;
use crate::types::{AgentOutput, Author, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default role used in the agent system prompt
pub const DEFAULT_ROLE: &str = "helpful assistant";

/// Declaration of one primitive agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Display name, used as the role part of the author label
    pub name: String,

    /// Output fields the oracle must return, in order
    pub output_fields: Vec<String>,

    #[serde(default = "default_role")]
    pub role: String,

    /// Sampling temperature; the runtime default applies when unset
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Model override; the runtime's agent model applies when unset
    #[serde(default)]
    pub model: Option<String>,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, output_fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            output_fields,
            role: default_role(),
            temperature: None,
            model: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A single LLM-backed agent instance
#[async_trait]
pub trait PrimitiveAgent: Send + Sync {
    /// Identity stamped on every message this agent produces
    fn author(&self) -> &Author;

    /// Ask the agent to fill its declared fields
    ///
    /// The returned messages carry exactly the declared output fields. Errors
    /// are reserved for conditions the candidate must not swallow, such as an
    /// oracle context overflow during search.
    async fn query(
        &self,
        inputs: &[Message],
        instruction: &str,
        iteration_index: i32,
    ) -> Result<Vec<Message>, EngineError>;
}

/// Implemented by the engine to construct agents for a program
pub trait AgentFactory: Send + Sync {
    fn create(&self, spec: &AgentSpec) -> Box<dyn PrimitiveAgent>;
}

/// The only API surface a candidate program can use
#[derive(Clone)]
pub struct ProgramContext {
    factory: Arc<dyn AgentFactory>,
}

impl ProgramContext {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self { factory }
    }

    /// Construct a fresh agent instance with its own identifier
    pub fn agent(&self, spec: &AgentSpec) -> Box<dyn PrimitiveAgent> {
        self.factory.create(spec)
    }
}

/// Trait that every candidate program implements
#[async_trait]
pub trait AgentProgram: Send + Sync {
    /// Name of the entry point symbol
    fn entry_point(&self) -> &str;

    /// Answer one task
    async fn forward(&self, task: Message, ctx: &ProgramContext)
        -> Result<AgentOutput, EngineError>;
}
