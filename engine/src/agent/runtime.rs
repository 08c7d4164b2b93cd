//! Agent factory bound to one evaluation run

use sdk::program::{AgentFactory, AgentSpec, PrimitiveAgent};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::core::LlmAgent;
use crate::config::Config;
use crate::llm::{BackoffPolicy, Oracle};

/// Which phase an evaluation belongs to
///
/// Context overflow is surfaced to the meta-agent only while searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Search,
    Evaluation,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMode::Search => write!(f, "search"),
            EvalMode::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// Defaults applied to every agent a program creates
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub backoff: BackoffPolicy,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.models.agent.clone(),
            temperature: config.models.agent_temperature,
            max_output_tokens: config.oracle.max_output_tokens,
            backoff: BackoffPolicy::from_config(&config.oracle.backoff),
        }
    }
}

/// Agent factory for one evaluation run
///
/// Built fresh per evaluation and owned by the bound candidate, so concurrent
/// evaluations never share mode or agent state.
pub struct AgentRuntime {
    oracle: Arc<dyn Oracle>,
    settings: AgentSettings,
    mode: EvalMode,
    run_id: Uuid,
}

impl AgentRuntime {
    pub fn new(oracle: Arc<dyn Oracle>, settings: AgentSettings, mode: EvalMode) -> Self {
        Self {
            oracle,
            settings,
            mode,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl AgentFactory for AgentRuntime {
    fn create(&self, spec: &AgentSpec) -> Box<dyn PrimitiveAgent> {
        let agent = LlmAgent::new(
            spec.clone(),
            Arc::clone(&self.oracle),
            self.settings.clone(),
            self.mode,
        );
        tracing::trace!(run = %self.run_id, agent = %agent.author(), "Agent created");
        Box::new(agent)
    }
}
