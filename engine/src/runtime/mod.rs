//! Candidate runtime
//!
//! Turns archive source into something the harness can call:
//!
//! - [`CandidateLoader`] compiles and validates agent-program source
//! - [`CompiledProgram`] interprets the validated steps
//! - [`BoundCandidate`] pairs a program with the [`AgentRuntime`] it runs on
//!
//! Binding is per evaluation. Every evaluation gets its own runtime (its own
//! mode and agent factory), so nothing is installed globally and two
//! evaluations in flight never observe each other.

pub mod interpreter;
pub mod loader;
pub mod program;

pub use interpreter::CompiledProgram;
pub use loader::CandidateLoader;
pub use program::{FunctionDef, Reference, Step};

use sdk::errors::EngineError;
use sdk::program::{AgentProgram, ProgramContext};
use sdk::types::{AgentOutput, Message};
use std::sync::Arc;

use crate::agent::{AgentRuntime, EvalMode};

/// A program bound to the runtime of one evaluation
#[derive(Clone)]
pub struct BoundCandidate {
    program: Arc<dyn AgentProgram>,
    context: ProgramContext,
    mode: EvalMode,
}

impl BoundCandidate {
    pub fn new(program: Arc<dyn AgentProgram>, runtime: AgentRuntime) -> Self {
        let mode = runtime.mode();
        Self {
            program,
            context: ProgramContext::new(Arc::new(runtime)),
            mode,
        }
    }

    pub fn entry_point(&self) -> &str {
        self.program.entry_point()
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    /// Run the entry point on one task
    pub async fn forward(&self, task: Message) -> Result<AgentOutput, EngineError> {
        self.program.forward(task, &self.context).await
    }
}
