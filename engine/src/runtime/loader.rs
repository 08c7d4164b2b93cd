//! Candidate loader
//!
//! Compiles model-authored source into a [`CompiledProgram`]. Loading runs in
//! gates, each of which must pass before the next is attempted:
//!
//! 1. **Parse**: the source must be valid TOML
//! 2. **Shape**: exactly one top-level symbol, and it must be callable
//! 3. **Decode**: the symbol must match the agent-program grammar
//! 4. **Validate**: agents, bindings and references resolve; sandbox limits hold
//!
//! Gate 2 failures are [`EngineError::CandidateShape`] and are never sent back
//! for repair. Every other failure is [`EngineError::CandidateCompile`].

use sdk::errors::EngineError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::interpreter::CompiledProgram;
use super::program::{is_identifier, FunctionDef, Reference, Step, TASK_BINDING};
use crate::config::SandboxConfig;

/// Fields each binding may hold, tracked during validation
type Scope = HashMap<String, BTreeSet<String>>;

/// Loader applying one set of sandbox limits
#[derive(Debug, Clone)]
pub struct CandidateLoader {
    limits: SandboxConfig,
}

impl CandidateLoader {
    pub fn new(limits: SandboxConfig) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxConfig {
        &self.limits
    }

    /// Run every gate and produce an executable program
    pub fn compile(&self, source: &str) -> Result<CompiledProgram, EngineError> {
        // Gate 1: parse
        let table: toml::Table = toml::from_str(source).map_err(|e| {
            EngineError::CandidateCompile(format!("Failed to parse candidate: {}", e))
        })?;

        // Gate 2: shape
        let (name, value) = match (table.len(), table.into_iter().next()) {
            (1, Some(entry)) => entry,
            (n, _) => {
                return Err(EngineError::CandidateShape(format!(
                    "{} things in namespace. Please only provide 1",
                    n
                )))
            }
        };
        let callable = value
            .as_table()
            .and_then(|body| body.get("steps"))
            .map(|steps| steps.is_array())
            .unwrap_or(false);
        if !callable {
            return Err(EngineError::CandidateShape(format!(
                "`{}` is not callable",
                name
            )));
        }

        // Gate 3: decode
        let def: FunctionDef = value.try_into().map_err(|e: toml::de::Error| {
            EngineError::CandidateCompile(format!("`{}`: {}", name, e.message()))
        })?;

        // Gate 4: validate
        self.validate(&def)?;

        tracing::debug!(
            entry_point = %name,
            agents = def.agents.len(),
            steps = def.steps.iter().map(Step::count).sum::<usize>(),
            "Candidate compiled"
        );

        Ok(CompiledProgram::new(name, Arc::new(def), self.limits.clone()))
    }

    fn validate(&self, def: &FunctionDef) -> Result<(), EngineError> {
        if def.agents.len() > self.limits.max_agents {
            return Err(compile_error(format!(
                "{} agents declared, at most {} allowed",
                def.agents.len(),
                self.limits.max_agents
            )));
        }

        let mut agents: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for agent in &def.agents {
            if !is_identifier(&agent.id) {
                return Err(compile_error(format!(
                    "agent id `{}` is not a valid identifier",
                    agent.id
                )));
            }
            if agent.fields.is_empty() {
                return Err(compile_error(format!(
                    "agent `{}` declares no output fields",
                    agent.id
                )));
            }
            let fields: BTreeSet<String> = agent.fields.iter().cloned().collect();
            if fields.len() != agent.fields.len() {
                return Err(compile_error(format!(
                    "agent `{}` declares a field twice",
                    agent.id
                )));
            }
            if let Some(field) = agent.fields.iter().find(|f| !is_identifier(f)) {
                return Err(compile_error(format!(
                    "agent `{}` field `{}` is not a valid identifier",
                    agent.id, field
                )));
            }
            if agents.insert(agent.id.as_str(), fields).is_some() {
                return Err(compile_error(format!("agent `{}` declared twice", agent.id)));
            }
        }

        let total_steps: usize = def.steps.iter().map(Step::count).sum();
        if total_steps > self.limits.max_steps {
            return Err(compile_error(format!(
                "{} steps, at most {} allowed",
                total_steps, self.limits.max_steps
            )));
        }
        if def.steps.is_empty() {
            return Err(compile_error("program has no steps".to_string()));
        }

        let mut scope: Scope = HashMap::new();
        scope.insert(
            TASK_BINDING.to_string(),
            BTreeSet::from([TASK_BINDING.to_string()]),
        );

        self.validate_steps(&def.steps, &agents, &mut scope)?;

        resolve(&def.returns, &scope)?;
        Ok(())
    }

    fn validate_steps(
        &self,
        steps: &[Step],
        agents: &HashMap<&str, BTreeSet<String>>,
        scope: &mut Scope,
    ) -> Result<(), EngineError> {
        for step in steps {
            if let Some(bind) = step.binding() {
                if !is_identifier(bind) {
                    return Err(compile_error(format!(
                        "binding `{}` is not a valid identifier",
                        bind
                    )));
                }
                if bind == TASK_BINDING {
                    return Err(compile_error("`task` cannot be rebound".to_string()));
                }
            }

            match step {
                Step::Call(call) => {
                    let fields = agents.get(call.agent.as_str()).ok_or_else(|| {
                        compile_error(format!("unknown agent `{}`", call.agent))
                    })?;
                    for input in &call.inputs {
                        resolve(input, scope)?;
                    }
                    if let Some(repeat) = call.repeat {
                        if repeat == 0 || repeat > self.limits.max_repeat {
                            return Err(compile_error(format!(
                                "repeat must be between 1 and {}, got {}",
                                self.limits.max_repeat, repeat
                            )));
                        }
                    }
                    if let Some(iteration) = call.iteration {
                        if iteration < 0 {
                            return Err(compile_error(format!(
                                "iteration must not be negative, got {}",
                                iteration
                            )));
                        }
                    }

                    let entry = scope.entry(call.bind.clone()).or_default();
                    if !call.append {
                        entry.clear();
                    }
                    entry.extend(fields.iter().cloned());
                }
                Step::Vote(vote) => {
                    let source = resolve(&vote.from, scope)?;
                    let fields = match &source.field {
                        Some(field) => BTreeSet::from([field.clone()]),
                        None => scope.get(&source.binding).cloned().unwrap_or_default(),
                    };
                    scope.insert(vote.bind.clone(), fields);
                }
                Step::Loop(body) => {
                    if body.times == 0 || body.times > self.limits.max_loop_iterations {
                        return Err(compile_error(format!(
                            "loop times must be between 1 and {}, got {}",
                            self.limits.max_loop_iterations, body.times
                        )));
                    }
                    if body.steps.is_empty() {
                        return Err(compile_error("loop has no steps".to_string()));
                    }
                    // The body always runs at least once, so its bindings stay visible
                    self.validate_steps(&body.steps, agents, scope)?;
                    if let Some(until) = &body.until {
                        resolve(&until.reference, scope)?;
                    }
                }
                Step::Constant(constant) => {
                    if !is_identifier(&constant.field) {
                        return Err(compile_error(format!(
                            "constant field `{}` is not a valid identifier",
                            constant.field
                        )));
                    }
                    scope.insert(
                        constant.bind.clone(),
                        BTreeSet::from([constant.field.clone()]),
                    );
                }
            }
        }

        Ok(())
    }
}

/// Parse a reference and check it against the bindings defined so far
fn resolve(raw: &str, scope: &Scope) -> Result<Reference, EngineError> {
    let reference: Reference = raw.parse()?;

    let fields = scope.get(&reference.binding).ok_or_else(|| {
        compile_error(format!(
            "`{}` is used before it is bound",
            reference.binding
        ))
    })?;

    if let Some(field) = &reference.field {
        if !fields.contains(field) {
            return Err(compile_error(format!(
                "`{}` has no field `{}` (available: {})",
                reference.binding,
                field,
                fields.iter().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
    }

    Ok(reference)
}

fn compile_error(message: String) -> EngineError {
    EngineError::CandidateCompile(message)
}
