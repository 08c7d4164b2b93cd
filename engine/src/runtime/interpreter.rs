//! Step interpreter for compiled agent programs

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use sdk::errors::EngineError;
use sdk::program::{AgentProgram, AgentSpec, PrimitiveAgent, ProgramContext, DEFAULT_ROLE};
use sdk::types::{AgentOutput, Author, Message, NO_ITERATION};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::program::{
    CallStep, FunctionDef, LoopStep, Pick, Reference, Step, VoteStep, TASK_BINDING,
};
use crate::config::SandboxConfig;

/// Author of messages produced by a vote step
pub const VOTE_AUTHOR: &str = "Majority Vote";

/// Author of messages produced by a constant step
pub const CONSTANT_AUTHOR: &str = "Constant";

type Env = HashMap<String, Vec<Message>>;

/// A validated program, ready to run against any [`ProgramContext`]
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    name: String,
    def: Arc<FunctionDef>,
    limits: SandboxConfig,
}

impl CompiledProgram {
    pub(crate) fn new(name: String, def: Arc<FunctionDef>, limits: SandboxConfig) -> Self {
        Self { name, def, limits }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &FunctionDef {
        &self.def
    }
}

#[async_trait]
impl AgentProgram for CompiledProgram {
    fn entry_point(&self) -> &str {
        &self.name
    }

    async fn forward(
        &self,
        task: Message,
        ctx: &ProgramContext,
    ) -> Result<AgentOutput, EngineError> {
        let agents = self
            .def
            .agents
            .iter()
            .map(|decl| {
                let spec = AgentSpec {
                    name: decl.name.clone(),
                    output_fields: decl.fields.clone(),
                    role: decl.role.clone().unwrap_or_else(|| DEFAULT_ROLE.to_string()),
                    temperature: decl.temperature,
                    model: decl.model.clone(),
                };
                (decl.id.clone(), ctx.agent(&spec))
            })
            .collect();

        let run = Execution {
            agents,
            max_oracle_calls: self.limits.max_oracle_calls,
            oracle_calls: AtomicU32::new(0),
        };

        let mut env = Env::new();
        env.insert(TASK_BINDING.to_string(), vec![task]);

        run.exec_steps(&self.def.steps, &mut env, None).await?;

        let reference: Reference = self.def.returns.parse()?;
        let mut result = resolve(&reference, &env)?;
        if result.len() == 1 {
            if let Some(message) = result.pop() {
                return Ok(AgentOutput::Message(message));
            }
        }
        Ok(AgentOutput::Messages(result))
    }
}

/// State of a single `forward` invocation
struct Execution {
    agents: HashMap<String, Box<dyn PrimitiveAgent>>,
    max_oracle_calls: u32,
    oracle_calls: AtomicU32,
}

impl Execution {
    fn exec_steps<'a>(
        &'a self,
        steps: &'a [Step],
        env: &'a mut Env,
        loop_index: Option<i32>,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        async move {
            for step in steps {
                match step {
                    Step::Call(call) => self.exec_call(call, env, loop_index).await?,
                    Step::Vote(vote) => exec_vote(vote, env)?,
                    Step::Loop(body) => self.exec_loop(body, env).await?,
                    Step::Constant(constant) => {
                        env.insert(
                            constant.bind.clone(),
                            vec![Message::new(
                                constant.field.clone(),
                                Author::system(CONSTANT_AUTHOR),
                                constant.value.clone(),
                                NO_ITERATION,
                            )],
                        );
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn exec_call(
        &self,
        call: &CallStep,
        env: &mut Env,
        loop_index: Option<i32>,
    ) -> Result<(), EngineError> {
        let agent = self.agents.get(&call.agent).ok_or_else(|| {
            EngineError::ProgramExecution(format!("unknown agent `{}`", call.agent))
        })?;

        let mut inputs = Vec::new();
        for raw in &call.inputs {
            let reference: Reference = raw.parse()?;
            inputs.extend(resolve(&reference, env)?);
        }

        let output = match call.repeat {
            Some(n) => {
                self.charge(n)?;
                let samples =
                    try_join_all((0..n).map(|i| agent.query(&inputs, &call.instruction, i as i32)))
                        .await?;
                samples.into_iter().flatten().collect()
            }
            None => {
                self.charge(1)?;
                let iteration = call.iteration.or(loop_index).unwrap_or(NO_ITERATION);
                agent.query(&inputs, &call.instruction, iteration).await?
            }
        };

        if call.append {
            env.entry(call.bind.clone()).or_default().extend(output);
        } else {
            env.insert(call.bind.clone(), output);
        }
        Ok(())
    }

    async fn exec_loop(&self, body: &LoopStep, env: &mut Env) -> Result<(), EngineError> {
        let until = body
            .until
            .as_ref()
            .map(|clause| {
                clause
                    .reference
                    .parse::<Reference>()
                    .map(|reference| (reference, clause.equals.trim().to_lowercase()))
            })
            .transpose()?;

        for i in 0..body.times {
            self.exec_steps(&body.steps, env, Some(i as i32)).await?;

            if let Some((reference, expected)) = &until {
                let done = resolve(reference, env)?
                    .last()
                    .map(|m| m.content.trim().to_lowercase() == *expected)
                    .unwrap_or(false);
                if done {
                    tracing::trace!(pass = i + 1, "Loop exit condition met");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Reserve oracle calls against the per-forward budget
    fn charge(&self, calls: u32) -> Result<(), EngineError> {
        let used = self.oracle_calls.fetch_add(calls, Ordering::SeqCst) + calls;
        if used > self.max_oracle_calls {
            return Err(EngineError::SandboxLimit(format!(
                "more than {} oracle calls in one forward pass",
                self.max_oracle_calls
            )));
        }
        Ok(())
    }
}

fn exec_vote(vote: &VoteStep, env: &mut Env) -> Result<(), EngineError> {
    let reference: Reference = vote.from.parse()?;
    let candidates = resolve(&reference, env)?;

    let winner = majority(&candidates).ok_or_else(|| {
        EngineError::ProgramExecution(format!("nothing to vote on in `{}`", reference))
    })?;

    let field = reference
        .field
        .clone()
        .unwrap_or_else(|| winner.field_name.clone());
    let message = Message::new(
        field,
        Author::system(VOTE_AUTHOR),
        winner.content.trim(),
        NO_ITERATION,
    );
    env.insert(vote.bind.clone(), vec![message]);
    Ok(())
}

/// Most common content; ties go to the value seen first
fn majority(messages: &[Message]) -> Option<&Message> {
    let mut counts: Vec<(&str, usize, &Message)> = Vec::new();
    for message in messages {
        let key = message.content.trim();
        match counts.iter_mut().find(|(content, _, _)| *content == key) {
            Some(entry) => entry.1 += 1,
            None => counts.push((key, 1, message)),
        }
    }

    let mut best: Option<(usize, &Message)> = None;
    for (_, count, message) in counts {
        if best.map(|(top, _)| count > top).unwrap_or(true) {
            best = Some((count, message));
        }
    }
    best.map(|(_, message)| message)
}

/// Messages behind a reference
fn resolve(reference: &Reference, env: &Env) -> Result<Vec<Message>, EngineError> {
    let bound = env.get(&reference.binding).ok_or_else(|| {
        EngineError::ProgramExecution(format!("`{}` is not bound", reference.binding))
    })?;

    let selected: Vec<Message> = match &reference.field {
        Some(field) => bound
            .iter()
            .filter(|m| &m.field_name == field)
            .cloned()
            .collect(),
        None => bound.clone(),
    };

    Ok(match reference.pick {
        Some(Pick::First) => selected.into_iter().take(1).collect(),
        Some(Pick::Last) => selected.into_iter().last().into_iter().collect(),
        None => selected,
    })
}
