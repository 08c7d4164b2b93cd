//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use darwin_engine::config::Config;
use darwin_engine::llm::{JsonObject, LLMError, Oracle, OracleRequest, Result as LlmResult};
use sdk::types::QuestionItem;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const META_MODEL: &str = "meta-model";
pub const AGENT_MODEL: &str = "agent-model";

type AgentReply = Box<dyn Fn(&OracleRequest) -> LlmResult<JsonObject> + Send + Sync>;

/// Oracle that replays scripted meta-agent replies and answers agent calls
/// with a closure
///
/// Requests for [`META_MODEL`] pop the next scripted reply; every other
/// request goes to the agent closure.
pub struct ScriptedOracle {
    meta_replies: Mutex<VecDeque<LlmResult<JsonObject>>>,
    meta_requests: Mutex<Vec<OracleRequest>>,
    agent_calls: AtomicUsize,
    agent: AgentReply,
}

impl ScriptedOracle {
    pub fn new(agent: AgentReply) -> Self {
        Self {
            meta_replies: Mutex::new(VecDeque::new()),
            meta_requests: Mutex::new(Vec::new()),
            agent_calls: AtomicUsize::new(0),
            agent,
        }
    }

    /// Agents that always pick the letter named in the question
    pub fn answering() -> Self {
        Self::new(Box::new(|request| Ok(agent_reply(&answer_key(request)))))
    }

    /// Agents that always pick `letter`
    pub fn constant(letter: &'static str) -> Self {
        Self::new(Box::new(move |_| Ok(agent_reply(letter))))
    }

    pub fn push_meta(&self, reply: JsonObject) {
        self.meta_replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_meta_error(&self, error: LLMError) {
        self.meta_replies.lock().unwrap().push_back(Err(error));
    }

    pub fn meta_requests(&self) -> Vec<OracleRequest> {
        self.meta_requests.lock().unwrap().clone()
    }

    pub fn agent_calls(&self) -> usize {
        self.agent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete_json(&self, request: &OracleRequest) -> LlmResult<JsonObject> {
        if request.model == META_MODEL {
            self.meta_requests.lock().unwrap().push(request.clone());
            return self
                .meta_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LLMError::Unknown("script exhausted".to_string())));
        }

        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        (self.agent)(request)
    }
}

/// Letter following "Pick " in the last user message, or "A"
pub fn answer_key(request: &OracleRequest) -> String {
    request
        .messages
        .last()
        .and_then(|m| m.content.split("Pick ").nth(1))
        .and_then(|rest| rest.chars().next())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "A".to_string())
}

/// Reply covering every field the seed agents declare
pub fn agent_reply(letter: &str) -> JsonObject {
    object(json!({
        "thinking": "Working through the options.",
        "answer": letter,
        "feedback": "Looks right.",
        "correct": "True",
        "principle": "Read the question.",
    }))
}

pub fn object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Meta-agent reply proposing `code`
pub fn proposal(name: &str, code: &str) -> JsonObject {
    object(json!({
        "reflection": "The previous design repeats itself.",
        "thought": format!("Try {}", name),
        "name": name,
        "code": code,
    }))
}

/// Questions whose prompt names the correct letter
pub fn questions(letters: &[&str]) -> Vec<QuestionItem> {
    letters
        .iter()
        .enumerate()
        .map(|(i, letter)| QuestionItem::new(format!("Question {}. Pick {}", i, letter), *letter))
        .collect()
}

/// Small, fast configuration writing archives under `save_dir`
pub fn test_config(save_dir: &Path) -> Config {
    let mut config = Config::default();
    config.core.save_dir = save_dir.to_path_buf();
    config.models.meta_agent = META_MODEL.to_string();
    config.models.agent = AGENT_MODEL.to_string();
    config.oracle.backoff.initial_delay_ms = 1;
    config.oracle.backoff.max_delay_ms = 5;
    config.oracle.backoff.max_retries = 2;
    config.evaluation.max_workers = 4;
    config.scorer.bootstrap_samples = 2_000;
    config.scorer.seed = Some(7);
    config.search.n_generation = 1;
    config.search.debug_max = 3;
    config.search.max_consecutive_abandons = 3;
    config
}

pub const GOOD_PROGRAM: &str = r#"[answer_directly]
returns = "out"

[[answer_directly.agents]]
id = "solver"
name = "Solver Agent"
fields = ["thinking", "answer"]

[[answer_directly.steps]]
op = "call"
agent = "solver"
inputs = ["task"]
instruction = "Answer with a single letter."
bind = "out"
"#;

/// Compiles and runs, but returns the thinking field, so every answer scores 0
pub const THINKING_ONLY_PROGRAM: &str = r#"[think_only]
returns = "out.thinking:last"

[[think_only.agents]]
id = "solver"
name = "Solver Agent"
fields = ["thinking", "answer"]

[[think_only.steps]]
op = "call"
agent = "solver"
inputs = ["task"]
instruction = "Think about it."
bind = "out"
"#;

pub const TWO_ENTRY_POINTS: &str = r#"[first]
returns = "task"
steps = []

[second]
returns = "task"
steps = []
"#;
