//! Meta-Agent Proposer
//!
//! Asks the oracle for new candidates and, when an evaluation fails, for
//! repairs. One [`Conversation`] spans a whole generation:
//!
//! 1. system + base prompt (language guide and rendered archive) → proposal
//! 2. proposal + first reflexion prompt → revised proposal
//! 3. revised proposal + second reflexion prompt → final proposal
//! 4. per failed evaluation: last proposal + debug prompt → repaired proposal
//!
//! Rate limiting is absorbed by backoff. Any other oracle failure, including
//! a reply without `name` or `code`, is returned to the caller.

pub mod prompts;
pub mod seeds;

pub use prompts::PromptLimits;
pub use seeds::initial_archive;

use sdk::errors::EngineError;
use sdk::types::Candidate;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::llm::{complete_with_backoff, BackoffPolicy, ChatMessage, JsonObject, Oracle, OracleRequest};

/// Keys the engine owns; a proposal never sets them
const ENGINE_OWNED_KEYS: &[&str] = &[
    "author",
    "generation",
    "fitness",
    "accuracy",
    "test_fitness",
    "test_accuracy",
];

/// Running chat with the meta-agent for one generation
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push_proposal(&mut self, proposal: &Candidate) {
        let rendered = serde_json::to_string(proposal).unwrap_or_default();
        self.messages.push(ChatMessage::assistant(rendered));
    }
}

/// Proposes and repairs candidates through the oracle
pub struct MetaAgent {
    oracle: Arc<dyn Oracle>,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
    backoff: BackoffPolicy,
    limits: PromptLimits,
}

impl MetaAgent {
    pub fn new(oracle: Arc<dyn Oracle>, config: &Config) -> Self {
        Self {
            oracle,
            model: config.models.meta_agent.clone(),
            temperature: config.models.meta_temperature,
            max_output_tokens: config.oracle.max_output_tokens,
            backoff: BackoffPolicy::from_config(&config.oracle.backoff),
            limits: PromptLimits::from(&config.sandbox),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request a new candidate and run both reflexion rounds
    ///
    /// `last_generated` is the most recent generated (non-seed) entry, quoted
    /// in the first reflexion prompt.
    pub async fn propose(
        &self,
        archive: &[Candidate],
        last_generated: Option<&Candidate>,
    ) -> Result<(Candidate, Conversation), EngineError> {
        let seeds = initial_archive();
        let example = seeds
            .first()
            .ok_or_else(|| EngineError::Config("seed archive is empty".to_string()))?;

        let (system, prompt) = prompts::base_prompt(archive, example, self.limits);
        let mut conversation = Conversation {
            messages: vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        };

        let mut proposal = self.ask(&conversation).await?;
        debug!(name = %proposal.name, "Initial proposal");

        let (reflexion_1, reflexion_2) = prompts::reflexion_prompts(last_generated);
        for (round, reflexion) in [reflexion_1, reflexion_2].into_iter().enumerate() {
            conversation.push_proposal(&proposal);
            conversation.messages.push(ChatMessage::user(reflexion));
            proposal = self.ask(&conversation).await?;
            debug!(round = round + 1, name = %proposal.name, "Reflexion proposal");
        }

        Ok((proposal, conversation))
    }

    /// Feed an evaluation failure back and request a corrected candidate
    pub async fn repair(
        &self,
        conversation: &mut Conversation,
        last: &Candidate,
        observation: &str,
    ) -> Result<Candidate, EngineError> {
        conversation.push_proposal(last);
        conversation
            .messages
            .push(ChatMessage::user(prompts::debug_prompt(observation)));
        self.ask(conversation).await
    }

    async fn ask(&self, conversation: &Conversation) -> Result<Candidate, EngineError> {
        let request = OracleRequest::new(
            self.model.clone(),
            conversation.messages.clone(),
            self.temperature,
        )
        .with_max_output_tokens(self.max_output_tokens);

        let reply = complete_with_backoff(self.oracle.as_ref(), &request, &self.backoff).await?;
        parse_proposal(reply)
    }
}

/// Turn an oracle reply into an unscored candidate
///
/// # Errors
///
/// A reply without a non-empty string `name` and `code` is an
/// [`EngineError::Oracle`] failure.
pub fn parse_proposal(mut reply: JsonObject) -> Result<Candidate, EngineError> {
    for key in ["name", "code"] {
        match reply.get(key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {}
            _ => {
                return Err(EngineError::Oracle(format!(
                    "Malformed proposal: missing `{}`",
                    key
                )))
            }
        }
    }

    if let Some(thought) = reply.get("thought").filter(|v| !v.is_string()) {
        let rendered = thought.to_string();
        reply.insert("thought".to_string(), serde_json::Value::String(rendered));
    }
    for key in ENGINE_OWNED_KEYS {
        reply.remove(*key);
    }

    serde_json::from_value(serde_json::Value::Object(reply))
        .map_err(|e| EngineError::Oracle(format!("Malformed proposal: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: serde_json::Value) -> JsonObject {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_proposal_keeps_extras() {
        let candidate = parse_proposal(object(json!({
            "thought": "vote harder",
            "name": "Voter",
            "code": "[voter]\nsteps = []",
            "reflection": "looks fine",
            "fitness": "forged",
        })))
        .unwrap();

        assert_eq!(candidate.name, "Voter");
        assert_eq!(candidate.thought.as_deref(), Some("vote harder"));
        assert_eq!(candidate.extra["reflection"], "looks fine");
        assert!(candidate.fitness.is_none());
    }

    #[test]
    fn test_parse_proposal_requires_name_and_code() {
        let missing_code = parse_proposal(object(json!({"thought": "x", "name": "N"})));
        assert!(matches!(missing_code, Err(EngineError::Oracle(_))));

        let blank_name = parse_proposal(object(json!({"name": " ", "code": "[a]"})));
        assert!(matches!(blank_name, Err(EngineError::Oracle(_))));
    }

    #[test]
    fn test_structured_thought_is_stringified() {
        let candidate = parse_proposal(object(json!({
            "thought": {"insight": "a", "plan": "b"},
            "name": "N",
            "code": "[n]\nsteps = []",
        })))
        .unwrap();
        assert!(candidate.thought.unwrap().contains("insight"));
    }
}
