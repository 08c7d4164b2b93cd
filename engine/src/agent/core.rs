//! LLM-backed primitive agent
//!
//! Each query renders a system prompt (role plus JSON format instruction) and
//! a user prompt (upstream messages plus instruction), makes one structured
//! oracle call, and reconciles the reply against the declared output fields.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sdk::errors::EngineError;
use sdk::program::{AgentSpec, PrimitiveAgent};
use sdk::types::{Author, Message, NO_ITERATION};
use std::sync::Arc;
use tracing::{debug, warn};

use super::runtime::{AgentSettings, EvalMode};
use crate::llm::{complete_with_backoff, ChatMessage, JsonObject, LLMError, Oracle, OracleRequest};
use crate::secrets::scrub_secrets;

/// Length of the per-instance identifier
const INSTANCE_ID_LEN: usize = 4;

/// Generate a short alphanumeric instance identifier
pub fn random_instance_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INSTANCE_ID_LEN)
        .map(char::from)
        .collect()
}

/// One agent instance inside a candidate program
pub struct LlmAgent {
    spec: AgentSpec,
    author: Author,
    model: String,
    temperature: f64,
    settings: AgentSettings,
    mode: EvalMode,
    oracle: Arc<dyn Oracle>,
}

impl LlmAgent {
    pub fn new(
        spec: AgentSpec,
        oracle: Arc<dyn Oracle>,
        settings: AgentSettings,
        mode: EvalMode,
    ) -> Self {
        let author = Author::agent(spec.name.clone(), random_instance_id());
        let model = spec.model.clone().unwrap_or_else(|| settings.model.clone());
        let temperature = spec.temperature.unwrap_or(settings.temperature);

        Self {
            spec,
            author,
            model,
            temperature,
            settings,
            mode,
            oracle,
        }
    }

    pub fn spec(&self) -> &AgentSpec {
        &self.spec
    }

    /// Role line followed by the JSON format instruction
    pub fn system_prompt(&self) -> String {
        let fields = self
            .spec
            .output_fields
            .iter()
            .map(|key| {
                let description = if key.contains("answer") {
                    format!(
                        "Your {}. Return ONLY the alphabet choice, i.e. A or B or C or D.",
                        key
                    )
                } else {
                    format!("Your {}.", key)
                };
                format!(
                    "{}: {}",
                    serde_json::Value::from(key.as_str()),
                    serde_json::Value::from(description)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are a {}.\n\nReply EXACTLY with the following JSON format.\n{{{}}}\nDO NOT MISS ANY REQUEST FIELDS and ensure that your response is a well-formed JSON object!\n",
            self.spec.role, fields
        )
    }

    /// Upstream messages rendered in order, followed by the instruction
    pub fn user_prompt(&self, inputs: &[Message], instruction: &str) -> String {
        let mut text = String::new();

        for input in inputs {
            let mut author = input.author.to_string();
            if input.author == self.author {
                author.push_str(" (yourself)");
            }

            if input.is_task() {
                text.push_str(&format!("# Your Task:\n{}\n\n", input.content));
            } else if input.iteration_index != NO_ITERATION {
                text.push_str(&format!(
                    "### {} #{} by {}:\n{}\n\n",
                    input.field_name,
                    input.iteration_index + 1,
                    author,
                    input.content
                ));
            } else {
                text.push_str(&format!(
                    "### {} by {}:\n{}\n\n",
                    input.field_name, author, input.content
                ));
            }
        }

        text.push_str(instruction);
        text
    }

    /// Map an oracle reply onto exactly the declared fields, in declared order
    pub fn reconcile(&self, response: &JsonObject, iteration_index: i32) -> Vec<Message> {
        self.spec
            .output_fields
            .iter()
            .map(|field| {
                let content = match response.get(field) {
                    None => String::new(),
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                Message::new(field.clone(), self.author.clone(), content, iteration_index)
            })
            .collect()
    }
}

#[async_trait]
impl PrimitiveAgent for LlmAgent {
    fn author(&self) -> &Author {
        &self.author
    }

    async fn query(
        &self,
        inputs: &[Message],
        instruction: &str,
        iteration_index: i32,
    ) -> Result<Vec<Message>, EngineError> {
        let request = OracleRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(self.user_prompt(inputs, instruction)),
            ],
            self.temperature,
        )
        .with_max_output_tokens(self.settings.max_output_tokens);

        let response =
            match complete_with_backoff(self.oracle.as_ref(), &request, &self.settings.backoff)
                .await
            {
                Ok(response) => response,
                Err(LLMError::ContextLengthExceeded(_)) if self.mode == EvalMode::Search => {
                    return Err(EngineError::ContextTooLong);
                }
                Err(e) => {
                    warn!(
                        agent = %self.author,
                        "Other error in oracle call: {}",
                        scrub_secrets(&e.to_string())
                    );
                    JsonObject::new()
                }
            };

        if response.len() != self.spec.output_fields.len() {
            debug!(
                agent = %self.author,
                expected = self.spec.output_fields.len(),
                received = response.len(),
                "Oracle reply field count mismatch"
            );
        }

        Ok(self.reconcile(&response, iteration_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackoffPolicy, Result as LlmResult};
    use std::sync::Mutex;

    struct FixedOracle {
        reply: std::result::Result<JsonObject, fn() -> LLMError>,
        seen: Mutex<Vec<OracleRequest>>,
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete_json(&self, request: &OracleRequest) -> LlmResult<JsonObject> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(obj) => Ok(obj.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            model: "agent-model".to_string(),
            temperature: 0.5,
            max_output_tokens: 4096,
            backoff: BackoffPolicy::default(),
        }
    }

    fn object(json: serde_json::Value) -> JsonObject {
        match json {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn agent_with(oracle: Arc<FixedOracle>, mode: EvalMode) -> LlmAgent {
        let spec = AgentSpec::new(
            "Chain-of-Thought Agent",
            vec!["thinking".to_string(), "answer".to_string()],
        );
        LlmAgent::new(spec, oracle, settings(), mode)
    }

    #[test]
    fn test_instance_id_shape() {
        let id = random_instance_id();
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_system_prompt_lists_fields_in_order() {
        let oracle = Arc::new(FixedOracle {
            reply: Ok(JsonObject::new()),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle, EvalMode::Search);
        let prompt = agent.system_prompt();

        assert!(prompt.starts_with("You are a helpful assistant.\n\nReply EXACTLY"));
        let thinking = prompt.find("\"thinking\": \"Your thinking.\"").unwrap();
        let answer = prompt
            .find("\"answer\": \"Your answer. Return ONLY the alphabet choice, i.e. A or B or C or D.\"")
            .unwrap();
        assert!(thinking < answer);
        assert!(prompt.ends_with("well-formed JSON object!\n"));
    }

    #[test]
    fn test_user_prompt_rendering() {
        let oracle = Arc::new(FixedOracle {
            reply: Ok(JsonObject::new()),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle, EvalMode::Search);
        let other = Author::agent("Critic", "Zz99");

        let inputs = vec![
            Message::task("What is 2+2?"),
            Message::new("answer", agent.author().clone(), "B", 0),
            Message::new("feedback", other, "Check again", NO_ITERATION),
        ];
        let prompt = agent.user_prompt(&inputs, "Solve it.");

        let expected_own = format!("### answer #1 by {} (yourself):\nB\n\n", agent.author());
        assert!(prompt.starts_with("# Your Task:\nWhat is 2+2?\n\n"));
        assert!(prompt.contains(&expected_own));
        assert!(prompt.contains("### feedback by Critic Zz99:\nCheck again\n\n"));
        assert!(prompt.ends_with("Solve it."));
    }

    #[tokio::test]
    async fn test_query_reconciles_fields() {
        let oracle = Arc::new(FixedOracle {
            reply: Ok(object(serde_json::json!({
                "answer": "C",
                "confidence": 0.9,
            }))),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle.clone(), EvalMode::Search);

        let out = agent
            .query(&[Message::task("q")], "Answer.", 2)
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].field_name, "thinking");
        assert_eq!(out[0].content, "");
        assert_eq!(out[1].field_name, "answer");
        assert_eq!(out[1].content, "C");
        assert!(out.iter().all(|m| m.iteration_index == 2));
        assert!(out.iter().all(|m| &m.author == agent.author()));

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen[0].model, "agent-model");
        assert_eq!(seen[0].messages.len(), 2);
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let oracle = Arc::new(FixedOracle {
            reply: Ok(JsonObject::new()),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle, EvalMode::Search);
        let out = agent.reconcile(
            &object(serde_json::json!({"thinking": ["a", "b"], "answer": 3})),
            NO_ITERATION,
        );
        assert_eq!(out[0].content, r#"["a","b"]"#);
        assert_eq!(out[1].content, "3");
    }

    #[tokio::test]
    async fn test_context_overflow_in_search_mode_is_surfaced() {
        let oracle = Arc::new(FixedOracle {
            reply: Err(|| LLMError::ContextLengthExceeded("maximum context length".into())),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle, EvalMode::Search);
        let err = agent.query(&[], "x", NO_ITERATION).await.unwrap_err();
        assert!(matches!(err, EngineError::ContextTooLong));
    }

    #[tokio::test]
    async fn test_oracle_failure_yields_empty_fields() {
        let oracle = Arc::new(FixedOracle {
            reply: Err(|| LLMError::ContextLengthExceeded("maximum context length".into())),
            seen: Mutex::new(vec![]),
        });
        let agent = agent_with(oracle, EvalMode::Evaluation);
        let out = agent.query(&[], "x", NO_ITERATION).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.content.is_empty()));
    }
}
