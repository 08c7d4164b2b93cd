//! Shared data types: messages, candidates and questions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field name carried by the per-question task message
pub const TASK_FIELD: &str = "task";

/// Iteration index of a message that is not part of an iterated sequence
pub const NO_ITERATION: i32 = -1;

/// Explicit identity of whoever produced a message
///
/// Rendered as `"<role_name> <instance_id>"` in prompts. Two authors are the
/// same agent only when both the role name and the instance id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    /// Role or agent name, e.g. "Chain-of-Thought Agent"
    pub role_name: String,

    /// Short random identifier of the producing agent instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl Author {
    /// Author of the original task
    pub fn user() -> Self {
        Self {
            role_name: "User".to_string(),
            instance_id: None,
        }
    }

    /// Author label for messages synthesized by the runtime itself
    pub fn system(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            instance_id: None,
        }
    }

    /// Author label for a concrete agent instance
    pub fn agent(role_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            instance_id: Some(instance_id.into()),
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_id {
            Some(id) => write!(f, "{} {}", self.role_name, id),
            None => write!(f, "{}", self.role_name),
        }
    }
}

/// Unit passed between agent calls (one named field of an agent's output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub field_name: String,
    pub author: Author,
    pub content: String,
    /// `-1` for non-iterated fields
    pub iteration_index: i32,
}

impl Message {
    pub fn new(
        field_name: impl Into<String>,
        author: Author,
        content: impl Into<String>,
        iteration_index: i32,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            author,
            content: content.into(),
            iteration_index,
        }
    }

    /// Build the task message handed to a candidate for one question
    pub fn task(prompt_text: impl Into<String>) -> Self {
        Self::new(TASK_FIELD, Author::user(), prompt_text, NO_ITERATION)
    }

    pub fn is_task(&self) -> bool {
        self.field_name == TASK_FIELD
    }
}

/// Value returned by a candidate entry point
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    /// A bare answer string, e.g. `"B"`
    Text(String),
    /// A single message whose content should be the answer letter
    Message(Message),
    /// A full agent output; the answer is read from the second element
    Messages(Vec<Message>),
}

/// Generation tag of an archive entry: a seed or a numbered generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGeneration", into = "RawGeneration")]
pub enum Generation {
    Initial,
    Number(u32),
}

impl Generation {
    pub fn number(&self) -> Option<u32> {
        match self {
            Generation::Initial => None,
            Generation::Number(n) => Some(*n),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Initial => write!(f, "initial"),
            Generation::Number(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawGeneration {
    Number(u32),
    Label(String),
}

impl TryFrom<RawGeneration> for Generation {
    type Error = String;

    fn try_from(raw: RawGeneration) -> Result<Self, Self::Error> {
        match raw {
            RawGeneration::Number(n) => Ok(Generation::Number(n)),
            RawGeneration::Label(label) if label == "initial" => Ok(Generation::Initial),
            RawGeneration::Label(label) => Err(format!(
                "generation must be an integer or \"initial\", got \"{}\"",
                label
            )),
        }
    }
}

impl From<Generation> for RawGeneration {
    fn from(generation: Generation) -> Self {
        match generation {
            Generation::Initial => RawGeneration::Label("initial".to_string()),
            Generation::Number(n) => RawGeneration::Number(n),
        }
    }
}

/// One agent program plus its archive metadata
///
/// Keys the oracle returned beyond the known ones are kept in `extra` so the
/// archive round-trips them unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    /// Agent program source
    pub code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,

    /// Bootstrap interval string on the search split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness: Option<String>,

    /// Raw mean accuracy on the search split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    /// Bootstrap interval string on the test split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_fitness: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_accuracy: Option<f64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    /// Create an unscored candidate
    pub fn new(name: impl Into<String>, thought: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: None,
            thought: Some(thought.into()),
            code: code.into(),
            generation: None,
            fitness: None,
            accuracy: None,
            test_fitness: None,
            test_accuracy: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.fitness.is_some()
    }
}

/// One multiple-choice question as consumed by the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub prompt_text: String,
    pub correct_letter: String,
}

impl QuestionItem {
    pub fn new(prompt_text: impl Into<String>, correct_letter: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            correct_letter: correct_letter.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_display() {
        assert_eq!(Author::user().to_string(), "User");
        assert_eq!(Author::agent("Critic", "x9Qa").to_string(), "Critic x9Qa");
    }

    #[test]
    fn test_task_message() {
        let task = Message::task("What is 2+2?");
        assert!(task.is_task());
        assert_eq!(task.iteration_index, NO_ITERATION);
        assert_eq!(task.author, Author::user());
    }

    #[test]
    fn test_generation_serialization() {
        assert_eq!(serde_json::to_string(&Generation::Initial).unwrap(), "\"initial\"");
        assert_eq!(serde_json::to_string(&Generation::Number(7)).unwrap(), "7");

        let parsed: Generation = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, Generation::Number(12));
        let parsed: Generation = serde_json::from_str("\"initial\"").unwrap();
        assert_eq!(parsed, Generation::Initial);
        assert!(serde_json::from_str::<Generation>("\"later\"").is_err());
    }

    #[test]
    fn test_candidate_keeps_unknown_keys() {
        let json = r#"{
            "name": "CoT",
            "code": "[f]\nreturns = \"task\"\nsteps = []",
            "generation": 3,
            "fitness": "95% Bootstrap Confidence Interval: (1.0%, 2.0%), Median: 1.5%",
            "accuracy": 0.015,
            "novelty": "high"
        }"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.generation, Some(Generation::Number(3)));
        assert!(candidate.is_scored());
        assert_eq!(candidate.extra["novelty"], "high");

        let back = serde_json::to_value(&candidate).unwrap();
        assert_eq!(back["novelty"], "high");
        assert!(back.get("test_fitness").is_none());
    }
}
