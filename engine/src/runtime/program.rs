//! Agent-program language
//!
//! A candidate is a TOML document with a single top-level table: the entry
//! point. The table declares the agents it uses, an ordered list of steps that
//! bind results to names, and the reference returned from `forward`.
//!
//! ```toml
//! [self_consistency]
//! returns = "final"
//!
//! [[self_consistency.agents]]
//! id = "cot"
//! name = "Chain-of-Thought Agent"
//! fields = ["thinking", "answer"]
//! temperature = 0.8
//!
//! [[self_consistency.steps]]
//! op = "call"
//! agent = "cot"
//! inputs = ["task"]
//! instruction = "Please think step by step and then solve the task."
//! repeat = 5
//! bind = "samples"
//!
//! [[self_consistency.steps]]
//! op = "vote"
//! from = "samples.answer"
//! bind = "final"
//! ```

use regex::Regex;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Binding that always holds the task message
pub const TASK_BINDING: &str = "task";

/// Body of the entry-point table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub agents: Vec<AgentDecl>,

    pub steps: Vec<Step>,

    /// Reference whose messages `forward` returns
    pub returns: String,
}

/// Agent declaration; instances are created fresh for every `forward`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentDecl {
    pub id: String,
    pub name: String,
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One program step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Call(CallStep),
    Vote(VoteStep),
    Loop(LoopStep),
    Constant(ConstantStep),
}

/// Query an agent with the messages behind `inputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallStep {
    pub agent: String,

    #[serde(default)]
    pub inputs: Vec<String>,

    pub instruction: String,

    pub bind: String,

    /// Issue this many concurrent samples, indexed 0..n-1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,

    /// Extend the binding instead of replacing it
    #[serde(default)]
    pub append: bool,

    /// Explicit iteration index; defaults to the enclosing loop counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<i32>,
}

/// Majority vote over message contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteStep {
    pub from: String,
    pub bind: String,
}

/// Run nested steps up to `times` times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopStep {
    pub times: u32,
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<UntilClause>,
}

/// Early exit checked after every loop pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UntilClause {
    #[serde(rename = "ref")]
    pub reference: String,

    /// Compared case-insensitively against the trimmed content
    pub equals: String,
}

/// Bind a fixed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantStep {
    pub bind: String,
    pub field: String,
    pub value: String,
}

impl Step {
    /// Name this step binds its result to, if any
    pub fn binding(&self) -> Option<&str> {
        match self {
            Step::Call(call) => Some(&call.bind),
            Step::Vote(vote) => Some(&vote.bind),
            Step::Constant(constant) => Some(&constant.bind),
            Step::Loop(_) => None,
        }
    }

    /// This step plus every nested step
    pub fn count(&self) -> usize {
        match self {
            Step::Loop(body) => 1 + body.steps.iter().map(Step::count).sum::<usize>(),
            _ => 1,
        }
    }
}

/// Which single message to keep from a resolved reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    First,
    Last,
}

/// Parsed `binding[.field][:first|:last]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub binding: String,
    pub field: Option<String>,
    pub pick: Option<Pick>,
}

fn reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?(?::(last|first))?$",
            )
            .ok()
        })
        .as_ref()
}

/// Whether `name` is usable as a binding, agent id or field name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

impl FromStr for Reference {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = reference_pattern()
            .and_then(|pattern| pattern.captures(s.trim()))
            .ok_or_else(|| {
                EngineError::CandidateCompile(format!(
                    "`{}` is not a valid reference (expected name, name.field, optionally :first or :last)",
                    s
                ))
            })?;

        let binding = captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let field = captures.get(2).map(|m| m.as_str().to_string());
        let pick = captures.get(3).map(|m| match m.as_str() {
            "first" => Pick::First,
            _ => Pick::Last,
        });

        Ok(Self {
            binding,
            field,
            pick,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binding)?;
        if let Some(field) = &self.field {
            write!(f, ".{}", field)?;
        }
        match self.pick {
            Some(Pick::First) => write!(f, ":first"),
            Some(Pick::Last) => write!(f, ":last"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_forms() {
        let r: Reference = "task".parse().unwrap();
        assert_eq!(r.binding, "task");
        assert!(r.field.is_none() && r.pick.is_none());

        let r: Reference = "samples.answer:last".parse().unwrap();
        assert_eq!(r.binding, "samples");
        assert_eq!(r.field.as_deref(), Some("answer"));
        assert_eq!(r.pick, Some(Pick::Last));
        assert_eq!(r.to_string(), "samples.answer:last");

        assert!("1bad".parse::<Reference>().is_err());
        assert!("a.b.c".parse::<Reference>().is_err());
        assert!("a:middle".parse::<Reference>().is_err());
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("cot_agent"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("with space"));
    }

    #[test]
    fn test_step_tags() {
        let def: FunctionDef = toml::from_str(
            r#"
            returns = "out"

            [[steps]]
            op = "constant"
            bind = "out"
            field = "answer"
            value = "A"

            [[steps]]
            op = "loop"
            times = 2
            until = { ref = "out", equals = "a" }

            [[steps.steps]]
            op = "vote"
            from = "out"
            bind = "out"
            "#,
        )
        .unwrap();

        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.steps[0].binding(), Some("out"));
        assert_eq!(def.steps[1].count(), 2);
        match &def.steps[1] {
            Step::Loop(body) => {
                assert_eq!(body.until.as_ref().map(|u| u.equals.as_str()), Some("a"));
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }
}
