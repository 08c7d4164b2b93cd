//! Oracle Abstraction Layer
//!
//! This module provides a common interface for the language-model oracle that
//! both the meta-agent and candidate programs talk to. The [`Oracle`] trait
//! defines the contract: one chat conversation in, one structured JSON object
//! out. Transport failures are classified into [`LLMError`] variants so callers
//! can tell throttling and context overflow apart from everything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod backoff;
pub mod openai;

pub use backoff::{complete_with_backoff, BackoffPolicy};

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Structured object returned by the oracle
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur during oracle operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<LLMError> for sdk::EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::RateLimitExceeded => sdk::EngineError::OracleRateLimited,
            LLMError::ContextLengthExceeded(_) => sdk::EngineError::ContextTooLong,
            other => sdk::EngineError::Oracle(crate::secrets::scrub_secrets(&other.to_string())),
        }
    }
}

/// Message in an oracle conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role of the message sender (user, assistant, system)
    pub role: ChatRole,

    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
            ChatRole::System => write!(f, "system"),
        }
    }
}

/// One structured-output completion request
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl OracleRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_output_tokens: 4096,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Oracle trait that all completion backends must implement
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the name of the backend (e.g., "openai", "azure")
    fn name(&self) -> &str;

    /// Request a single JSON object for the given conversation
    ///
    /// # Returns
    /// * `Ok(JsonObject)` - The parsed response object
    /// * `Err(LLMError)` - If the request fails or the reply is not an object
    async fn complete_json(&self, request: &OracleRequest) -> Result<JsonObject>;
}

/// Parse a JSON object out of model output.
///
/// Handles multiple output shapes:
/// 1. Raw JSON object
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. A JSON object embedded in prose (first balanced `{...}`)
pub fn parse_json_object(content: &str) -> Option<JsonObject> {
    let trimmed = content.trim();

    if let Some(obj) = try_parse_object(trimmed) {
        return Some(obj);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(obj) = try_parse_object(inner.trim()) {
            return Some(obj);
        }
    }

    let start = trimmed.find('{')?;
    let json_str = extract_balanced_json(&trimmed[start..])?;
    try_parse_object(json_str)
}

fn try_parse_object(s: &str) -> Option<JsonObject> {
    match serde_json::from_str::<serde_json::Value>(s).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
