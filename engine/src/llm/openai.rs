//! OpenAI-compatible chat completions backend
//!
//! Talks to either the public OpenAI API (or any server exposing the same
//! `/chat/completions` route, such as a local rate-limiting proxy) or an Azure
//! OpenAI deployment. Every request asks for `response_format: json_object`.

use super::{parse_json_object, JsonObject, LLMError, Oracle, OracleRequest};
use crate::config::{ApiStyle, OracleConfig};
use crate::secrets::{scrub_secrets, SecretString};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Header carrying the gateway key when a proxy sits in front of the oracle
const PROXY_KEY_HEADER: &str = "X-Proxy-Key";

/// Error markers returned by OpenAI-style servers on context overflow
const CONTEXT_LENGTH_MARKERS: &[&str] = &["maximum context length", "context_length_exceeded"];

pub struct OpenAIOracle {
    config: OracleConfig,
    api_key: Option<SecretString>,
    proxy_key: Option<SecretString>,
    client: reqwest::Client,
}

impl OpenAIOracle {
    pub fn new(
        config: OracleConfig,
        api_key: Option<SecretString>,
        proxy_key: Option<SecretString>,
    ) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            proxy_key,
            client,
        })
    }

    /// Build the backend from config, reading keys from the configured env vars
    pub fn from_config(config: &OracleConfig) -> super::Result<Self> {
        let api_key = SecretString::from_env(&config.api_key_env);
        let proxy_key = config
            .proxy_key_env
            .as_deref()
            .and_then(SecretString::from_env);

        if api_key.is_none() && proxy_key.is_none() {
            tracing::warn!(
                "Neither {} nor a proxy key is set; requests are sent unauthenticated",
                config.api_key_env
            );
        }

        Self::new(config.clone(), api_key, proxy_key)
    }

    fn endpoint(&self, model: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.api_style {
            ApiStyle::OpenAI => format!("{}/chat/completions", base),
            ApiStyle::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base,
                model,
                self.config.api_version.as_deref().unwrap_or_default()
            ),
        }
    }

    fn classify_failure(status: reqwest::StatusCode, body: String) -> LLMError {
        let body = scrub_secrets(&body);
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(body),
            429 => LLMError::RateLimitExceeded,
            _ if CONTEXT_LENGTH_MARKERS.iter().any(|m| body.contains(m)) => {
                LLMError::ContextLengthExceeded(body)
            }
            400..=499 => LLMError::InvalidRequest(body),
            _ => LLMError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl Oracle for OpenAIOracle {
    fn name(&self) -> &str {
        match self.config.api_style {
            ApiStyle::OpenAI => "openai",
            ApiStyle::Azure => "azure",
        }
    }

    async fn complete_json(&self, request: &OracleRequest) -> super::Result<JsonObject> {
        let url = self.endpoint(&request.model);

        let api_messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": request.model,
            "messages": api_messages,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
            "response_format": { "type": "json_object" },
        });

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.api_key {
            builder = match self.config.api_style {
                ApiStyle::OpenAI => {
                    builder.header("Authorization", format!("Bearer {}", key.unsecure()))
                }
                ApiStyle::Azure => builder.header("api-key", key.unsecure()),
            };
        }
        if let Some(key) = &self.proxy_key {
            builder = builder.header(PROXY_KEY_HEADER, key.unsecure());
        }

        let response = builder.json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::NetworkError(scrub_secrets(&e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::classify_failure(status, text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        if let Some(usage) = data.get("usage") {
            tracing::debug!(
                model = %request.model,
                prompt_tokens = usage.get("prompt_tokens").and_then(|v| v.as_u64()),
                completion_tokens = usage.get("completion_tokens").and_then(|v| v.as_u64()),
                "Oracle usage"
            );
        }

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))?;

        parse_json_object(content).ok_or_else(|| {
            LLMError::ParseError(format!(
                "Response is not a JSON object: {}",
                content.chars().take(200).collect::<String>()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn config(style: ApiStyle) -> OracleConfig {
        OracleConfig {
            api_style: style,
            base_url: "https://example.openai.azure.com/".to_string(),
            api_version: Some("2024-06-01".to_string()),
            ..OracleConfig::default()
        }
    }

    #[test]
    fn test_openai_endpoint() {
        let oracle = OpenAIOracle::new(config(ApiStyle::OpenAI), None, None).unwrap();
        assert_eq!(
            oracle.endpoint("gpt-4o"),
            "https://example.openai.azure.com/chat/completions"
        );
    }

    #[test]
    fn test_azure_endpoint_uses_deployment() {
        let oracle = OpenAIOracle::new(config(ApiStyle::Azure), None, None).unwrap();
        assert_eq!(
            oracle.endpoint("gpt-4o"),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(oracle.name(), "azure");
    }

    #[test]
    fn test_failure_classification() {
        assert!(matches!(
            OpenAIOracle::classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            OpenAIOracle::classify_failure(
                StatusCode::BAD_REQUEST,
                "This model's maximum context length is 128000 tokens".to_string()
            ),
            LLMError::ContextLengthExceeded(_)
        ));
        assert!(matches!(
            OpenAIOracle::classify_failure(StatusCode::UNAUTHORIZED, String::new()),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            OpenAIOracle::classify_failure(StatusCode::BAD_GATEWAY, String::new()),
            LLMError::Unknown(_)
        ));
    }
}
