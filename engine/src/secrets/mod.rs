//! Oracle credentials and secret scrubbing
//!
//! Keys are read from environment variables named in the `[oracle]` config
//! section and held in [`SecretString`]. Error text coming back from the
//! oracle passes through [`scrub_secrets`] before it is logged or fed back to
//! the meta-agent as a debug observation.

pub mod string;

pub use string::SecretString;

use regex::Regex;
use std::sync::OnceLock;

/// Regex patterns for detecting common secret formats.
/// These are compiled once and reused.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9]{20,} (including sk-proj- variants)
/// - Azure OpenAI keys: 32 hex characters
/// - Bearer tokens: Bearer\s+[^\s]{20,}
/// - api-key / X-Proxy-Key header echoes
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"\b[0-9a-fA-F]{32}\b",
            r"Bearer\s+[^\s]{20,}",
            r"(?i)(api-key|x-proxy-key)\s*[:=]\s*[^\s,;]+",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`
///
/// # Examples
///
/// ```
/// use darwin_engine::secrets::scrub_secrets;
///
/// let scrubbed = scrub_secrets("My API key is sk-1234567890abcdefghij");
/// assert_eq!(scrubbed, "My API key is [REDACTED]");
/// ```
pub fn scrub_secrets(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
