//! Text-generation oracle contract.

use serde_json::Value;
use std::time::Duration;

/// Oracle failures. Each is distinguishable so a caller can tell a slow
/// provider from a rate limit from garbage output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle timed out: {0}")]
    Timeout(String),

    #[error("oracle quota exhausted: {0}")]
    Quota(String),

    #[error("oracle returned malformed output: {0}")]
    Malformed(String),

    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("oracle not configured: {0}")]
    Unconfigured(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system: Option<String>,
    /// Per-call bound; providers fall back to their client timeout.
    pub timeout: Option<Duration>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 200,
            system: None,
            timeout: None,
        }
    }
}

impl GenerateOptions {
    pub fn single_shot() -> Self {
        Self {
            max_tokens: 100,
            ..Self::default()
        }
    }

    pub fn guided_step() -> Self {
        Self::default()
    }
}

/// Synchronous text-completion capability.
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, OracleError>;

    fn generate_json(&self, prompt: &str, options: &GenerateOptions) -> Result<Value, OracleError> {
        let text = self.generate(prompt, options)?;
        parse_json_response(&text)
    }
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, OracleError> {
        (**self).generate(prompt, options)
    }

    fn generate_json(&self, prompt: &str, options: &GenerateOptions) -> Result<Value, OracleError> {
        (**self).generate_json(prompt, options)
    }
}

/// Parse a JSON reply, tolerating a surrounding ```json fence.
pub fn parse_json_response(text: &str) -> Result<Value, OracleError> {
    let trimmed = text.trim();
    let body = strip_fence(trimmed).unwrap_or(trimmed);
    if body.is_empty() {
        return Err(OracleError::Malformed("empty response".into()));
    }
    serde_json::from_str(body).map_err(|e| OracleError::Malformed(format!("invalid JSON: {e}")))
}

fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_accepted() {
        let v = parse_json_response("```json\n{\"answer\": \"E. Voss\"}\n```").unwrap();
        assert_eq!(v["answer"], "E. Voss");
        let v = parse_json_response("  [1, 2] ").unwrap();
        assert_eq!(v[1], 2);
    }

    #[test]
    fn prose_is_malformed() {
        assert!(matches!(
            parse_json_response("I think it was Voss."),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(parse_json_response("   "), Err(OracleError::Malformed(_))));
    }
}
