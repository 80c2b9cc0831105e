//! HTTP oracles (blocking reqwest).
//!
//! Each backend is behind its own cargo feature. Failures are mapped onto
//! [`OracleError`] so the validator can tell timeouts, quota and malformed
//! replies apart.

use crate::config::{Backend, ConfigError, OracleConfig};
use crate::oracle::Oracle;

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
use crate::oracle::{GenerateOptions, OracleError};
#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
use serde_json::{json, Value};
#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
use tracing::debug;

pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build the oracle selected by `config`.
pub fn build_oracle(config: &OracleConfig) -> Result<Box<dyn Oracle>, ConfigError> {
    match config.backend {
        #[cfg(feature = "openai")]
        Backend::OpenAi => Ok(Box::new(OpenAiOracle::new(config)?)),
        #[cfg(feature = "anthropic")]
        Backend::Anthropic => Ok(Box::new(AnthropicOracle::new(config)?)),
        #[cfg(feature = "ollama")]
        Backend::Ollama => Ok(Box::new(OllamaOracle::new(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(ConfigError::BackendDisabled(other)),
    }
}

// =============================================================================
// Shared plumbing
// =============================================================================

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
fn http_client(config: &OracleConfig) -> Result<reqwest::blocking::Client, ConfigError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to build http client: {e}")))
}

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
fn required_key(config: &OracleConfig, var: &'static str) -> Result<String, ConfigError> {
    config.api_key.clone().ok_or(ConfigError::MissingVar {
        backend: config.backend,
        var,
    })
}

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
fn send_error(provider: &str, url: &str, e: reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout(format!("{provider} at {url}: {e}"))
    } else {
        OracleError::Transport(format!("failed to reach {provider} at {url}: {e}"))
    }
}

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
fn post_json(
    provider: &str,
    request: reqwest::blocking::RequestBuilder,
    url: &str,
    body: &Value,
    options: &GenerateOptions,
) -> Result<Value, OracleError> {
    let mut request = request.json(body);
    if let Some(timeout) = options.timeout {
        request = request.timeout(timeout);
    }
    let resp = request.send().map_err(|e| send_error(provider, url, e))?;

    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let text = resp.text().unwrap_or_default();
        return Err(OracleError::Quota(format!("{provider} http {status}: {text}")));
    }
    if status == reqwest::StatusCode::REQUEST_TIMEOUT || status == reqwest::StatusCode::GATEWAY_TIMEOUT {
        return Err(OracleError::Timeout(format!("{provider} http {status}")));
    }
    if !status.is_success() {
        let text = resp.text().unwrap_or_default();
        return Err(OracleError::Transport(format!("{provider} http error {status}: {text}")));
    }

    resp.json::<Value>().map_err(|e| {
        if e.is_timeout() {
            OracleError::Timeout(format!("{provider} body read: {e}"))
        } else {
            OracleError::Malformed(format!("{provider} returned invalid JSON: {e}"))
        }
    })
}

#[cfg(any(feature = "openai", feature = "anthropic", feature = "ollama"))]
fn non_empty(provider: &str, text: Option<String>) -> Result<String, OracleError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(OracleError::Malformed(format!(
            "{provider}: no text in response (unexpected response shape)"
        ))),
    }
}

// =============================================================================
// OpenAI backend (chat completions)
// =============================================================================

#[cfg(feature = "openai")]
pub struct OpenAiOracle {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
}

#[cfg(feature = "openai")]
impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/v1/chat/completions", config.base_url),
            api_key: required_key(config, crate::config::OPENAI_API_KEY_ENV)?,
            model: config.model.clone(),
        })
    }
}

#[cfg(feature = "openai")]
fn openai_extract_text(v: &Value) -> Option<String> {
    v.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[cfg(feature = "openai")]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, OracleError> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        debug!(model = %self.model, "openai request");
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let v = post_json("openai", request, &self.url, &body, options)?;
        non_empty("openai", openai_extract_text(&v))
    }
}

// =============================================================================
// Anthropic backend (messages)
// =============================================================================

#[cfg(feature = "anthropic")]
pub struct AnthropicOracle {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
}

#[cfg(feature = "anthropic")]
impl AnthropicOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/v1/messages", config.base_url),
            api_key: required_key(config, crate::config::ANTHROPIC_API_KEY_ENV)?,
            model: config.model.clone(),
        })
    }
}

#[cfg(feature = "anthropic")]
fn anthropic_extract_text(v: &Value) -> Option<String> {
    let mut out = String::new();
    for block in v.get("content")?.as_array()? {
        if block.get("type").and_then(Value::as_str) != Some("text") {
            continue;
        }
        if let Some(t) = block.get("text").and_then(Value::as_str) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    Some(out)
}

#[cfg(feature = "anthropic")]
impl Oracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, OracleError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(system) = &options.system {
            body["system"] = json!(system);
        }

        debug!(model = %self.model, "anthropic request");
        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", DEFAULT_ANTHROPIC_VERSION);
        let v = post_json("anthropic", request, &self.url, &body, options)?;
        non_empty("anthropic", anthropic_extract_text(&v))
    }
}

// =============================================================================
// Ollama backend (local chat)
// =============================================================================

#[cfg(feature = "ollama")]
pub struct OllamaOracle {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

#[cfg(feature = "ollama")]
impl OllamaOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/api/chat", config.base_url),
            model: config.model.clone(),
        })
    }
}

#[cfg(feature = "ollama")]
impl Oracle for OllamaOracle {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, OracleError> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": messages,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            }
        });

        debug!(model = %self.model, "ollama request");
        let request = self.client.post(&self.url);
        let v = post_json("ollama", request, &self.url, &body, options)?;
        let text = v
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string);
        non_empty("ollama", text)
    }
}
