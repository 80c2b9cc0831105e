//! Oracle provider configuration.
//!
//! Resolution order: explicit values (CLI flags), then environment variables,
//! then built-in defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const OLLAMA_MODEL_ENV: &str = "OLLAMA_MODEL";
pub const ORACLE_TIMEOUT_SECS_ENV: &str = "SLEUTHGRAPH_ORACLE_TIMEOUT_SECS";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no oracle configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or OLLAMA_HOST")]
    NoProviderConfigured,

    #[error("{backend} backend requires {var}")]
    MissingVar { backend: Backend, var: &'static str },

    #[error("{0} backend was not compiled in (enable the `{0}` feature)")]
    BackendDisabled(Backend),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    Anthropic,
    Ollama,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Anthropic => "anthropic",
            Backend::Ollama => "ollama",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Backend::OpenAi => "gpt-4o-mini",
            Backend::Anthropic => "claude-3-5-haiku-latest",
            Backend::Ollama => "llama3.1",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Backend::OpenAi),
            "anthropic" => Ok(Backend::Anthropic),
            "ollama" => Ok(Backend::Ollama),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend `{other}` (expected openai, anthropic or ollama)"
            ))),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub backend: Backend,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Explicit overrides, typically from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct OracleOverrides {
    pub backend: Option<Backend>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the timeout. `0` disables it.
pub fn resolve_timeout(override_secs: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    let secs = match override_secs {
        Some(v) => v,
        None => match env_nonempty(ORACLE_TIMEOUT_SECS_ENV) {
            Some(v) => v.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "invalid {ORACLE_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds; 0 disables)"
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        },
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn normalize_base_url(raw: &str, default: &str, scheme: &str) -> String {
    let mut url = raw.trim().to_string();
    if url.is_empty() {
        url = default.to_string();
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("{scheme}://{url}");
    }
    url.trim_end_matches('/').to_string()
}

impl OracleConfig {
    /// Resolve from overrides and the environment. Without an explicit
    /// backend the first configured provider wins: OpenAI, Anthropic, Ollama.
    pub fn resolve(overrides: &OracleOverrides) -> Result<Self, ConfigError> {
        let backend = match overrides.backend {
            Some(b) => b,
            None if env_nonempty(OPENAI_API_KEY_ENV).is_some() => Backend::OpenAi,
            None if env_nonempty(ANTHROPIC_API_KEY_ENV).is_some() => Backend::Anthropic,
            None if env_nonempty(OLLAMA_HOST_ENV).is_some() => Backend::Ollama,
            None => return Err(ConfigError::NoProviderConfigured),
        };
        let timeout = resolve_timeout(overrides.timeout_secs)?;

        let (key_var, model_var, url_var, default_url, scheme) = match backend {
            Backend::OpenAi => (
                Some(OPENAI_API_KEY_ENV),
                OPENAI_MODEL_ENV,
                OPENAI_BASE_URL_ENV,
                DEFAULT_OPENAI_BASE_URL,
                "https",
            ),
            Backend::Anthropic => (
                Some(ANTHROPIC_API_KEY_ENV),
                ANTHROPIC_MODEL_ENV,
                "",
                DEFAULT_ANTHROPIC_BASE_URL,
                "https",
            ),
            Backend::Ollama => (None, OLLAMA_MODEL_ENV, OLLAMA_HOST_ENV, DEFAULT_OLLAMA_HOST, "http"),
        };

        let api_key = match key_var {
            Some(var) => Some(env_nonempty(var).ok_or(ConfigError::MissingVar { backend, var })?),
            None => None,
        };
        let model = overrides
            .model
            .clone()
            .or_else(|| env_nonempty(model_var))
            .unwrap_or_else(|| backend.default_model().to_string());
        let raw_url = overrides
            .base_url
            .clone()
            .or_else(|| (!url_var.is_empty()).then(|| env_nonempty(url_var)).flatten())
            .unwrap_or_default();

        Ok(Self {
            backend,
            model,
            api_key,
            base_url: normalize_base_url(&raw_url, default_url, scheme),
            timeout,
        })
    }
}
