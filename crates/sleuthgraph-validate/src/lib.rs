//! Anti-automation validation for sleuthgraph mysteries.
//!
//! A mystery is certified when a single unguided oracle pass misses the
//! answer while a hop-by-hop guided pass reproduces every inference. The
//! oracle is any [`Oracle`]: HTTP providers in [`providers`], or
//! [`ScriptedOracle`] for deterministic runs.

pub mod config;
pub mod matching;
pub mod oracle;
pub mod prompts;
pub mod providers;
pub mod scripted;
pub mod validator;

pub use config::{Backend, ConfigError, OracleConfig, OracleOverrides};
pub use oracle::{GenerateOptions, Oracle, OracleError};
pub use providers::build_oracle;
pub use scripted::ScriptedOracle;
pub use validator::{AntiAutomationValidator, StepStatus, ValidationResult, ValidationStep};
