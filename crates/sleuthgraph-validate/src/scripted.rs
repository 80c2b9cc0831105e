//! Deterministic in-process oracle.
//!
//! Replies come from a caller-supplied function of the prompt, and every
//! prompt is recorded, so the validator can be exercised without a network.

use crate::oracle::{GenerateOptions, Oracle, OracleError};
use parking_lot::Mutex;

type Responder = dyn Fn(&str) -> Result<String, OracleError> + Send + Sync;

pub struct ScriptedOracle {
    responder: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `reply`.
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, OracleError> {
        self.prompts.lock().push(prompt.to_string());
        (self.responder)(prompt)
    }
}
