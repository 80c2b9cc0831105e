//! Anti-automation validator.
//!
//! Two strictly sequential phases against one oracle:
//!
//! 1. single shot: every document and the top-level question in one turn.
//!    The oracle should *not* reach the answer.
//! 2. guided: one turn per proof-tree hop, in order, showing only that hop's
//!    supporting documents. Every step should match.
//!
//! Oracle errors never abort a run; they are recorded as unevaluated.

use crate::matching::{single_shot_leaks, step_matches};
use crate::oracle::{GenerateOptions, Oracle};
use crate::prompts::{guided_step_prompt, single_shot_prompt};
use serde::{Deserialize, Serialize};
use sleuthgraph_core::{Document, Hop, Mystery};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Matched,
    Mismatched,
    /// The oracle failed; the step counts as not matched.
    Unevaluated { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub step_number: u32,
    pub sub_question: String,
    pub llm_response: String,
    pub expected_inference: String,
    pub matches: bool,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub mystery_id: String,
    pub single_llm_response: String,
    pub single_llm_got_answer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_llm_error: Option<String>,
    pub multi_hop_steps: Vec<ValidationStep>,
    pub multi_hop_reached_answer: bool,
    pub is_valid: bool,
    pub reason: String,
}

impl ValidationResult {
    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Mystery ID: {}", self.mystery_id);
        let _ = writeln!(out, "Valid: {}", self.is_valid);
        let _ = writeln!(out, "Reason: {}", self.reason);
        let _ = writeln!(out);
        let _ = writeln!(out, "Single-LLM Test (should fail):");
        match &self.single_llm_error {
            Some(err) => {
                let _ = writeln!(out, "  not evaluated: {err}");
            }
            None => {
                let _ = writeln!(out, "  Got answer: {}", self.single_llm_got_answer);
                let _ = writeln!(out, "  Response: {}", self.single_llm_response);
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Multi-Hop Test (should pass):");
        let _ = writeln!(out, "  Reached answer: {}", self.multi_hop_reached_answer);
        let _ = writeln!(out, "  Multi-hop steps: {}", self.multi_hop_steps.len());
        for step in &self.multi_hop_steps {
            let mark = match &step.status {
                StepStatus::Matched => "ok".to_string(),
                StepStatus::Mismatched => "MISMATCH".to_string(),
                StepStatus::Unevaluated { error } => format!("UNEVALUATED ({error})"),
            };
            let _ = writeln!(out, "  Step {}: {}", step.step_number, mark);
            let _ = writeln!(out, "    Q: {}", step.sub_question);
            let _ = writeln!(out, "    Expected: {}", step.expected_inference);
            let _ = writeln!(out, "    Got: {}", step.llm_response);
        }
        out
    }
}

pub struct AntiAutomationValidator<'a> {
    oracle: &'a dyn Oracle,
    single_shot: GenerateOptions,
    guided: GenerateOptions,
}

impl<'a> AntiAutomationValidator<'a> {
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self {
            oracle,
            single_shot: GenerateOptions::single_shot(),
            guided: GenerateOptions::guided_step(),
        }
    }

    pub fn with_options(mut self, single_shot: GenerateOptions, guided: GenerateOptions) -> Self {
        self.single_shot = single_shot;
        self.guided = guided;
        self
    }

    pub fn validate(&self, mystery: &Mystery) -> ValidationResult {
        info!(mystery_id = mystery.id(), oracle = self.oracle.name(), "validating mystery");

        let (single_llm_response, single_llm_got_answer, single_llm_error) =
            self.single_shot(mystery);
        let multi_hop_steps = self.guided(mystery);
        let multi_hop_reached_answer =
            !multi_hop_steps.is_empty() && multi_hop_steps.iter().all(|s| s.matches);

        let is_valid = !single_llm_got_answer && multi_hop_reached_answer;
        let reason = verdict_reason(
            &single_llm_response,
            single_llm_got_answer,
            single_llm_error.as_deref(),
            &multi_hop_steps,
        );
        info!(mystery_id = mystery.id(), is_valid, %reason, "validation finished");

        ValidationResult {
            mystery_id: mystery.id().to_string(),
            single_llm_response,
            single_llm_got_answer,
            single_llm_error,
            multi_hop_steps,
            multi_hop_reached_answer,
            is_valid,
            reason,
        }
    }

    fn single_shot(&self, mystery: &Mystery) -> (String, bool, Option<String>) {
        let prompt = single_shot_prompt(mystery.question(), mystery.documents());
        match self.oracle.generate(&prompt, &self.single_shot) {
            Ok(response) => {
                let leaked = single_shot_leaks(&response, mystery.answer());
                debug!(leaked, "single-shot response received");
                (response.trim().to_string(), leaked, None)
            }
            Err(e) => {
                warn!(error = %e, "single-shot oracle call failed");
                (String::new(), false, Some(e.to_string()))
            }
        }
    }

    fn guided(&self, mystery: &Mystery) -> Vec<ValidationStep> {
        let mut findings: Vec<String> = Vec::new();
        let mut steps = Vec::with_capacity(mystery.proof_tree().hops.len());

        for hop in &mystery.proof_tree().hops {
            let prompt = guided_step_prompt(&hop.sub_question, supporting(mystery, hop), &findings);
            let step = match self.oracle.generate(&prompt, &self.guided) {
                Ok(response) => {
                    let response = response.trim().to_string();
                    let matches = step_matches(&response, &hop.expected_inference);
                    debug!(step = hop.step_number, matches, "guided step evaluated");
                    if matches {
                        findings.push(response.clone());
                    }
                    ValidationStep {
                        step_number: hop.step_number,
                        sub_question: hop.sub_question.clone(),
                        llm_response: response,
                        expected_inference: hop.expected_inference.clone(),
                        matches,
                        status: if matches {
                            StepStatus::Matched
                        } else {
                            StepStatus::Mismatched
                        },
                    }
                }
                Err(e) => {
                    warn!(step = hop.step_number, error = %e, "guided oracle call failed");
                    ValidationStep {
                        step_number: hop.step_number,
                        sub_question: hop.sub_question.clone(),
                        llm_response: String::new(),
                        expected_inference: hop.expected_inference.clone(),
                        matches: false,
                        status: StepStatus::Unevaluated { error: e.to_string() },
                    }
                }
            };
            steps.push(step);
        }
        steps
    }
}

fn supporting<'m>(mystery: &'m Mystery, hop: &'m Hop) -> impl Iterator<Item = &'m Document> + 'm {
    hop.supporting_document_ids
        .iter()
        .filter_map(move |id| mystery.document(id))
}

fn verdict_reason(
    single_response: &str,
    leaked: bool,
    single_error: Option<&str>,
    steps: &[ValidationStep],
) -> String {
    if leaked {
        return format!(
            "single-shot leak: the oracle reached the answer without guidance (response: {single_response:?})"
        );
    }
    if steps.is_empty() {
        return "guided failure: the proof tree has no steps".to_string();
    }
    if let Some(step) = steps.iter().find(|s| !s.matches) {
        return match &step.status {
            StepStatus::Unevaluated { error } => format!(
                "guided step {} could not be evaluated: {error}",
                step.step_number
            ),
            _ => format!(
                "guided step {} did not match: expected {:?}, got {:?}",
                step.step_number, step.expected_inference, step.llm_response
            ),
        };
    }
    match single_error {
        Some(err) => format!(
            "every guided step matched; single-shot attempt could not be evaluated ({err})"
        ),
        None => "single-shot attempt missed the answer and every guided step matched".to_string(),
    }
}
