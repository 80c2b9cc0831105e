use proptest::prelude::*;
use serde_json::{json, Map, Value};
use sleuthgraph_core::{
    Document, DocumentDraft, DocumentId, DocumentType, GeneratorConfig, Hop, Mystery,
    MysteryAssembler, MysteryForge, MysteryMetadata, MysteryParts, ProofTree,
};
use sleuthgraph_validate::{
    AntiAutomationValidator, OracleError, ScriptedOracle, StepStatus, ValidationResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// Fixtures
// =============================================================================

const STEP_1: &str = "Who badged into Server Room B at 22:14?";
const STEP_2: &str = "What did E. Voss access after badging in?";
const ANSWER: &str = "E. Voss exfiltrated the ledger via Server Room B";

fn object(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

fn doc(n: usize, ty: DocumentType, fields: Value) -> Document {
    DocumentDraft::new(&DocumentId::from_index(n), ty, object(fields))
        .with_clue_refs(Vec::new())
        .emit()
        .unwrap()
}

fn server_room_mystery() -> Mystery {
    let documents = vec![
        doc(
            1,
            DocumentType::InternalMemo,
            json!({
                "from": "R. Petrov, Facilities",
                "to": "Security desk",
                "date": "2024-03-14",
                "subject": "Badge activity, Server Room B",
                "body": "The 22:14 badge-in at Server Room B belongs to Employee E. Voss.",
            }),
        ),
        doc(
            2,
            DocumentType::Email,
            json!({
                "from": "it-audit@northwind.example",
                "to": "security@northwind.example",
                "cc": [],
                "subject": "Unusual download",
                "sent_at": "2024-03-14 22:31",
                "body": "Right after the badge-in, E. Voss ran a Financial ledger export from the finance share.",
            }),
        ),
        doc(
            3,
            DocumentType::Diary,
            json!({
                "author": "M. Okafor",
                "date": "2024-03-14",
                "entry": "Long day. The coffee machine on floor two is broken again.",
            }),
        ),
    ];
    let proof_tree = ProofTree::new(vec![
        Hop {
            step_number: 1,
            sub_question: STEP_1.into(),
            expected_inference: "Employee E. Voss".into(),
            supporting_document_ids: vec![DocumentId::from_index(1)],
            category: None,
        },
        Hop {
            step_number: 2,
            sub_question: STEP_2.into(),
            expected_inference: "Financial ledger export".into(),
            supporting_document_ids: vec![DocumentId::from_index(2)],
            category: None,
        },
    ]);
    MysteryAssembler::assemble(MysteryParts {
        metadata: MysteryMetadata {
            mystery_id: "5f0c3a52-8d7e-4f4e-9a51-2b8c3d1e0f11".into(),
            question: "Who exfiltrated the finance ledger?".into(),
            answer: ANSWER.into(),
            difficulty: 3,
            total_documents: documents.len(),
            total_images: 0,
            created_at: 1_710_000_000,
            expires_in: 604_800,
        },
        documents,
        proof_tree,
        answer: ANSWER.into(),
        images: Vec::new(),
    })
    .unwrap()
}

fn question_line(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("QUESTION: "))
        .unwrap_or("")
}

fn is_single_shot(prompt: &str) -> bool {
    prompt.starts_with("You are a detective")
}

/// Answers each guided step exactly and gives `single` on the single-shot turn.
fn stub(single: &'static str) -> ScriptedOracle {
    ScriptedOracle::new(move |prompt| {
        if is_single_shot(prompt) {
            return Ok(single.to_string());
        }
        Ok(match question_line(prompt) {
            STEP_1 => "Employee E. Voss".to_string(),
            STEP_2 => "Financial ledger export".to_string(),
            _ => "no idea".to_string(),
        })
    })
}

fn validate(oracle: &ScriptedOracle, mystery: &Mystery) -> ValidationResult {
    AntiAutomationValidator::new(oracle).validate(mystery)
}

// =============================================================================
// Verdicts
// =============================================================================

#[test]
fn guided_success_without_single_shot_leak_is_valid() {
    let mystery = server_room_mystery();
    let result = validate(&stub("The janitor"), &mystery);

    assert!(!result.single_llm_got_answer);
    assert!(result.multi_hop_reached_answer);
    assert!(result.is_valid, "{}", result.reason);
    assert_eq!(result.multi_hop_steps.len(), 2);
    assert!(result
        .multi_hop_steps
        .iter()
        .all(|s| s.matches && s.status == StepStatus::Matched));
    assert_eq!(result.mystery_id, mystery.id());
}

#[test]
fn single_shot_leak_invalidates_regardless_of_guided_steps() {
    let mystery = server_room_mystery();
    let result = validate(&stub("Probably E. Voss, given the badge log"), &mystery);

    assert!(result.single_llm_got_answer);
    assert!(result.multi_hop_reached_answer);
    assert!(!result.is_valid);
    assert!(result.reason.contains("single-shot leak"), "{}", result.reason);
}

#[test]
fn leak_is_reported_before_guided_failure() {
    let mystery = server_room_mystery();
    let oracle = ScriptedOracle::constant("E. Voss");
    let result = validate(&oracle, &mystery);
    assert!(!result.is_valid);
    assert!(!result.multi_hop_reached_answer);
    assert!(result.reason.contains("single-shot leak"));
}

#[test]
fn mismatched_step_names_the_step() {
    let mystery = server_room_mystery();
    let oracle = ScriptedOracle::new(|prompt| {
        Ok(match question_line(prompt) {
            STEP_1 => "Employee E. Voss",
            STEP_2 => "The coffee machine",
            _ => "unclear",
        }
        .to_string())
    });
    let result = validate(&oracle, &mystery);

    assert!(!result.is_valid);
    assert_eq!(result.multi_hop_steps[1].status, StepStatus::Mismatched);
    assert!(result.reason.contains("guided step 2 did not match"), "{}", result.reason);
}

// =============================================================================
// Oracle failures
// =============================================================================

#[test]
fn guided_oracle_errors_are_unevaluated_not_fatal() {
    let mystery = server_room_mystery();
    let oracle = ScriptedOracle::new(|prompt| {
        if is_single_shot(prompt) {
            Ok("unknown".to_string())
        } else {
            Err(OracleError::Timeout("no reply within 1s".into()))
        }
    });
    let result = validate(&oracle, &mystery);

    assert_eq!(result.multi_hop_steps.len(), 2);
    for step in &result.multi_hop_steps {
        assert!(!step.matches);
        assert!(matches!(step.status, StepStatus::Unevaluated { .. }));
    }
    assert!(!result.is_valid);
    assert!(result.reason.contains("could not be evaluated"), "{}", result.reason);
    assert!(result.reason.contains("timed out"));
}

#[test]
fn single_shot_error_still_yields_a_verdict() {
    let mystery = server_room_mystery();
    let oracle = ScriptedOracle::new(|prompt| {
        if is_single_shot(prompt) {
            return Err(OracleError::Quota("429 Too Many Requests".into()));
        }
        Ok(match question_line(prompt) {
            STEP_1 => "Employee E. Voss",
            _ => "Financial ledger export",
        }
        .to_string())
    });
    let result = validate(&oracle, &mystery);

    assert!(result.is_valid);
    assert!(!result.single_llm_got_answer);
    assert!(result.single_llm_error.as_deref().unwrap().contains("quota"));
    assert!(result.reason.contains("single-shot attempt could not be evaluated"));
    assert!(result.summary().contains("not evaluated"));
}

// =============================================================================
// Prompt ordering
// =============================================================================

#[test]
fn guided_prompts_never_reveal_later_hops() {
    let mystery = server_room_mystery();
    let oracle = stub("unknown");
    validate(&oracle, &mystery);

    let prompts = oracle.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(is_single_shot(&prompts[0]));
    assert!(prompts[0].contains("coffee machine"));

    assert_eq!(question_line(&prompts[1]), STEP_1);
    assert!(!prompts[1].contains(STEP_2));
    assert!(!prompts[1].contains("Financial ledger export"));
    assert!(!prompts[1].contains("coffee machine"));
    assert!(!prompts[1].contains("PREVIOUS FINDINGS"));

    assert_eq!(question_line(&prompts[2]), STEP_2);
    assert!(prompts[2].contains("PREVIOUS FINDINGS:\n- Employee E. Voss"));
}

#[test]
fn only_matched_responses_become_findings() {
    let mystery = server_room_mystery();
    let oracle = ScriptedOracle::new(|prompt| {
        Ok(match question_line(prompt) {
            STEP_1 => "The night guard",
            _ => "unknown",
        }
        .to_string())
    });
    validate(&oracle, &mystery);
    let prompts = oracle.prompts();
    assert!(!prompts[2].contains("PREVIOUS FINDINGS"));
}

#[test]
fn validation_is_idempotent_with_a_deterministic_oracle() {
    let mystery = server_room_mystery();
    let oracle = stub("The janitor");
    let first = validate(&oracle, &mystery);
    let second = validate(&oracle, &mystery);
    assert_eq!(first, second);
    assert_eq!(first.summary(), second.summary());
}

#[test]
fn summary_lists_every_step() {
    let mystery = server_room_mystery();
    let result = validate(&stub("The janitor"), &mystery);
    let text = result.summary();
    assert!(text.contains(&format!("Mystery ID: {}", mystery.id())));
    assert!(text.contains("Valid: true"));
    assert!(text.contains("Multi-hop steps: 2"));
    assert!(text.contains(STEP_1));
    assert!(text.contains(STEP_2));
}

#[test]
fn result_serializes_with_step_status_tags() {
    let mystery = server_room_mystery();
    let result = validate(&stub("The janitor"), &mystery);
    let v = serde_json::to_value(&result).unwrap();
    assert_eq!(v["multi_hop_steps"][0]["status"]["status"], "matched");
    assert!(v.get("single_llm_error").is_none());
    let back: ValidationResult = serde_json::from_value(v).unwrap();
    assert_eq!(back, result);
}

// =============================================================================
// Generated mysteries
// =============================================================================

/// Replays the proof tree in order and refuses the single-shot turn.
fn informed_oracle(mystery: &Mystery) -> ScriptedOracle {
    let inferences: Vec<String> = mystery
        .proof_tree()
        .hops
        .iter()
        .map(|h| h.expected_inference.clone())
        .collect();
    let next = AtomicUsize::new(0);
    ScriptedOracle::new(move |prompt| {
        if is_single_shot(prompt) {
            return Ok("I cannot determine".to_string());
        }
        let i = next.fetch_add(1, Ordering::SeqCst);
        inferences
            .get(i)
            .cloned()
            .ok_or_else(|| OracleError::Malformed("more steps than hops".into()))
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn generated_mysteries_certify_under_an_informed_oracle(seed in any::<u64>()) {
        let mystery = MysteryForge::new(GeneratorConfig::default())
            .unwrap()
            .generate(seed, 1_700_000_000)
            .unwrap();
        let oracle = informed_oracle(&mystery);
        let result = validate(&oracle, &mystery);
        prop_assert!(result.is_valid, "{}", result.reason);
        prop_assert_eq!(result.multi_hop_steps.len(), mystery.proof_tree().total_hops);
        prop_assert_eq!(oracle.prompts().len(), mystery.proof_tree().total_hops + 1);
    }
}
