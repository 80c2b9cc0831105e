//! Prompt text for the two validation protocols.

use sleuthgraph_core::Document;
use std::fmt::Write as _;

fn push_documents<'a>(out: &mut String, documents: impl IntoIterator<Item = &'a Document>) {
    for (i, doc) in documents.into_iter().enumerate() {
        let _ = writeln!(
            out,
            "DOCUMENT {} ({}):\n{}\n",
            i + 1,
            doc.document_type(),
            doc.render_text()
        );
    }
}

/// One unguided turn: every document plus the top-level question.
pub fn single_shot_prompt<'a>(question: &str, documents: impl IntoIterator<Item = &'a Document>) -> String {
    let mut out = String::from(
        "You are a detective analyzing evidence. Answer the question based ONLY on the documents provided.\n\n",
    );
    let _ = write!(out, "QUESTION: {question}\n\nDOCUMENTS:\n");
    push_documents(&mut out, documents);
    out.push_str("Provide your answer in ONE WORD or SHORT PHRASE. Do not explain your reasoning.\n\nANSWER:");
    out
}

/// One guided step: the hop's sub-question, its supporting documents and
/// the findings of earlier matched steps. Nothing from later hops.
pub fn guided_step_prompt<'a>(
    sub_question: &str,
    documents: impl IntoIterator<Item = &'a Document>,
    previous_findings: &[String],
) -> String {
    let mut out = String::from("Analyze the documents and answer the question.\n\n");
    let _ = write!(out, "QUESTION: {sub_question}\n\nDOCUMENTS:\n");
    push_documents(&mut out, documents);
    if !previous_findings.is_empty() {
        out.push_str("PREVIOUS FINDINGS:\n");
        for finding in previous_findings {
            let _ = writeln!(out, "- {finding}");
        }
        out.push('\n');
    }
    out.push_str("Provide a concise answer based on the evidence.\n\nANSWER:");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sleuthgraph_core::{DocumentDraft, DocumentId, DocumentType};

    fn diary() -> Document {
        let serde_json::Value::Object(fields) = json!({
            "author": "M. Okafor",
            "date": "2024-03-14",
            "entry": "Saw someone leave Server Room B late.",
        }) else {
            unreachable!()
        };
        DocumentDraft::new(&DocumentId::from_index(3), DocumentType::Diary, fields)
            .emit()
            .unwrap()
    }

    #[test]
    fn single_shot_lists_documents_and_question() {
        let doc = diary();
        let prompt = single_shot_prompt("Who did it?", [&doc]);
        assert!(prompt.contains("QUESTION: Who did it?"));
        assert!(prompt.contains("DOCUMENT 1 (diary):"));
        assert!(prompt.contains("Server Room B"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[test]
    fn findings_section_only_when_present() {
        let doc = diary();
        let first = guided_step_prompt("Who badged in?", [&doc], &[]);
        assert!(!first.contains("PREVIOUS FINDINGS"));
        let second = guided_step_prompt("What next?", [&doc], &["Employee E. Voss".to_string()]);
        assert!(second.contains("PREVIOUS FINDINGS:\n- Employee E. Voss"));
    }
}
