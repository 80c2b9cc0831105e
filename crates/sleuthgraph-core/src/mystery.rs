//! The finished mystery artifact and its assembler.

use crate::document::{Document, DocumentId};
use crate::error::{MysteryError, Result};
use crate::proof_tree::ProofTree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysteryMetadata {
    pub mystery_id: String,
    pub question: String,
    pub answer: String,
    /// 1 (trivial) to 10.
    pub difficulty: u8,
    pub total_documents: usize,
    pub total_images: usize,
    /// Unix seconds.
    pub created_at: i64,
    /// Seconds.
    pub expires_in: u64,
}

/// A planned illustration. The image file itself is produced (or not) by an
/// external synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub document_id: DocumentId,
    pub prompt: String,
    pub file_name: String,
}

/// Everything a mystery is made of, before checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysteryParts {
    pub metadata: MysteryMetadata,
    pub documents: Vec<Document>,
    pub proof_tree: ProofTree,
    pub answer: String,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

/// Immutable mystery. Only [`MysteryAssembler::assemble`] (and
/// deserialization, which goes through it) can produce one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MysteryParts", into = "MysteryParts")]
pub struct Mystery {
    parts: MysteryParts,
}

impl TryFrom<MysteryParts> for Mystery {
    type Error = MysteryError;

    fn try_from(parts: MysteryParts) -> Result<Self> {
        MysteryAssembler::assemble(parts)
    }
}

impl From<Mystery> for MysteryParts {
    fn from(mystery: Mystery) -> Self {
        mystery.parts
    }
}

impl Mystery {
    pub fn id(&self) -> &str {
        &self.parts.metadata.mystery_id
    }

    pub fn metadata(&self) -> &MysteryMetadata {
        &self.parts.metadata
    }

    pub fn documents(&self) -> &[Document] {
        &self.parts.documents
    }

    pub fn proof_tree(&self) -> &ProofTree {
        &self.parts.proof_tree
    }

    pub fn answer(&self) -> &str {
        &self.parts.answer
    }

    pub fn question(&self) -> &str {
        &self.parts.metadata.question
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.parts.images
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        self.parts.documents.iter().find(|d| d.id() == id)
    }

    pub fn into_parts(self) -> MysteryParts {
        self.parts
    }
}

pub struct MysteryAssembler;

impl MysteryAssembler {
    /// Check counts, step numbering and hop evidence, then freeze.
    pub fn assemble(parts: MysteryParts) -> Result<Mystery> {
        let meta = &parts.metadata;
        check_count("total_documents", meta.total_documents, parts.documents.len())?;
        check_count("total_images", meta.total_images, parts.images.len())?;
        check_count("total_hops", parts.proof_tree.total_hops, parts.proof_tree.hops.len())?;

        for (position, hop) in parts.proof_tree.hops.iter().enumerate() {
            if hop.step_number as usize != position + 1 {
                return Err(MysteryError::BrokenStepSequence {
                    position,
                    found: hop.step_number,
                });
            }
        }

        let by_id: HashMap<&DocumentId, &Document> =
            parts.documents.iter().map(|d| (d.id(), d)).collect();
        check_count("distinct document ids", parts.documents.len(), by_id.len())?;

        for hop in &parts.proof_tree.hops {
            let mut supported = false;
            for id in &hop.supporting_document_ids {
                let doc = by_id.get(id).ok_or_else(|| MysteryError::MissingEvidence {
                    step: hop.step_number,
                    document_id: id.to_string(),
                })?;
                supported |= doc.mentions(&hop.expected_inference);
            }
            if !supported {
                return Err(MysteryError::UnsupportedHop {
                    step: hop.step_number,
                    expected: hop.expected_inference.clone(),
                });
            }
        }

        for image in &parts.images {
            if !by_id.contains_key(&image.document_id) {
                return Err(MysteryError::MissingEvidence {
                    step: 0,
                    document_id: image.document_id.to_string(),
                });
            }
        }

        Ok(Mystery { parts })
    }
}

fn check_count(field: &'static str, declared: usize, actual: usize) -> Result<()> {
    if declared == actual {
        Ok(())
    } else {
        Err(MysteryError::CountMismatch {
            field,
            declared,
            actual,
        })
    }
}

/// 1..=10 from hop count and category spread.
pub fn derive_difficulty(total_hops: usize, distinct_categories: usize) -> u8 {
    let raw = total_hops + distinct_categories.saturating_sub(1);
    raw.saturating_sub(1).clamp(1, 10) as u8
}
