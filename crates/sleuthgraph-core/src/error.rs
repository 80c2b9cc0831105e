//! Error taxonomy for mystery generation.

use crate::catalog::DocumentType;
use crate::graph::EntityId;

/// The identity graph cannot support the requested reasoning chain.
///
/// Fatal to one generation attempt; the pipeline retries with adjusted
/// parameters instead of emitting a partial graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphIncoherence {
    #[error("no path from root cause {root} to answer {answer}")]
    NoPath { root: EntityId, answer: EntityId },

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("subgraph {subgraph} cannot be connected: {reason}")]
    Disconnected { subgraph: usize, reason: String },

    #[error("proof path has {hops} hop(s); at least {min} required")]
    TooShallow { hops: usize, min: usize },
}

/// Where a forbidden key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLevel {
    TopLevel,
    Fields,
}

impl std::fmt::Display for FieldLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldLevel::TopLevel => f.write_str("top level"),
            FieldLevel::Fields => f.write_str("fields"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A technical-only key inside a narrative document.
    TechnicalKey { key: String, level: FieldLevel },
    /// A key the document type's schema does not declare.
    UnknownKey { key: String, level: FieldLevel },
    /// Fields that do not decode into the type's schema.
    Malformed(String),
    /// A document type tag outside the catalog.
    UnknownType(String),
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::TechnicalKey { key, level } => {
                write!(f, "technical-only key `{key}` at {level}")
            }
            ViolationKind::UnknownKey { key, level } => write!(f, "undeclared key `{key}` at {level}"),
            ViolationKind::Malformed(msg) => write!(f, "malformed fields: {msg}"),
            ViolationKind::UnknownType(tag) => write!(f, "unknown document type `{tag}`"),
        }
    }
}

/// A document broke the narrative/technical separation or its type schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema violation in {document_id} ({document_type}): {kind}")]
pub struct SchemaViolation {
    pub document_id: String,
    pub document_type: String,
    pub kind: ViolationKind,
}

impl SchemaViolation {
    pub fn new(document_id: impl Into<String>, document_type: DocumentType, kind: ViolationKind) -> Self {
        Self {
            document_id: document_id.into(),
            document_type: document_type.as_str().to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog has no entries for category `{0}`")]
    MissingCategory(String),

    #[error("unknown category `{0}`")]
    UnknownCategory(String),

    #[error("unknown document type `{0}`")]
    UnknownDocumentType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MysteryError {
    #[error(transparent)]
    Graph(#[from] GraphIncoherence),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error("metadata declares {declared} {field} but the mystery holds {actual}")]
    CountMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("step {step} cites missing document {document_id}")]
    MissingEvidence { step: u32, document_id: String },

    #[error("step {step}: no supporting document states `{expected}`")]
    UnsupportedHop { step: u32, expected: String },

    #[error("step numbers must run 1..=n without gaps; found {found} at position {position}")]
    BrokenStepSequence { position: usize, found: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("gave up after {attempts} attempt(s); last error: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<MysteryError>,
    },
}

pub type Result<T, E = MysteryError> = std::result::Result<T, E>;
