//! Documents and the narrative/technical emission boundary.
//!
//! Fields are a tagged union keyed by the document type's [`Schema`]; each
//! variant has a closed set of keys. Every document, whether freshly drafted
//! by the synthesizer or read back from disk, enters through
//! [`DocumentDraft::emit`], which runs the technical-key scan for narrative
//! types before decoding into the typed fields.

use crate::catalog::{DocumentType, Schema};
use crate::error::{FieldLevel, SchemaViolation, ViolationKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Keys reserved for machine-generated records.
pub const TECHNICAL_KEYS: &[&str] = &[
    "entries",
    "logs",
    "system_logs",
    "authentication_events",
    "sections",
    "diaries",
    "emails",
    "system_events",
];

pub fn is_technical_key(key: &str) -> bool {
    TECHNICAL_KEYS.contains(&key) || key.ends_with("_log") || key.ends_with("_registry")
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// 1-based: `from_index(1)` is `DOC-0001`.
    pub fn from_index(n: usize) -> Self {
        Self(format!("DOC-{n:04}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Typed field schemas
// ============================================================================

trait FieldSchema: Serialize + DeserializeOwned {
    const KEYS: &'static [&'static str];
}

macro_rules! field_schema {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            $(pub $field: $ty),+
        }

        impl FieldSchema for $name {
            const KEYS: &'static [&'static str] = &[$(stringify!($field)),+];
        }
    };
}

field_schema!(EmailFields {
    from: String,
    to: String,
    cc: Vec<String>,
    subject: String,
    sent_at: String,
    body: String,
});

field_schema!(MemoFields {
    from: String,
    to: String,
    date: String,
    subject: String,
    body: String,
});

field_schema!(ReportFields {
    title: String,
    author: String,
    date: String,
    summary: String,
    findings: Vec<String>,
});

field_schema!(StatementFields {
    witness: String,
    taken_by: String,
    date: String,
    statement: String,
});

field_schema!(TicketFields {
    ticket_id: String,
    reporter: String,
    assignee: String,
    opened_at: String,
    status: String,
    title: String,
    description: String,
});

field_schema!(PersonnelFields {
    employee: String,
    title: String,
    department: String,
    manager: String,
    start_date: String,
    notes: String,
});

field_schema!(DiaryFields {
    author: String,
    date: String,
    entry: String,
});

field_schema!(
    /// One machine-generated event.
    LogEntry {
        timestamp: String,
        actor: String,
        action: String,
        target: String,
        detail: String,
    }
);

field_schema!(LogTableFields {
    source: String,
    entries: Vec<LogEntry>,
});

field_schema!(RegistryRecord {
    record_id: String,
    subject: String,
    relation: String,
    linked_to: String,
    updated: String,
});

field_schema!(RegistryFields {
    registry: String,
    records: Vec<RegistryRecord>,
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFields {
    Email(EmailFields),
    Memo(MemoFields),
    Report(ReportFields),
    Statement(StatementFields),
    Ticket(TicketFields),
    PersonnelFile(PersonnelFields),
    Diary(DiaryFields),
    LogTable(LogTableFields),
    Registry(RegistryFields),
}

fn decode<T: FieldSchema>(map: Map<String, Value>) -> Result<T, ViolationKind> {
    if let Some(key) = map.keys().find(|k| !T::KEYS.contains(&k.as_str())) {
        return Err(ViolationKind::UnknownKey {
            key: key.clone(),
            level: FieldLevel::Fields,
        });
    }
    serde_json::from_value(Value::Object(map)).map_err(|e| ViolationKind::Malformed(e.to_string()))
}

fn encode<T: Serialize>(fields: &T) -> Map<String, Value> {
    match serde_json::to_value(fields) {
        Ok(Value::Object(map)) => map,
        // Every schema is a plain struct of strings and lists.
        _ => Map::new(),
    }
}

impl DocumentFields {
    fn decode(schema: Schema, map: Map<String, Value>) -> Result<Self, ViolationKind> {
        Ok(match schema {
            Schema::Email => Self::Email(decode(map)?),
            Schema::Memo => Self::Memo(decode(map)?),
            Schema::Report => Self::Report(decode(map)?),
            Schema::Statement => Self::Statement(decode(map)?),
            Schema::Ticket => Self::Ticket(decode(map)?),
            Schema::PersonnelFile => Self::PersonnelFile(decode(map)?),
            Schema::Diary => Self::Diary(decode(map)?),
            Schema::LogTable => Self::LogTable(decode(map)?),
            Schema::Registry => Self::Registry(decode(map)?),
        })
    }

    pub fn schema(&self) -> Schema {
        match self {
            Self::Email(_) => Schema::Email,
            Self::Memo(_) => Schema::Memo,
            Self::Report(_) => Schema::Report,
            Self::Statement(_) => Schema::Statement,
            Self::Ticket(_) => Schema::Ticket,
            Self::PersonnelFile(_) => Schema::PersonnelFile,
            Self::Diary(_) => Schema::Diary,
            Self::LogTable(_) => Schema::LogTable,
            Self::Registry(_) => Schema::Registry,
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            Self::Email(f) => encode(f),
            Self::Memo(f) => encode(f),
            Self::Report(f) => encode(f),
            Self::Statement(f) => encode(f),
            Self::Ticket(f) => encode(f),
            Self::PersonnelFile(f) => encode(f),
            Self::Diary(f) => encode(f),
            Self::LogTable(f) => encode(f),
            Self::Registry(f) => encode(f),
        }
    }
}

// ============================================================================
// Drafts and the emission boundary
// ============================================================================

/// Open-shaped document as produced by a template or read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub document_id: String,
    pub document_type: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clue_refs: Vec<u32>,
    /// Any other top-level keys; always rejected.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentDraft {
    pub fn new(document_id: &DocumentId, document_type: DocumentType, fields: Map<String, Value>) -> Self {
        Self {
            document_id: document_id.as_str().to_string(),
            document_type: document_type.as_str().to_string(),
            fields,
            clue_refs: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_clue_refs(mut self, refs: Vec<u32>) -> Self {
        self.clue_refs = refs;
        self
    }

    /// Check and freeze. Narrative documents are scanned for technical keys
    /// at both levels before anything else, then the fields are decoded into
    /// the type's schema.
    pub fn emit(self) -> Result<Document, SchemaViolation> {
        let document_type: DocumentType = self.document_type.parse().map_err(|_| SchemaViolation {
            document_id: self.document_id.clone(),
            document_type: self.document_type.clone(),
            kind: ViolationKind::UnknownType(self.document_type.clone()),
        })?;
        let violation = |kind| SchemaViolation::new(self.document_id.clone(), document_type, kind);

        if document_type.is_narrative() {
            let levels = [(FieldLevel::TopLevel, &self.extra), (FieldLevel::Fields, &self.fields)];
            for (level, map) in levels {
                if let Some(key) = map.keys().find(|k| is_technical_key(k)) {
                    return Err(violation(ViolationKind::TechnicalKey {
                        key: key.clone(),
                        level,
                    }));
                }
            }
        }
        if let Some(key) = self.extra.keys().next() {
            return Err(violation(ViolationKind::UnknownKey {
                key: key.clone(),
                level: FieldLevel::TopLevel,
            }));
        }

        let fields = DocumentFields::decode(document_type.schema(), self.fields.clone()).map_err(violation)?;
        let mut clue_refs = self.clue_refs;
        clue_refs.sort_unstable();
        clue_refs.dedup();
        Ok(Document {
            id: DocumentId(self.document_id),
            document_type,
            fields,
            clue_refs,
        })
    }
}

// ============================================================================
// Document
// ============================================================================

/// An emitted, immutable document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DocumentDraft", into = "DocumentDraft")]
pub struct Document {
    id: DocumentId,
    document_type: DocumentType,
    fields: DocumentFields,
    /// Proof-tree steps this document supports; empty for noise.
    clue_refs: Vec<u32>,
}

impl TryFrom<DocumentDraft> for Document {
    type Error = SchemaViolation;

    fn try_from(draft: DocumentDraft) -> Result<Self, Self::Error> {
        draft.emit()
    }
}

impl From<Document> for DocumentDraft {
    fn from(doc: Document) -> Self {
        DocumentDraft {
            document_id: doc.id.0,
            document_type: doc.document_type.as_str().to_string(),
            fields: doc.fields.to_map(),
            clue_refs: doc.clue_refs,
            extra: Map::new(),
        }
    }
}

impl Document {
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn fields(&self) -> &DocumentFields {
        &self.fields
    }

    pub fn clue_refs(&self) -> &[u32] {
        &self.clue_refs
    }

    pub fn is_noise(&self) -> bool {
        self.clue_refs.is_empty()
    }

    /// Spoiler-free view: no clue references.
    pub fn public_view(&self) -> Value {
        serde_json::json!({
            "document_id": self.id,
            "document_type": self.document_type,
            "fields": self.fields.to_map(),
        })
    }

    /// Field content as one JSON string, used for prompts and for the
    /// derivability check.
    pub fn render_text(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.fields.to_map())).unwrap_or_default()
    }

    pub fn mentions(&self, needle: &str) -> bool {
        !needle.trim().is_empty() && self.render_text().contains(needle.trim())
    }
}
