//! Content-addressed entity store.
//!
//! Entities are opaque payloads with a content type, a flat attribute map and
//! a time-to-live in blocks. Keys are `0x` + SHA-256 of the entity content, so
//! creating the same entity twice yields the same key.

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, terminated, tuple};
use nom::IResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sleuthgraph_core::commitment::sha256_hex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub type EntityKey = String;
pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid filter `{filter}`: {reason}")]
    Filter { filter: String, reason: String },

    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt entity record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store rejected entity: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub key: EntityKey,
    pub content_type: String,
    pub attributes: Attributes,
    pub ttl_blocks: u64,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl StoredEntity {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

pub trait EntityStore: Send + Sync {
    fn create_entity(
        &self,
        payload: &[u8],
        content_type: &str,
        attributes: &Attributes,
        ttl_blocks: u64,
    ) -> Result<EntityKey, StoreError>;

    fn get_entity(&self, key: &str) -> Result<Option<StoredEntity>, StoreError>;

    fn query_entities(&self, filter: &str, limit: usize) -> Result<Vec<StoredEntity>, StoreError>;
}

/// Key of an entity: hash over content type, attributes and payload.
pub fn entity_key(payload: &[u8], content_type: &str, attributes: &Attributes) -> EntityKey {
    let attrs = serde_json::to_string(attributes).unwrap_or_default();
    let mut bytes = Vec::with_capacity(content_type.len() + attrs.len() + payload.len() + 2);
    bytes.extend_from_slice(content_type.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(attrs.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(payload);
    sha256_hex(&bytes)
}

// =============================================================================
// Filter expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    key: String,
    op: Op,
    value: AttrValue,
}

/// Conjunction of `key = "value"`, `key != "value"` and `key = 123`
/// clauses joined by `&&` or `and`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, StoreError> {
        let (_, clauses) = all_consuming(ws(filter_expr))(expr).map_err(|e| StoreError::Filter {
            filter: expr.to_string(),
            reason: describe(e),
        })?;
        Ok(Self { clauses })
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.clauses.iter().all(|c| {
            let actual = attributes.get(&c.key);
            match c.op {
                Op::Eq => actual == Some(&c.value),
                Op::Ne => actual != Some(&c.value),
            }
        })
    }
}

fn describe(err: nom::Err<nom::error::Error<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) if e.input.trim().is_empty() => {
            "unexpected end of filter".to_string()
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => format!("unexpected input at `{}`", e.input),
        nom::Err::Incomplete(_) => "incomplete filter".to_string(),
    }
}

fn filter_expr(input: &str) -> IResult<&str, Vec<Clause>> {
    separated_list1(conjunction, ws(clause))(input)
}

fn conjunction(input: &str) -> IResult<&str, &str> {
    alt((tag("&&"), terminated(tag_no_case("and"), multispace1)))(input)
}

fn clause(input: &str) -> IResult<&str, Clause> {
    map(tuple((attribute_name, ws(operator), attr_value)), |(key, op, value)| Clause {
        key: key.to_string(),
        op,
        value,
    })(input)
}

fn attribute_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn operator(input: &str) -> IResult<&str, Op> {
    alt((map(tag("!="), |_| Op::Ne), map(pchar('='), |_| Op::Eq)))(input)
}

fn attr_value(input: &str) -> IResult<&str, AttrValue> {
    alt((
        map(string_lit, |s: &str| AttrValue::Str(s.to_string())),
        map_res(recognize(pair(opt(pchar('-')), digit1)), |s: &str| {
            s.parse::<i64>().map(AttrValue::Int)
        }),
    ))(input)
}

fn string_lit(input: &str) -> IResult<&str, &str> {
    delimited(pchar('"'), map(opt(is_not("\"")), |s: Option<&str>| s.unwrap_or("")), pchar('"'))(input)
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

// =============================================================================
// In-memory store
// =============================================================================

/// Insertion-ordered store held in memory.
#[derive(Default)]
pub struct MemoryEntityStore {
    entities: RwLock<Vec<StoredEntity>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl EntityStore for MemoryEntityStore {
    fn create_entity(
        &self,
        payload: &[u8],
        content_type: &str,
        attributes: &Attributes,
        ttl_blocks: u64,
    ) -> Result<EntityKey, StoreError> {
        let key = entity_key(payload, content_type, attributes);
        let mut entities = self.entities.write();
        if !entities.iter().any(|e| e.key == key) {
            entities.push(StoredEntity {
                key: key.clone(),
                content_type: content_type.to_string(),
                attributes: attributes.clone(),
                ttl_blocks,
                payload: payload.to_vec(),
            });
        }
        Ok(key)
    }

    fn get_entity(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self.entities.read().iter().find(|e| e.key == key).cloned())
    }

    fn query_entities(&self, filter: &str, limit: usize) -> Result<Vec<StoredEntity>, StoreError> {
        let filter = Filter::parse(filter)?;
        Ok(self
            .entities
            .read()
            .iter()
            .filter(|e| filter.matches(&e.attributes))
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Directory-backed store
// =============================================================================

/// One `<key>.json` header and one `<key>.bin` payload per entity.
pub struct DirEntityStore {
    root: PathBuf,
    lock: RwLock<()>,
}

impl DirEntityStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn header_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.bin"))
    }

    fn read(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        let header = self.header_path(key);
        if !header.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&header).map_err(|source| StoreError::Io {
            path: header.clone(),
            source,
        })?;
        let mut entity: StoredEntity =
            serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        let payload = self.payload_path(key);
        entity.payload = fs::read(&payload).map_err(|source| StoreError::Io {
            path: payload,
            source,
        })?;
        if entity.key != key {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("header names {}", entity.key),
            });
        }
        Ok(Some(entity))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let io = |source| StoreError::Io {
            path: self.root.clone(),
            source,
        };
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl EntityStore for DirEntityStore {
    fn create_entity(
        &self,
        payload: &[u8],
        content_type: &str,
        attributes: &Attributes,
        ttl_blocks: u64,
    ) -> Result<EntityKey, StoreError> {
        let key = entity_key(payload, content_type, attributes);
        let _guard = self.lock.write();
        let header = self.header_path(&key);
        if header.is_file() {
            debug!(%key, "entity already stored");
            return Ok(key);
        }

        let payload_path = self.payload_path(&key);
        fs::write(&payload_path, payload).map_err(|source| StoreError::Io {
            path: payload_path,
            source,
        })?;
        let record = StoredEntity {
            key: key.clone(),
            content_type: content_type.to_string(),
            attributes: attributes.clone(),
            ttl_blocks,
            payload: Vec::new(),
        };
        let text = serde_json::to_string_pretty(&record)
            .map_err(|e| StoreError::Rejected(format!("unserializable attributes: {e}")))?;
        // Header last: its presence marks a complete entity.
        fs::write(&header, text).map_err(|source| StoreError::Io {
            path: header,
            source,
        })?;
        Ok(key)
    }

    fn get_entity(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        let _guard = self.lock.read();
        self.read(key)
    }

    fn query_entities(&self, filter: &str, limit: usize) -> Result<Vec<StoredEntity>, StoreError> {
        let filter = Filter::parse(filter)?;
        let _guard = self.lock.read();
        let mut out = Vec::new();
        for key in self.keys()? {
            if out.len() >= limit {
                break;
            }
            if let Some(entity) = self.read(&key)? {
                if filter.matches(&entity.attributes) {
                    out.push(entity);
                }
            }
        }
        Ok(out)
    }
}
