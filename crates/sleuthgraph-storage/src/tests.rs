//! Storage round trips: layout, entity stores, publishing, registrar.

use super::*;
use sleuthgraph_core::{Commitment, GeneratorConfig, Mystery, MysteryForge};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

fn mystery(seed: u64) -> Mystery {
    MysteryForge::new(GeneratorConfig::default())
        .unwrap()
        .generate(seed, 1_700_000_000)
        .unwrap()
}

fn attrs(pairs: &[(&str, AttrValue)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn layout_round_trip() {
    let dir = tempdir().unwrap();
    let m = mystery(11);
    let written = MysteryDir::write(dir.path(), &m).unwrap();

    assert_eq!(written.path(), dir.path().join(m.id()));
    assert!(written.proof_tree_file().is_file());
    assert!(written.images_dir().is_dir());
    let docs = std::fs::read_dir(written.documents_dir()).unwrap().count();
    assert_eq!(docs, m.documents().len());

    let loaded = MysteryDir::under(dir.path(), m.id()).load().unwrap();
    assert_eq!(loaded, m);
}

#[test]
fn document_files_are_spoiler_free() {
    let dir = tempdir().unwrap();
    let m = mystery(12);
    let written = MysteryDir::write(dir.path(), &m).unwrap();
    let first = &m.documents()[0];
    let text =
        std::fs::read_to_string(written.documents_dir().join(format!("{}.json", first.id()))).unwrap();
    assert!(!text.contains("clue_refs"));
    assert!(text.contains(first.id().as_str()));
}

#[test]
fn load_rejects_directory_named_for_another_mystery() {
    let dir = tempdir().unwrap();
    let m = mystery(13);
    let written = MysteryDir::write(dir.path(), &m).unwrap();
    let moved = dir.path().join("not-the-id");
    std::fs::rename(written.path(), &moved).unwrap();
    assert!(matches!(
        MysteryDir::open(&moved).load(),
        Err(LayoutError::IdMismatch { .. })
    ));
}

#[test]
fn load_rejects_contaminated_narrative_document() {
    let dir = tempdir().unwrap();
    let m = mystery(14);
    let written = MysteryDir::write(dir.path(), &m).unwrap();
    let index = m
        .documents()
        .iter()
        .position(|d| d.document_type().is_narrative())
        .unwrap();

    let path = written.mystery_file();
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    value["documents"][index]["fields"]["ip_address"] = "10.0.0.7".into();
    std::fs::write(&path, value.to_string()).unwrap();

    assert!(matches!(written.load(), Err(LayoutError::Json { .. })));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        MysteryDir::under(dir.path(), "absent").load(),
        Err(LayoutError::Io { .. })
    ));
}

// ============================================================================
// Filters and stores
// ============================================================================

#[test]
fn filter_forms() {
    let a = attrs(&[
        ("mystery_id", "m-1".into()),
        ("type", "email".into()),
        ("difficulty", AttrValue::Int(4)),
    ]);
    assert!(Filter::parse(r#"mystery_id = "m-1" && type = "email""#).unwrap().matches(&a));
    assert!(Filter::parse(r#"mystery_id = "m-1" and type != "image""#).unwrap().matches(&a));
    assert!(Filter::parse("difficulty = 4").unwrap().matches(&a));
    assert!(!Filter::parse(r#"difficulty = "4""#).unwrap().matches(&a));
    assert!(Filter::parse(r#"missing != "x""#).unwrap().matches(&a));
    assert!(!Filter::parse(r#"type = "email" AND mystery_id = "m-2""#).unwrap().matches(&a));
}

#[test]
fn quoted_values_may_contain_operators() {
    let a = attrs(&[("note", "a and b != c && d".into())]);
    assert!(Filter::parse(r#"note = "a and b != c && d""#).unwrap().matches(&a));
}

#[test]
fn filter_grammar_edges() {
    let a = attrs(&[
        ("note", "".into()),
        ("offset", AttrValue::Int(-3)),
        ("android", "yes".into()),
    ]);
    assert!(Filter::parse(r#"note="""#).unwrap().matches(&a));
    assert!(Filter::parse("offset = -3").unwrap().matches(&a));
    assert!(Filter::parse(r#"offset=-3&&android="yes""#).unwrap().matches(&a));
    assert!(Filter::parse(r#"  offset = -3   and   android = "yes"  "#).unwrap().matches(&a));
}

#[test]
fn malformed_filters_are_rejected() {
    for bad in [
        "",
        "   ",
        "type",
        r#"= "x""#,
        "type = email",
        r#"ty pe = "x""#,
        r#"type = "x" &&"#,
        r#"type = "x" and"#,
        r#"type = "x" android = "yes""#,
        r#"type = "x"#,
        "offset = 3.5",
    ] {
        assert!(
            matches!(Filter::parse(bad), Err(StoreError::Filter { .. })),
            "accepted {bad:?}"
        );
    }
}

fn exercise_store(store: &dyn EntityStore) {
    let email = attrs(&[("mystery_id", "m-1".into()), ("type", "email".into())]);
    let image = attrs(&[("mystery_id", "m-1".into()), ("type", "image".into())]);

    let k1 = store.create_entity(b"{\"a\":1}", "application/json", &email, 50_400).unwrap();
    let k1_again = store.create_entity(b"{\"a\":1}", "application/json", &email, 50_400).unwrap();
    assert_eq!(k1, k1_again);
    let k2 = store.create_entity(&[0x89, b'P', b'N', b'G'], "image/png", &image, 50_400).unwrap();
    assert_ne!(k1, k2);
    assert!(k1.starts_with("0x"));

    let got = store.get_entity(&k2).unwrap().unwrap();
    assert_eq!(got.payload, vec![0x89, b'P', b'N', b'G']);
    assert_eq!(got.content_type, "image/png");
    assert_eq!(got.ttl_blocks, 50_400);
    assert!(store.get_entity("0xdeadbeef").unwrap().is_none());

    assert_eq!(store.query_entities(r#"mystery_id = "m-1""#, 10).unwrap().len(), 2);
    assert_eq!(store.query_entities(r#"mystery_id = "m-1""#, 1).unwrap().len(), 1);
    let docs = store
        .query_entities(r#"mystery_id = "m-1" && type != "image""#, 10)
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].key, k1);
    assert!(store.query_entities("type = ", 10).is_err());
}

#[test]
fn memory_store_contract() {
    let store = MemoryEntityStore::new();
    exercise_store(&store);
    assert_eq!(store.len(), 2);
}

#[test]
fn dir_store_contract_and_persistence() {
    let dir = tempdir().unwrap();
    let store = DirEntityStore::open(dir.path().join("entities")).unwrap();
    exercise_store(&store);

    let reopened = DirEntityStore::open(store.root()).unwrap();
    assert_eq!(reopened.query_entities(r#"type = "email""#, 10).unwrap().len(), 1);
}

// ============================================================================
// Publishing
// ============================================================================

/// Fails every create after the first `allow`.
struct FlakyStore {
    inner: MemoryEntityStore,
    allow: usize,
    seen: AtomicUsize,
}

impl EntityStore for FlakyStore {
    fn create_entity(
        &self,
        payload: &[u8],
        content_type: &str,
        attributes: &Attributes,
        ttl_blocks: u64,
    ) -> Result<EntityKey, StoreError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) >= self.allow {
            return Err(StoreError::Rejected("gas limit exceeded".into()));
        }
        self.inner.create_entity(payload, content_type, attributes, ttl_blocks)
    }

    fn get_entity(&self, key: &str) -> Result<Option<StoredEntity>, StoreError> {
        self.inner.get_entity(key)
    }

    fn query_entities(&self, filter: &str, limit: usize) -> Result<Vec<StoredEntity>, StoreError> {
        self.inner.query_entities(filter, limit)
    }
}

/// Accepts writes, never finds anything.
struct BlindStore(MemoryEntityStore);

impl EntityStore for BlindStore {
    fn create_entity(
        &self,
        payload: &[u8],
        content_type: &str,
        attributes: &Attributes,
        ttl_blocks: u64,
    ) -> Result<EntityKey, StoreError> {
        self.0.create_entity(payload, content_type, attributes, ttl_blocks)
    }

    fn get_entity(&self, _key: &str) -> Result<Option<StoredEntity>, StoreError> {
        Ok(None)
    }

    fn query_entities(&self, _filter: &str, _limit: usize) -> Result<Vec<StoredEntity>, StoreError> {
        Ok(Vec::new())
    }
}

#[test]
fn publish_pushes_and_verifies() {
    let dir = tempdir().unwrap();
    let m = mystery(21);
    let layout = MysteryDir::write(dir.path(), &m).unwrap();
    let store = MemoryEntityStore::new();

    let outcome = Publisher::new(&store).publish(&layout, &m).unwrap();
    assert!(outcome.is_verified());
    let report = outcome.report();
    assert_eq!(report.metadata_entities, 1);
    assert_eq!(report.document_entities, m.documents().len());
    assert_eq!(report.image_entities, 0);
    assert_eq!(store.len(), 1 + m.documents().len());

    let meta = store
        .query_entities(r#"resource_type = "conspiracy" && type = "mystery_metadata""#, 5)
        .unwrap();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].ttl_blocks, m.metadata().expires_in / 12);
    let payload = String::from_utf8(meta[0].payload.clone()).unwrap();
    assert!(payload.contains(m.question()));
    assert!(!payload.contains(m.answer()));

    for entity in store.query_entities(r#"type != "mystery_metadata""#, 100).unwrap() {
        let text = String::from_utf8(entity.payload).unwrap();
        assert!(!text.contains("clue_refs"));
    }
}

#[test]
fn failed_create_reports_partial_push() {
    let dir = tempdir().unwrap();
    let m = mystery(22);
    let layout = MysteryDir::write(dir.path(), &m).unwrap();
    let store = FlakyStore {
        inner: MemoryEntityStore::new(),
        allow: 3,
        seen: AtomicUsize::new(0),
    };

    match Publisher::new(&store).publish(&layout, &m) {
        Err(PublishError::PushFailed { pushed, total, .. }) => {
            assert_eq!(pushed, 3);
            assert_eq!(total, 1 + m.documents().len());
        }
        other => panic!("expected PushFailed, got {other:?}"),
    }
}

#[test]
fn unconfirmed_push_is_not_success() {
    let dir = tempdir().unwrap();
    let m = mystery(23);
    let layout = MysteryDir::write(dir.path(), &m).unwrap();
    let store = BlindStore(MemoryEntityStore::new());

    match Publisher::new(&store).publish(&layout, &m).unwrap() {
        PublishOutcome::Unverified { report, reason } => {
            assert_eq!(report.entity_keys.len(), 1 + m.documents().len());
            assert!(reason.contains("metadata"), "{reason}");
        }
        PublishOutcome::Verified(_) => panic!("blind store cannot verify"),
    }
}

// ============================================================================
// Illustrations
// ============================================================================

struct BrokenSynth;

impl ImageSynthesizer for BrokenSynth {
    fn generate_image(
        &self,
        _prompt: &str,
        _id: &str,
        _output_dir: &Path,
    ) -> Result<images::GeneratedImage, ImageError> {
        Err(ImageError::Backend("content policy".into()))
    }
}

#[test]
fn illustrations_are_written_and_published() {
    let dir = tempdir().unwrap();
    let m = mystery(31);
    assert!(!m.images().is_empty());
    let layout = MysteryDir::write(dir.path(), &m).unwrap();

    let report = illustrate(&PlaceholderCards::default(), &layout, &m);
    assert!(report.failed.is_empty());
    assert_eq!(report.generated.len(), m.images().len());
    for image in m.images() {
        assert!(layout.image_path(image).is_file());
    }

    let store = MemoryEntityStore::new();
    let outcome = Publisher::new(&store).publish(&layout, &m).unwrap();
    assert!(outcome.is_verified());
    assert_eq!(outcome.report().image_entities, m.images().len());
    let pngs = store.query_entities(r#"type = "image""#, 10).unwrap();
    assert!(pngs.iter().all(|e| e.content_type == "image/png" && e.payload.starts_with(b"\x89PNG")));
}

#[test]
fn failed_illustrations_do_not_abort() {
    let dir = tempdir().unwrap();
    let m = mystery(32);
    let layout = MysteryDir::write(dir.path(), &m).unwrap();
    let report = illustrate(&BrokenSynth, &layout, &m);
    assert!(report.generated.is_empty());
    assert_eq!(report.failed.len(), m.images().len());
    assert!(report.failed[0].error.contains("content policy"));
}

// ============================================================================
// Registrar
// ============================================================================

#[test]
fn journal_registers_once_per_mystery() {
    let dir = tempdir().unwrap();
    let registrar = JournalRegistrar::open(dir.path().join("ledger").join("commitments.jsonl"));
    let a = Commitment::for_mystery(&mystery(41));
    let b = Commitment::for_mystery(&mystery(42));

    let receipt = registrar.register(&a).unwrap();
    assert_eq!(receipt.mystery_key, a.mystery_key);
    assert!(receipt.reference.starts_with("0x"));
    registrar.register(&b).unwrap();
    assert!(matches!(
        registrar.register(&a),
        Err(RegistrarError::AlreadyRegistered(_))
    ));
    assert_eq!(registrar.entries().unwrap(), vec![a, b]);
}
