//! Publishing a persisted mystery to an [`EntityStore`].
//!
//! One metadata entity, one entity per document and one per image file that
//! exists on disk. Payloads are spoiler-free: no answer, no proof tree, no
//! clue references. After the push the store is re-queried; a push that
//! cannot be confirmed is reported as [`PublishOutcome::Unverified`].

use crate::entity::{AttrValue, Attributes, EntityKey, EntityStore, StoreError};
use crate::layout::{LayoutError, MysteryDir};
use serde_json::json;
use sleuthgraph_core::{Document, ImageRecord, Mystery};
use std::fs;
use tracing::{info, warn};

/// Seconds per block when converting expiry to a time-to-live.
pub const BLOCK_SECONDS: u64 = 12;
pub const RESOURCE_TYPE: &str = "conspiracy";
pub const METADATA_TYPE: &str = "mystery_metadata";
pub const IMAGE_TYPE: &str = "image";
const QUERY_LIMIT: usize = 1000;

pub fn ttl_blocks(expires_in: u64) -> u64 {
    expires_in / BLOCK_SECONDS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    Metadata,
    Document,
    Image,
}

/// An entity ready to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub role: EntityRole,
    pub payload: Vec<u8>,
    pub content_type: &'static str,
    pub attributes: Attributes,
    pub ttl_blocks: u64,
}

pub struct EntityBuilder;

impl EntityBuilder {
    fn base_attributes(mystery: &Mystery, kind: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("mystery_id".into(), mystery.id().into());
        attrs.insert("resource_type".into(), RESOURCE_TYPE.into());
        attrs.insert("type".into(), kind.into());
        attrs
    }

    pub fn metadata(mystery: &Mystery) -> EntitySpec {
        let meta = mystery.metadata();
        let payload = json!({
            "mystery_id": meta.mystery_id,
            "question": meta.question,
            "difficulty": meta.difficulty,
            "total_documents": meta.total_documents,
            "total_images": meta.total_images,
            "created_at": meta.created_at,
            "expires_in": meta.expires_in,
        });
        let mut attributes = Self::base_attributes(mystery, METADATA_TYPE);
        attributes.insert("difficulty".into(), AttrValue::Int(i64::from(meta.difficulty)));
        attributes.insert("created_at".into(), AttrValue::Int(meta.created_at));
        EntitySpec {
            role: EntityRole::Metadata,
            payload: payload.to_string().into_bytes(),
            content_type: "application/json",
            attributes,
            ttl_blocks: ttl_blocks(meta.expires_in),
        }
    }

    pub fn document(mystery: &Mystery, doc: &Document) -> EntitySpec {
        let mut attributes = Self::base_attributes(mystery, doc.document_type().as_str());
        attributes.insert("document_id".into(), doc.id().as_str().into());
        EntitySpec {
            role: EntityRole::Document,
            payload: doc.public_view().to_string().into_bytes(),
            content_type: "application/json",
            attributes,
            ttl_blocks: ttl_blocks(mystery.metadata().expires_in),
        }
    }

    pub fn image(mystery: &Mystery, image: &ImageRecord, bytes: Vec<u8>) -> EntitySpec {
        let mut attributes = Self::base_attributes(mystery, IMAGE_TYPE);
        attributes.insert("image_id".into(), image.image_id.as_str().into());
        attributes.insert("document_id".into(), image.document_id.as_str().into());
        EntitySpec {
            role: EntityRole::Image,
            payload: bytes,
            content_type: "image/png",
            attributes,
            ttl_blocks: ttl_blocks(mystery.metadata().expires_in),
        }
    }

    /// Every entity for `mystery`, reading image files from `dir`.
    pub fn batch(dir: &MysteryDir, mystery: &Mystery) -> Result<Vec<EntitySpec>, LayoutError> {
        let mut specs = vec![Self::metadata(mystery)];
        specs.extend(mystery.documents().iter().map(|d| Self::document(mystery, d)));
        for image in dir.present_images(mystery) {
            let path = dir.image_path(image);
            let bytes = fs::read(&path).map_err(|source| LayoutError::Io { path, source })?;
            specs.push(Self::image(mystery, image, bytes));
        }
        Ok(specs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub mystery_id: String,
    pub entity_keys: Vec<EntityKey>,
    pub metadata_entities: usize,
    pub document_entities: usize,
    pub image_entities: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Verified(PublishReport),
    /// Every create succeeded but the re-query did not confirm them.
    Unverified { report: PublishReport, reason: String },
}

impl PublishOutcome {
    pub fn report(&self) -> &PublishReport {
        match self {
            PublishOutcome::Verified(report) | PublishOutcome::Unverified { report, .. } => report,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, PublishOutcome::Verified(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("push failed after {pushed} of {total} entities: {source}")]
    PushFailed {
        pushed: usize,
        total: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

pub struct Publisher<'s> {
    store: &'s dyn EntityStore,
}

impl<'s> Publisher<'s> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        Self { store }
    }

    pub fn publish(&self, dir: &MysteryDir, mystery: &Mystery) -> Result<PublishOutcome, PublishError> {
        let specs = EntityBuilder::batch(dir, mystery)?;
        let total = specs.len();
        info!(mystery_id = mystery.id(), entities = total, "publishing mystery");

        let mut report = PublishReport {
            mystery_id: mystery.id().to_string(),
            entity_keys: Vec::with_capacity(total),
            metadata_entities: 0,
            document_entities: 0,
            image_entities: 0,
        };
        for spec in &specs {
            let key = self
                .store
                .create_entity(&spec.payload, spec.content_type, &spec.attributes, spec.ttl_blocks)
                .map_err(|source| PublishError::PushFailed {
                    pushed: report.entity_keys.len(),
                    total,
                    source,
                })?;
            report.entity_keys.push(key);
            match spec.role {
                EntityRole::Metadata => report.metadata_entities += 1,
                EntityRole::Document => report.document_entities += 1,
                EntityRole::Image => report.image_entities += 1,
            }
        }

        match self.verify(&report) {
            Ok(()) => {
                info!(mystery_id = mystery.id(), "publish verified");
                Ok(PublishOutcome::Verified(report))
            }
            Err(reason) => {
                warn!(mystery_id = mystery.id(), %reason, "publish not verified");
                Ok(PublishOutcome::Unverified { report, reason })
            }
        }
    }

    fn count(&self, filter: &str) -> Result<usize, String> {
        self.store
            .query_entities(filter, QUERY_LIMIT)
            .map(|found| found.len())
            .map_err(|e| format!("re-query failed: {e}"))
    }

    /// Best-effort re-query of what was just pushed.
    pub fn verify(&self, report: &PublishReport) -> Result<(), String> {
        let scope = format!(
            "resource_type = \"{RESOURCE_TYPE}\" && mystery_id = \"{}\"",
            report.mystery_id
        );
        let checks = [
            ("metadata", format!("{scope} && type = \"{METADATA_TYPE}\""), report.metadata_entities),
            (
                "document",
                format!("{scope} && type != \"{METADATA_TYPE}\" && type != \"{IMAGE_TYPE}\""),
                report.document_entities,
            ),
            ("image", format!("{scope} && type = \"{IMAGE_TYPE}\""), report.image_entities),
        ];
        for (label, filter, expected) in checks {
            let found = self.count(&filter)?;
            if found < expected {
                return Err(format!("{label} entities: expected {expected}, found {found}"));
            }
        }
        Ok(())
    }
}
