//! Sleuthgraph core: seeded generation of investigation mysteries.
//!
//! Pipeline, leaf first:
//!
//! ```text
//! catalog ─► graph builder ─► evidence plan ─► proof tree ─► synthesizer ─► assembler
//! ```
//!
//! [`MysteryForge::generate`] runs the pipeline and retries with adjusted
//! graph parameters when the graph cannot carry a deep enough proof.

pub mod catalog;
pub mod commitment;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod mystery;
pub mod names;
pub mod plan;
pub mod proof_tree;
pub mod rng;
pub mod synth;

pub use catalog::{Category, DocumentCatalog, DocumentType, Partition};
pub use commitment::Commitment;
pub use config::GeneratorConfig;
pub use document::{Document, DocumentDraft, DocumentFields, DocumentId};
pub use error::{GraphIncoherence, MysteryError, Result, SchemaViolation};
pub use mystery::{ImageRecord, Mystery, MysteryAssembler, MysteryMetadata, MysteryParts};
pub use proof_tree::{Hop, ProofTree};

use config::MAX_CHAIN_LEN;
use graph::{GraphBuilder, IdentityGraph};
use names::NameForge;
use plan::EvidencePlan;
use proof_tree::ProofTreeAssembler;
use rng::XorShift64;
use synth::DocumentSynthesizer;
use tracing::{debug, info, warn};

const INCIDENTS: &[&str] = &[
    "data exfiltration",
    "unauthorized wire transfer",
    "credential theft",
    "after-hours intrusion",
    "ledger tampering",
];

/// Generates mysteries from one immutable configuration.
pub struct MysteryForge {
    config: GeneratorConfig,
    catalog: DocumentCatalog,
}

impl MysteryForge {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let catalog = config.document_catalog()?;
        Ok(Self { config, catalog })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &DocumentCatalog {
        &self.catalog
    }

    /// Generate one mystery. A pure function of (config, seed, created_at).
    pub fn generate(&self, seed: u64, created_at: i64) -> Result<Mystery> {
        let mut config = self.config.clone();
        let mut last = None;
        for attempt in 0..self.config.max_attempts {
            let mut rng = XorShift64::derive(seed, attempt as u64);
            match self.attempt(&config, &mut rng, created_at) {
                Ok(mystery) => {
                    info!(
                        mystery_id = mystery.id(),
                        seed,
                        attempt,
                        documents = mystery.documents().len(),
                        hops = mystery.proof_tree().total_hops,
                        "mystery generated"
                    );
                    return Ok(mystery);
                }
                Err(MysteryError::Graph(incoherence)) => {
                    warn!(seed, attempt, error = %incoherence, "graph rejected, retrying");
                    adjust(&mut config, &incoherence);
                    last = Some(MysteryError::Graph(incoherence));
                }
                Err(err @ MysteryError::UnsupportedHop { .. }) => {
                    warn!(seed, attempt, error = %err, "hop not derivable, retrying");
                    last = Some(err);
                }
                Err(other) => return Err(other),
            }
        }
        Err(MysteryError::Exhausted {
            attempts: self.config.max_attempts,
            last: Box::new(last.unwrap_or_else(|| MysteryError::Config("no attempts made".into()))),
        })
    }

    fn attempt(&self, config: &GeneratorConfig, rng: &mut XorShift64, created_at: i64) -> Result<Mystery> {
        let mut names = NameForge::new();
        let graph = GraphBuilder::new(config, rng, &mut names).build()?;
        let plan = EvidencePlan::new(
            &graph,
            config.synthesis.noise_documents,
            config.synthesis.illustrated_documents,
            rng,
        );
        let proof = ProofTreeAssembler::new(&graph, &plan, &config.proof).assemble()?;
        debug!(hops = proof.total_hops, "proof tree assembled");

        let documents =
            DocumentSynthesizer::new(&self.catalog, &config.synthesis, &graph, rng, &mut names)
                .synthesize(&plan, &proof)?;
        let images = plan_images(&plan, &documents);

        let answer = graph.name_of(graph.answer()).to_string();
        let difficulty = config
            .difficulty
            .unwrap_or_else(|| mystery::derive_difficulty(proof.total_hops, proof.distinct_categories()));
        let metadata = MysteryMetadata {
            mystery_id: mystery_id(rng),
            question: question(&graph, rng),
            answer: answer.clone(),
            difficulty,
            total_documents: documents.len(),
            total_images: images.len(),
            created_at,
            expires_in: config.expires_in,
        };
        MysteryAssembler::assemble(MysteryParts {
            metadata,
            documents,
            proof_tree: proof,
            answer,
            images,
        })
    }
}

/// Loosen the graph policy in the direction the failure points.
fn adjust(config: &mut GeneratorConfig, incoherence: &GraphIncoherence) {
    let graph = &mut config.graph;
    match incoherence {
        GraphIncoherence::TooShallow { .. } => {
            if graph.max_chain_len < MAX_CHAIN_LEN {
                graph.max_chain_len += 1;
            } else {
                graph.spine_subgraphs += 1;
            }
        }
        GraphIncoherence::Disconnected { .. } => graph.entity_budget += 4,
        GraphIncoherence::NoPath { .. } | GraphIncoherence::UnknownEntity(_) => {
            config.proof.max_hops += 2;
        }
    }
}

fn mystery_id(rng: &mut XorShift64) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

fn question(graph: &IdentityGraph, rng: &mut XorShift64) -> String {
    let incident = names::pick(INCIDENTS, rng);
    format!(
        "Who is behind the {incident} on {}?",
        graph.name_of(graph.root_cause())
    )
}

fn plan_images(plan: &EvidencePlan, documents: &[Document]) -> Vec<ImageRecord> {
    plan.slots()
        .iter()
        .filter_map(|slot| {
            let image_id = slot.image_id.clone()?;
            let doc = documents.iter().find(|d| d.id() == &slot.document_id)?;
            Some(ImageRecord {
                file_name: format!("{image_id}.png"),
                prompt: synth::illustration_prompt(doc),
                image_id,
                document_id: slot.document_id.clone(),
            })
        })
        .collect()
}
