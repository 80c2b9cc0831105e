//! Generator configuration.
//!
//! A [`GeneratorConfig`] is built once (usually deserialized from TOML by the
//! CLI) and handed to the graph builder and synthesizer by reference.

use crate::catalog::{Category, DocumentCatalog};
use crate::error::{MysteryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_CHAIN_LEN: usize = 2;
pub const MAX_CHAIN_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphPolicy {
    /// Subgraphs chained end-to-start from the root cause to the culprit.
    pub spine_subgraphs: usize,
    /// Extra subgraphs hanging off existing entities (distractor evidence).
    pub branch_subgraphs: usize,
    pub min_chain_len: usize,
    pub max_chain_len: usize,
    /// Upper bound on distinct entities; beyond it every target is reused.
    pub entity_budget: usize,
    /// Chance (percent) of reusing an existing entity instead of minting one.
    pub reuse_percent: u8,
    /// Relative weight per category when a subgraph picks its category.
    pub category_weights: BTreeMap<Category, u32>,
}

impl Default for GraphPolicy {
    fn default() -> Self {
        Self {
            spine_subgraphs: 3,
            branch_subgraphs: 2,
            min_chain_len: MIN_CHAIN_LEN,
            max_chain_len: 3,
            entity_budget: 24,
            reuse_percent: 30,
            category_weights: default_category_weights(),
        }
    }
}

/// Identity-heavy weighting: network/auth/physical/mapping chains dominate.
fn default_category_weights() -> BTreeMap<Category, u32> {
    BTreeMap::from([
        (Category::Network, 3),
        (Category::Auth, 3),
        (Category::Physical, 3),
        (Category::System, 2),
        (Category::Transaction, 2),
        (Category::Mapping, 3),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisPolicy {
    /// Unrelated documents mixed into the bundle.
    pub noise_documents: usize,
    /// Documents that receive an illustration slot.
    pub illustrated_documents: usize,
    /// How many fresh type draws a violating document gets before failing.
    pub regenerate_limit: usize,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            noise_documents: 3,
            illustrated_documents: 2,
            regenerate_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProofPolicy {
    pub min_hops: usize,
    /// Depth bound for path enumeration.
    pub max_hops: usize,
}

impl Default for ProofPolicy {
    fn default() -> Self {
        Self {
            min_hops: 3,
            max_hops: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub graph: GraphPolicy,
    pub synthesis: SynthesisPolicy,
    pub proof: ProofPolicy,
    /// Fixed difficulty (1-10); derived from the proof tree when unset.
    pub difficulty: Option<u8>,
    /// Seconds until the published mystery expires.
    pub expires_in: u64,
    /// Generation attempts before giving up.
    pub max_attempts: usize,
    /// Category → multiset of document type tags. Standard table when unset.
    pub catalog: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            graph: GraphPolicy::default(),
            synthesis: SynthesisPolicy::default(),
            proof: ProofPolicy::default(),
            difficulty: None,
            expires_in: 7 * 24 * 60 * 60,
            max_attempts: 8,
            catalog: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        let g = &self.graph;
        if g.spine_subgraphs == 0 {
            return Err(MysteryError::Config("graph.spine_subgraphs must be > 0".into()));
        }
        if g.min_chain_len == 0 || g.min_chain_len > g.max_chain_len {
            return Err(MysteryError::Config(format!(
                "graph chain length bounds {}..={} are empty",
                g.min_chain_len, g.max_chain_len
            )));
        }
        if g.max_chain_len > MAX_CHAIN_LEN {
            return Err(MysteryError::Config(format!(
                "graph.max_chain_len must be <= {MAX_CHAIN_LEN}"
            )));
        }
        if g.entity_budget < 2 {
            return Err(MysteryError::Config("graph.entity_budget must be >= 2".into()));
        }
        if g.reuse_percent > 100 {
            return Err(MysteryError::Config("graph.reuse_percent must be <= 100".into()));
        }
        if g.category_weights.values().all(|w| *w == 0) {
            return Err(MysteryError::Config(
                "graph.category_weights must give some category a positive weight".into(),
            ));
        }
        if self.proof.min_hops == 0 || self.proof.min_hops > self.proof.max_hops {
            return Err(MysteryError::Config(format!(
                "proof hop bounds {}..={} are empty",
                self.proof.min_hops, self.proof.max_hops
            )));
        }
        if let Some(d) = self.difficulty {
            if !(1..=10).contains(&d) {
                return Err(MysteryError::Config(format!("difficulty {d} outside 1..=10")));
            }
        }
        if self.max_attempts == 0 {
            return Err(MysteryError::Config("max_attempts must be > 0".into()));
        }
        self.document_catalog()?;
        Ok(())
    }

    pub fn document_catalog(&self) -> Result<DocumentCatalog> {
        match &self.catalog {
            Some(table) => Ok(DocumentCatalog::from_tag_table(table)?),
            None => Ok(DocumentCatalog::standard()),
        }
    }

    pub fn category_weight(&self, category: Category) -> u32 {
        self.graph
            .category_weights
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        GeneratorConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_chain_bounds() {
        let mut config = GeneratorConfig::default();
        config.graph.min_chain_len = 4;
        config.graph.max_chain_len = 2;
        assert!(matches!(config.validate(), Err(MysteryError::Config(_))));
    }

    #[test]
    fn rejects_unknown_catalog_tags() {
        let mut config = GeneratorConfig::default();
        let mut table = BTreeMap::new();
        for c in Category::ALL {
            table.insert(c.as_str().to_string(), vec!["telegram".to_string()]);
        }
        config.catalog = Some(table);
        assert!(matches!(config.validate(), Err(MysteryError::Catalog(_))));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{ "graph": { "spine_subgraphs": 4 }, "difficulty": 6 }"#)
                .unwrap();
        assert_eq!(config.graph.spine_subgraphs, 4);
        assert_eq!(config.graph.max_chain_len, GraphPolicy::default().max_chain_len);
        assert_eq!(config.difficulty, Some(6));
    }
}
