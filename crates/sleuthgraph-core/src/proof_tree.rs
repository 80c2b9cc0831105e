//! Proof tree: the ordered hop sequence from the root cause to the answer.
//!
//! Despite the name this is a path. Each hop follows one directed edge; its
//! sub-question names only the edge's source (already known after the
//! previous hop) and its expected inference is the edge's target.

use crate::catalog::Category;
use crate::config::ProofPolicy;
use crate::document::DocumentId;
use crate::error::GraphIncoherence;
use crate::graph::{EdgeId, EntityId, IdentityGraph};
use crate::plan::EvidencePlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Hard cap on DFS node expansions while enumerating candidate paths.
const SEARCH_LIMIT: usize = 200_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub step_number: u32,
    pub sub_question: String,
    pub expected_inference: String,
    pub supporting_document_ids: Vec<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTree {
    pub hops: Vec<Hop>,
    pub total_hops: usize,
}

impl ProofTree {
    pub fn new(hops: Vec<Hop>) -> Self {
        let total_hops = hops.len();
        Self { hops, total_hops }
    }

    pub fn final_inference(&self) -> Option<&str> {
        self.hops.last().map(|h| h.expected_inference.as_str())
    }

    pub fn distinct_categories(&self) -> usize {
        self.hops
            .iter()
            .filter_map(|h| h.category)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Path preference: most distinct categories, then fewest hops, then lowest
/// edge ids.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    categories: usize,
    edges: Vec<EdgeId>,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        (std::cmp::Reverse(self.categories), self.edges.len(), &self.edges)
            < (std::cmp::Reverse(other.categories), other.edges.len(), &other.edges)
    }
}

struct PathSearch<'g> {
    graph: &'g IdentityGraph,
    answer: EntityId,
    max_hops: usize,
    expansions: usize,
    visited: Vec<EntityId>,
    path: Vec<EdgeId>,
    best: Option<Candidate>,
}

impl<'g> PathSearch<'g> {
    fn run(&mut self, at: EntityId) {
        if self.expansions >= SEARCH_LIMIT {
            return;
        }
        self.expansions += 1;
        if at == self.answer {
            let categories = self
                .path
                .iter()
                .filter_map(|id| self.graph.edge(*id))
                .map(|e| e.category())
                .collect::<BTreeSet<_>>()
                .len();
            let candidate = Candidate {
                categories,
                edges: self.path.clone(),
            };
            if self.best.as_ref().map_or(true, |b| candidate.beats(b)) {
                self.best = Some(candidate);
            }
            return;
        }
        if self.path.len() >= self.max_hops {
            return;
        }
        let graph = self.graph;
        for edge in graph.outgoing(at) {
            if self.visited.contains(&edge.target) {
                continue;
            }
            self.visited.push(edge.target);
            self.path.push(edge.id);
            self.run(edge.target);
            self.path.pop();
            self.visited.pop();
        }
    }
}

/// Select the proof path between `root` and `answer` along directed edges.
pub fn select_path(
    graph: &IdentityGraph,
    root: EntityId,
    answer: EntityId,
    max_hops: usize,
) -> Result<Vec<EdgeId>, GraphIncoherence> {
    for id in [root, answer] {
        if graph.entity(id).is_none() {
            return Err(GraphIncoherence::UnknownEntity(id));
        }
    }
    let mut search = PathSearch {
        graph,
        answer,
        max_hops,
        expansions: 0,
        visited: vec![root],
        path: Vec::new(),
        best: None,
    };
    search.run(root);
    debug!(expansions = search.expansions, "proof path search finished");
    match search.best {
        Some(best) if !best.edges.is_empty() => Ok(best.edges),
        _ => Err(GraphIncoherence::NoPath { root, answer }),
    }
}

pub struct ProofTreeAssembler<'a> {
    graph: &'a IdentityGraph,
    plan: &'a EvidencePlan,
    policy: &'a ProofPolicy,
}

impl<'a> ProofTreeAssembler<'a> {
    pub fn new(graph: &'a IdentityGraph, plan: &'a EvidencePlan, policy: &'a ProofPolicy) -> Self {
        Self { graph, plan, policy }
    }

    /// Build the hop sequence from the graph's root cause to its answer.
    pub fn assemble(&self) -> Result<ProofTree, GraphIncoherence> {
        let path = select_path(
            self.graph,
            self.graph.root_cause(),
            self.graph.answer(),
            self.policy.max_hops,
        )?;
        if path.len() < self.policy.min_hops {
            return Err(GraphIncoherence::TooShallow {
                hops: path.len(),
                min: self.policy.min_hops,
            });
        }

        let mut hops = Vec::with_capacity(path.len());
        let edges = path.iter().filter_map(|id| self.graph.edge(*id));
        for (idx, edge) in edges.enumerate() {
            let source = self.graph.name_of(edge.source);
            let target = self.graph.name_of(edge.target);
            let sub_question = edge
                .kind
                .question
                .replace("{src}", source)
                .replace("{time}", &edge.time_label());
            let supporting_document_ids = self
                .plan
                .document_for_edge(edge.id)
                .cloned()
                .into_iter()
                .collect();
            hops.push(Hop {
                step_number: idx as u32 + 1,
                sub_question,
                expected_inference: target.to_string(),
                supporting_document_ids,
                category: Some(edge.category()),
            });
        }
        Ok(ProofTree::new(hops))
    }
}
