//! Evidence plan: which document slot carries which edge.
//!
//! Every edge of the graph gets exactly one slot, noise slots are added on
//! top, and the whole list is shuffled before ids are handed out so that
//! document order says nothing about the chain.

use crate::document::DocumentId;
use crate::graph::{EdgeId, IdentityGraph};
use crate::rng::XorShift64;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Carries the clue for one edge.
    Edge(EdgeId),
    /// Unrelated content.
    Noise(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceSlot {
    pub document_id: DocumentId,
    pub role: SlotRole,
    /// `IMG-01`, ... when the document gets an illustration.
    pub image_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EvidencePlan {
    slots: Vec<EvidenceSlot>,
    by_edge: HashMap<EdgeId, usize>,
}

impl EvidencePlan {
    pub fn new(
        graph: &IdentityGraph,
        noise_documents: usize,
        illustrated_documents: usize,
        rng: &mut XorShift64,
    ) -> Self {
        let mut roles: Vec<SlotRole> = graph.edges().iter().map(|e| SlotRole::Edge(e.id)).collect();
        roles.extend((0..noise_documents).map(SlotRole::Noise));
        rng.shuffle(&mut roles);

        let mut illustrated: Vec<usize> = (0..roles.len()).collect();
        rng.shuffle(&mut illustrated);
        illustrated.truncate(illustrated_documents);
        illustrated.sort_unstable();

        let mut slots = Vec::with_capacity(roles.len());
        let mut by_edge = HashMap::new();
        let mut next_image = 1;
        for (idx, role) in roles.into_iter().enumerate() {
            let image_id = if illustrated.binary_search(&idx).is_ok() {
                let id = format!("IMG-{next_image:02}");
                next_image += 1;
                Some(id)
            } else {
                None
            };
            if let SlotRole::Edge(edge) = role {
                by_edge.insert(edge, idx);
            }
            slots.push(EvidenceSlot {
                document_id: DocumentId::from_index(idx + 1),
                role,
                image_id,
            });
        }
        Self { slots, by_edge }
    }

    pub fn slots(&self) -> &[EvidenceSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn document_for_edge(&self, edge: EdgeId) -> Option<&DocumentId> {
        self.by_edge.get(&edge).map(|idx| &self.slots[*idx].document_id)
    }

    pub fn image_count(&self) -> usize {
        self.slots.iter().filter(|s| s.image_id.is_some()).count()
    }
}
