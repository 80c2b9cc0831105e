//! Identity/entity graph and its seeded builder.
//!
//! ```text
//!   root cause ──spine 0──► e ──spine 1──► e ──spine 2──► culprit (person)
//!                 │                  │
//!              branch 0           branch 1      (distractor chains)
//! ```
//!
//! Every subgraph is a chain: edge `i` ends where edge `i + 1` starts. Spine
//! subgraphs start at the previous spine's terminal entity, branch subgraphs
//! start at an entity that already exists, so every entity is reachable from
//! the root cause along directed edges.

use crate::catalog::Category;
use crate::config::{GeneratorConfig, GraphPolicy};
use crate::error::GraphIncoherence;
use crate::names::NameForge;
use crate::rng::XorShift64;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::debug;

// ============================================================================
// Identifiers and kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent-{:03}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge-{:03}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    System,
    Location,
    Account,
    Org,
}

// ============================================================================
// Edge kinds
// ============================================================================

/// A typed relationship within one category.
///
/// Templates use `{src}`, `{dst}` and `{time}` placeholders. A question only
/// ever names the source, so it is answerable from what is already known.
#[derive(Debug, PartialEq, Eq)]
pub struct EdgeKind {
    pub name: &'static str,
    pub category: Category,
    pub sources: &'static [EntityKind],
    pub target: EntityKind,
    pub question: &'static str,
    pub clue: &'static str,
    /// Verb used in machine-generated records.
    pub action: &'static str,
}

impl EdgeKind {
    pub fn admits(&self, kind: EntityKind) -> bool {
        self.sources.contains(&kind)
    }
}

macro_rules! edge_kind {
    ($name:literal, $cat:ident, [$($src:ident),+] => $dst:ident, $q:literal, $clue:literal, $action:literal) => {
        EdgeKind {
            name: $name,
            category: Category::$cat,
            sources: &[$(EntityKind::$src),+],
            target: EntityKind::$dst,
            question: $q,
            clue: $clue,
            action: $action,
        }
    };
}

pub static EDGE_KINDS: &[EdgeKind] = &[
    // network
    edge_kind!("connected-from", Network, [System] => System,
        "Which host opened a connection to {src} at {time}?",
        "{dst} opened a connection to {src} at {time}", "CONNECT"),
    edge_kind!("authenticated-from", Network, [System] => Account,
        "Which account authenticated against {src} at {time}?",
        "account {dst} authenticated against {src} at {time}", "AUTH_OK"),
    edge_kind!("tunneled-through", Network, [Account] => System,
        "Which gateway carried the session of {src} at {time}?",
        "the session of {src} was tunneled through {dst} at {time}", "VPN_SESSION"),
    edge_kind!("session-owned-by", Network, [Account] => Person,
        "Whose laptop held the session of {src} at {time}?",
        "the session of {src} at {time} came from the laptop issued to {dst}", "DEVICE_BIND"),
    // auth
    edge_kind!("logged-in-as", Auth, [System] => Account,
        "Which account logged in to {src} at {time}?",
        "{src} recorded a login as {dst} at {time}", "LOGIN"),
    edge_kind!("credential-held-by", Auth, [Account] => Person,
        "Who holds the credentials for {src}?",
        "the credentials for {src} were issued to {dst}", "CRED_ISSUE"),
    edge_kind!("reset-by", Auth, [Account] => Person,
        "Who reset the password of {src} at {time}?",
        "the password of {src} was reset by {dst} at {time}", "PWD_RESET"),
    edge_kind!("mfa-approved-on", Auth, [Person] => System,
        "On which machine did {src} approve a sign-in prompt at {time}?",
        "{src} approved a sign-in prompt on {dst} at {time}", "MFA_APPROVE"),
    // physical
    edge_kind!("badge-accessed", Physical, [Person] => Location,
        "Where did {src} badge in at {time}?",
        "{src} badged into {dst} at {time}", "BADGE_IN"),
    edge_kind!("badged-in-by", Physical, [Location] => Person,
        "Who badged into {src} at {time}?",
        "{dst} badged into {src} at {time}", "BADGE_IN"),
    edge_kind!("houses", Physical, [Location] => System,
        "Which machine is installed in {src}?",
        "{dst} is installed in {src}", "ASSET_LOC"),
    edge_kind!("located-at", Physical, [System] => Location,
        "Where is {src} physically located?",
        "{src} is physically located in {dst}", "ASSET_LOC"),
    // system
    edge_kind!("exported-by", System, [System] => Account,
        "Which account ran the export on {src} at {time}?",
        "the export on {src} at {time} ran under {dst}", "EXPORT"),
    edge_kind!("assigned-to", System, [System] => Person,
        "Who is {src} assigned to?",
        "{src} is assigned to {dst}", "ASSIGN"),
    edge_kind!("ran-on", System, [Account] => System,
        "Which machine did {src} run a job on at {time}?",
        "{src} ran a scheduled job on {dst} at {time}", "JOB_RUN"),
    edge_kind!("deployed-from", System, [System] => System,
        "From which host was the change on {src} deployed at {time}?",
        "the change on {src} was deployed from {dst} at {time}", "DEPLOY"),
    // transaction
    edge_kind!("transacted-with", Transaction, [Account] => Account,
        "Which account received the transfer from {src} at {time}?",
        "{src} transferred funds to {dst} at {time}", "TRANSFER"),
    edge_kind!("approved-by", Transaction, [Account] => Person,
        "Who approved the payment from {src} at {time}?",
        "the payment from {src} at {time} was approved by {dst}", "APPROVE"),
    edge_kind!("paid-to", Transaction, [Account] => Org,
        "Which company received the payment from {src} at {time}?",
        "{src} paid an invoice to {dst} at {time}", "INVOICE_PAY"),
    edge_kind!("controlled-by", Transaction, [Org] => Person,
        "Who is the registered signatory of {src}?",
        "{dst} is the registered signatory of {src}", "SIGNATORY"),
    edge_kind!("billed-through", Transaction, [Org] => Account,
        "Which account does {src} bill through?",
        "{src} bills through {dst}", "BILLING"),
    // mapping
    edge_kind!("mapped-to", Mapping, [Account] => Person,
        "Which employee is {src} mapped to in the directory?",
        "{src} is mapped to {dst} in the directory", "DIR_MAP"),
    edge_kind!("employed-by", Mapping, [Person] => Org,
        "Which organisation employs {src}?",
        "{src} is employed by {dst}", "EMPLOYER"),
    edge_kind!("registered-to", Mapping, [System] => Person,
        "Who is {src} registered to?",
        "{src} is registered to {dst}", "DEVICE_REG"),
    edge_kind!("directed-by", Mapping, [Org] => Person,
        "Who directs {src}?",
        "{src} is directed by {dst}", "DIRECTOR"),
    edge_kind!("holds-account", Mapping, [Person] => Account,
        "Which account belongs to {src}?",
        "{src} holds account {dst}", "DIR_MAP"),
];

pub fn edge_kind(name: &str) -> Option<&'static EdgeKind> {
    EDGE_KINDS.iter().find(|k| k.name == name)
}

fn kinds_from(category: Category, source: EntityKind) -> impl Iterator<Item = &'static EdgeKind> {
    EDGE_KINDS
        .iter()
        .filter(move |k| k.category == category && k.admits(source))
}

/// Can a chain of exactly `steps` edges in `category` start at `kind`?
fn can_extend(category: Category, kind: EntityKind, steps: usize) -> bool {
    steps == 0 || kinds_from(category, kind).any(|k| can_extend(category, k.target, steps - 1))
}

/// Can a chain of exactly `steps` edges in `category` end at a person?
fn can_reach_person(category: Category, kind: EntityKind, steps: usize) -> bool {
    if steps == 0 {
        return kind == EntityKind::Person;
    }
    kinds_from(category, kind).any(|k| can_reach_person(category, k.target, steps - 1))
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    /// Categories of the subgraphs that reference this entity.
    pub categories: BTreeSet<Category>,
    pub subgraphs: BTreeSet<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub kind: &'static EdgeKind,
    pub subgraph: usize,
    pub observed_at: NaiveDateTime,
}

impl Edge {
    pub fn category(&self) -> Category {
        self.kind.category
    }

    pub fn time_label(&self) -> String {
        self.observed_at.format("%H:%M").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphRole {
    Spine,
    Branch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    pub index: usize,
    pub category: Category,
    pub role: SubgraphRole,
    pub edges: Vec<EdgeId>,
}

/// A finalized identity graph. Owns its entities; nothing mutates it after
/// [`GraphBuilder::build`] returns.
#[derive(Debug, Clone)]
pub struct IdentityGraph {
    entities: Vec<Entity>,
    edges: Vec<Edge>,
    subgraphs: Vec<Subgraph>,
    root_cause: EntityId,
    answer: EntityId,
    incident_date: NaiveDate,
}

impl IdentityGraph {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn subgraphs(&self) -> &[Subgraph] {
        &self.subgraphs
    }

    pub fn root_cause(&self) -> EntityId {
        self.root_cause
    }

    pub fn answer(&self) -> EntityId {
        self.answer
    }

    pub fn incident_date(&self) -> NaiveDate {
        self.incident_date
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0 as usize)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0 as usize)
    }

    pub fn name_of(&self, id: EntityId) -> &str {
        self.entity(id).map(|e| e.name.as_str()).unwrap_or("unknown")
    }

    pub fn outgoing(&self, id: EntityId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn people(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.kind == EntityKind::Person)
    }

    /// Share of subgraphs that are identity chains.
    pub fn identity_chain_share(&self) -> f64 {
        if self.subgraphs.is_empty() {
            return 0.0;
        }
        let identity = self
            .subgraphs
            .iter()
            .filter(|s| s.category.is_identity())
            .count();
        identity as f64 / self.subgraphs.len() as f64
    }

    /// Check that every subgraph is one connected chain of edges of its own
    /// category and that each subgraph touches an entity of an earlier one.
    pub fn check_connectivity(&self) -> Result<(), GraphIncoherence> {
        let mut seen: HashSet<EntityId> = HashSet::from([self.root_cause]);
        for sub in &self.subgraphs {
            let edges: Vec<&Edge> = sub
                .edges
                .iter()
                .map(|id| {
                    self.edge(*id).ok_or_else(|| GraphIncoherence::Disconnected {
                        subgraph: sub.index,
                        reason: format!("dangling {id}"),
                    })
                })
                .collect::<Result<_, _>>()?;
            let Some(first) = edges.first() else {
                return Err(GraphIncoherence::Disconnected {
                    subgraph: sub.index,
                    reason: "empty chain".into(),
                });
            };
            if !seen.contains(&first.source) {
                return Err(GraphIncoherence::Disconnected {
                    subgraph: sub.index,
                    reason: format!("starts at unreachable {}", first.source),
                });
            }
            for pair in edges.windows(2) {
                if pair[0].target != pair[1].source {
                    return Err(GraphIncoherence::Disconnected {
                        subgraph: sub.index,
                        reason: format!("{} does not continue {}", pair[1].id, pair[0].id),
                    });
                }
            }
            for edge in &edges {
                if edge.category() != sub.category {
                    return Err(GraphIncoherence::Disconnected {
                        subgraph: sub.index,
                        reason: format!("{} is not a {} edge", edge.id, sub.category),
                    });
                }
                seen.insert(edge.source);
                seen.insert(edge.target);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Shortest chain a relaxed subgraph may shrink to; may be below
/// `min_chain_len`.
pub const RELAXED_CHAIN_FLOOR: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainGoal {
    Free,
    EndAtPerson,
}

/// Seeded graph builder. Entity ids are assigned in mint order, which is a
/// pure function of the seed.
pub struct GraphBuilder<'a> {
    policy: &'a GraphPolicy,
    config: &'a GeneratorConfig,
    rng: &'a mut XorShift64,
    names: &'a mut NameForge,
    entities: Vec<Entity>,
    edges: Vec<Edge>,
    subgraphs: Vec<Subgraph>,
    clock: NaiveDateTime,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a GeneratorConfig, rng: &'a mut XorShift64, names: &'a mut NameForge) -> Self {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
        let date = base
            .checked_add_days(Days::new(rng.gen_range_usize(300) as u64))
            .unwrap_or(base);
        let start_minute = (20 * 60 + rng.gen_range_usize(90)) as u32;
        let time = NaiveTime::from_hms_opt(start_minute / 60, start_minute % 60, 0).unwrap_or_default();
        Self {
            policy: &config.graph,
            config,
            rng,
            names,
            entities: Vec::new(),
            edges: Vec::new(),
            subgraphs: Vec::new(),
            clock: date.and_time(time),
        }
    }

    pub fn build(mut self) -> Result<IdentityGraph, GraphIncoherence> {
        let incident_date = self.clock.date();
        let root = self.mint(EntityKind::System);
        let mut cursor = root;
        let mut previous: Option<Category> = None;

        for s in 0..self.policy.spine_subgraphs {
            let goal = if s + 1 == self.policy.spine_subgraphs {
                ChainGoal::EndAtPerson
            } else {
                ChainGoal::Free
            };
            let index = self.subgraphs.len();
            let category = self.choose_category(index, cursor, previous, goal)?;
            let terminal = self.build_chain(index, cursor, category, SubgraphRole::Spine, goal)?;
            cursor = terminal;
            previous = Some(category);
        }
        let answer = cursor;

        for _ in 0..self.policy.branch_subgraphs {
            let index = self.subgraphs.len();
            let start = self.choose_branch_start(answer);
            let category = self.choose_category(index, start, None, ChainGoal::Free)?;
            self.build_chain(index, start, category, SubgraphRole::Branch, ChainGoal::Free)?;
        }

        let graph = IdentityGraph {
            entities: self.entities,
            edges: self.edges,
            subgraphs: self.subgraphs,
            root_cause: root,
            answer,
            incident_date,
        };
        graph.check_connectivity()?;
        debug!(
            entities = graph.entities.len(),
            edges = graph.edges.len(),
            subgraphs = graph.subgraphs.len(),
            "identity graph built"
        );
        Ok(graph)
    }

    fn kind_of(&self, id: EntityId) -> EntityKind {
        self.entities[id.0 as usize].kind
    }

    fn mint(&mut self, kind: EntityKind) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        let name = self.names.entity_name(kind, &mut *self.rng);
        self.entities.push(Entity {
            id,
            kind,
            name,
            categories: BTreeSet::new(),
            subgraphs: BTreeSet::new(),
        });
        id
    }

    fn choose_category(
        &mut self,
        subgraph: usize,
        start: EntityId,
        avoid: Option<Category>,
        goal: ChainGoal,
    ) -> Result<Category, GraphIncoherence> {
        let kind = self.kind_of(start);
        let max_len = self.policy.max_chain_len;
        let admissible = |c: Category| match goal {
            ChainGoal::Free => can_extend(c, kind, 1),
            ChainGoal::EndAtPerson => (1..=max_len).any(|len| can_reach_person(c, kind, len)),
        };
        let mut candidates: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| self.config.category_weight(*c) > 0 && admissible(*c))
            .collect();
        if candidates.len() > 1 {
            if let Some(avoid) = avoid {
                candidates.retain(|c| *c != avoid);
            }
        }
        let weights: Vec<u32> = candidates
            .iter()
            .map(|c| self.config.category_weight(*c))
            .collect();
        self.rng
            .weighted_index(&weights)
            .map(|idx| candidates[idx])
            .ok_or_else(|| GraphIncoherence::Disconnected {
                subgraph,
                reason: format!("no weighted category continues from a {kind:?}"),
            })
    }

    /// Prefer entities already shared by several subgraphs, never the culprit.
    fn choose_branch_start(&mut self, answer: EntityId) -> EntityId {
        let candidates: Vec<&Entity> = self.entities.iter().filter(|e| e.id != answer).collect();
        let weights: Vec<u32> = candidates
            .iter()
            .map(|e| 1 + e.subgraphs.len() as u32)
            .collect();
        match self.rng.weighted_index(&weights) {
            Some(idx) => candidates[idx].id,
            None => answer,
        }
    }

    /// Build one chain, relaxing its length until it fits. Returns the
    /// terminal entity.
    fn build_chain(
        &mut self,
        index: usize,
        start: EntityId,
        category: Category,
        role: SubgraphRole,
        goal: ChainGoal,
    ) -> Result<EntityId, GraphIncoherence> {
        let mut len = self
            .rng
            .gen_between(self.policy.min_chain_len, self.policy.max_chain_len);
        if goal == ChainGoal::EndAtPerson {
            let kind = self.kind_of(start);
            // Lengthen until a person is reachable at exactly `len` steps.
            while len < self.policy.max_chain_len && !can_reach_person(category, kind, len) {
                len += 1;
            }
        }
        loop {
            match self.try_chain(index, start, category, len, goal) {
                Ok(edges) => {
                    let terminal = edges
                        .last()
                        .map(|id| self.edges[id.0 as usize].target)
                        .unwrap_or(start);
                    self.subgraphs.push(Subgraph {
                        index,
                        category,
                        role,
                        edges,
                    });
                    return Ok(terminal);
                }
                Err(reason) if len > RELAXED_CHAIN_FLOOR => {
                    debug!(subgraph = index, len, %reason, "relaxing chain length");
                    len -= 1;
                }
                Err(reason) => {
                    return Err(GraphIncoherence::Disconnected {
                        subgraph: index,
                        reason,
                    })
                }
            }
        }
    }

    /// Attempt a chain of exactly `len` edges. On failure nothing minted or
    /// linked by this attempt survives.
    fn try_chain(
        &mut self,
        index: usize,
        start: EntityId,
        category: Category,
        len: usize,
        goal: ChainGoal,
    ) -> Result<Vec<EdgeId>, String> {
        let entity_mark = self.entities.len();
        let edge_mark = self.edges.len();
        let clock_mark = self.clock;

        let result = self.extend_chain(index, start, category, len, goal);
        match result {
            Ok(edges) => {
                for id in &edges {
                    let edge = &self.edges[id.0 as usize];
                    let (s, t) = (edge.source, edge.target);
                    for e in [s, t] {
                        let entity = &mut self.entities[e.0 as usize];
                        entity.categories.insert(category);
                        entity.subgraphs.insert(index);
                    }
                }
                Ok(edges)
            }
            Err(reason) => {
                for entity in self.entities.drain(entity_mark..) {
                    self.names.release(&entity.name);
                }
                self.edges.truncate(edge_mark);
                self.clock = clock_mark;
                Err(reason)
            }
        }
    }

    fn extend_chain(
        &mut self,
        index: usize,
        start: EntityId,
        category: Category,
        len: usize,
        goal: ChainGoal,
    ) -> Result<Vec<EdgeId>, String> {
        let mut in_chain: HashSet<EntityId> = HashSet::from([start]);
        let mut current = start;
        let mut out = Vec::with_capacity(len);

        for step in 0..len {
            let remaining = len - step - 1;
            let here = self.kind_of(current);
            let mut kinds: Vec<&'static EdgeKind> = kinds_from(category, here)
                .filter(|k| match goal {
                    ChainGoal::Free => can_extend(category, k.target, remaining),
                    ChainGoal::EndAtPerson => can_reach_person(category, k.target, remaining),
                })
                .collect();
            if kinds.is_empty() {
                return Err(format!(
                    "no {category} edge from a {here:?} leaves {remaining} more step(s)"
                ));
            }
            self.rng.shuffle(&mut kinds);

            let mut linked = None;
            for kind in kinds {
                if let Some(target) = self.choose_target(current, kind, &in_chain) {
                    linked = Some((kind, target));
                    break;
                }
            }
            let Some((kind, target)) = linked else {
                return Err(format!("entity pool exhausted at step {step} from {current}"));
            };

            self.clock += chrono::Duration::minutes(self.rng.gen_between(1, 17) as i64);
            let id = EdgeId(self.edges.len() as u32);
            self.edges.push(Edge {
                id,
                source: current,
                target,
                kind,
                subgraph: index,
                observed_at: self.clock,
            });
            in_chain.insert(target);
            out.push(id);
            current = target;
        }
        Ok(out)
    }

    fn choose_target(
        &mut self,
        source: EntityId,
        kind: &'static EdgeKind,
        in_chain: &HashSet<EntityId>,
    ) -> Option<EntityId> {
        let reusable: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|e| {
                e.kind == kind.target
                    && e.id != source
                    && !in_chain.contains(&e.id)
                    && !self
                        .edges
                        .iter()
                        .any(|x| x.source == source && x.target == e.id)
            })
            .map(|e| e.id)
            .collect();
        let budget_left = self.entities.len() < self.policy.entity_budget;

        if !reusable.is_empty() && (!budget_left || self.rng.chance(self.policy.reuse_percent)) {
            let weights: Vec<u32> = reusable
                .iter()
                .map(|id| 1 + self.entities[id.0 as usize].subgraphs.len() as u32)
                .collect();
            return self.rng.weighted_index(&weights).map(|idx| reusable[idx]);
        }
        if budget_left {
            return Some(self.mint(kind.target));
        }
        None
    }
}
