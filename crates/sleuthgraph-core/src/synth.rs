//! Document synthesis.
//!
//! Each plan slot becomes one document. Edge slots carry the edge's clue as
//! prose (narrative types) or as a record (technical types); noise slots
//! carry an unrelated fact between bystanders. Drafts go through
//! [`DocumentDraft::emit`]; a violating draft is redrawn with a fresh type
//! until the regeneration limit is spent.

use crate::catalog::{Category, DocumentCatalog, DocumentType, Schema};
use crate::config::SynthesisPolicy;
use crate::document::{Document, DocumentDraft, DocumentId};
use crate::error::{GraphIncoherence, MysteryError, SchemaViolation};
use crate::graph::{Edge, EdgeKind, EntityKind, IdentityGraph};
use crate::names::{self, mailbox, NameForge, DEPARTMENTS, JOB_TITLES};
use crate::plan::{EvidencePlan, SlotRole};
use crate::proof_tree::ProofTree;
use crate::rng::XorShift64;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Post-processing applied to every draft before emission.
pub type DraftHook = fn(DocumentDraft) -> DocumentDraft;

// ============================================================================
// Phrase pools
// ============================================================================

const GREETINGS: &[&str] = &["Hi all,", "Hello,", "Team,", "Morning,"];
const OPENERS: &[&str] = &[
    "Flagging something from last night:",
    "Quick note before the review:",
    "For the record,",
    "Following up on the alert,",
    "Not sure who owns this, but",
];
const CLOSERS: &[&str] = &[
    "Can someone confirm this is expected?",
    "Let me know if this needs a ticket.",
    "I have not escalated yet.",
    "Please keep this between us for now.",
    "Nobody on my side requested it.",
];
const SIGN_OFFS: &[&str] = &["Thanks,", "Regards,", "Best,", "Cheers,"];
const STATEMENT_LEADS: &[&str] = &[
    "I was finishing late that evening.",
    "I remember it because the corridor lights were already off.",
    "I only noticed because my own shift had ended.",
];
const DIARY_MOODS: &[&str] = &[
    "Long day again.",
    "Couldn't sleep, writing this down.",
    "Something felt off today.",
];
const REPORT_FILLER: &[&str] = &[
    "No malware was found on the inspected workstations.",
    "Backups for the period completed on schedule.",
    "CCTV coverage of the east corridor was offline for maintenance.",
    "Two unrelated failed logins were traced to a misconfigured printer.",
    "The change freeze was in effect for the whole week.",
];
const TICKET_STATUSES: &[&str] = &["open", "in progress", "resolved", "closed"];
const FILLER_ACTIONS: &[&str] = &["HEARTBEAT", "SYNC", "LOGOUT", "PING", "SCAN", "ROTATE"];
const NOISE_FACTS: &[&str] = &[
    "{src} asked {dst} to move the quarterly review to {time}",
    "{src} covered the on-call shift for {dst} starting {time}",
    "{src} returned the spare projector to {dst} at {time}",
    "{src} and {dst} stayed for the budget call until {time}",
];

fn subject_for(category: Option<Category>) -> &'static [&'static str] {
    match category {
        Some(Category::Network) => &["Odd traffic overnight", "VPN alert follow-up", "Connection spike"],
        Some(Category::Auth) => &["Login at a strange hour", "Password reset request", "Account activity"],
        Some(Category::Physical) => &["After-hours access", "Badge question", "Building access"],
        Some(Category::System) => &["Export job", "Change on the ledger host", "Asset question"],
        Some(Category::Transaction) => &["Payment query", "Invoice approval", "Transfer check"],
        Some(Category::Mapping) => &["Directory cleanup", "Org chart update", "Ownership records"],
        None => &["Weekly update", "Schedule change", "Housekeeping"],
    }
}

fn report_code(ty: DocumentType) -> &'static str {
    match ty {
        DocumentType::IncidentReport => "IR",
        DocumentType::SecurityReport => "SR",
        DocumentType::AuditReport => "AR",
        DocumentType::PoliceReport => "PR",
        _ => "RP",
    }
}

/// `"device_registry"` → `"Device Registry"`.
fn title_case(tag: &str) -> String {
    tag.split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fill a clue template. Only a leading literal word is capitalized; names
/// are substituted verbatim so every rendering still contains them exactly.
fn render_clue(template: &str, src: &str, dst: &str, time: &str) -> String {
    sentence_case(template)
        .replace("{src}", src)
        .replace("{dst}", dst)
        .replace("{time}", time)
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ============================================================================
// Facts
// ============================================================================

/// The one statement a document exists to carry.
#[derive(Debug, Clone)]
struct Fact {
    src: String,
    dst: String,
    sentence: String,
    action: &'static str,
    relation: &'static str,
    at: NaiveDateTime,
    category: Option<Category>,
    src_is_person: bool,
    dst_is_person: bool,
    src_is_system: bool,
}

impl Fact {
    fn from_edge(graph: &IdentityGraph, edge: &Edge) -> Self {
        let source_kind = graph.entity(edge.source).map(|e| e.kind);
        Self::for_kind(
            edge.kind,
            graph.name_of(edge.source).to_string(),
            graph.name_of(edge.target).to_string(),
            source_kind,
            edge.observed_at,
        )
    }

    fn for_kind(
        kind: &'static EdgeKind,
        src: String,
        dst: String,
        source_kind: Option<EntityKind>,
        at: NaiveDateTime,
    ) -> Self {
        let sentence = render_clue(kind.clue, &src, &dst, &at.format("%H:%M").to_string());
        Self {
            src,
            dst,
            sentence,
            action: kind.action,
            relation: kind.name,
            at,
            category: Some(kind.category),
            src_is_person: source_kind == Some(EntityKind::Person),
            dst_is_person: kind.target == EntityKind::Person,
            src_is_system: source_kind == Some(EntityKind::System),
        }
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

pub struct DocumentSynthesizer<'a> {
    catalog: &'a DocumentCatalog,
    policy: &'a SynthesisPolicy,
    graph: &'a IdentityGraph,
    rng: &'a mut XorShift64,
    names: &'a mut NameForge,
    hook: Option<DraftHook>,
}

impl<'a> DocumentSynthesizer<'a> {
    pub fn new(
        catalog: &'a DocumentCatalog,
        policy: &'a SynthesisPolicy,
        graph: &'a IdentityGraph,
        rng: &'a mut XorShift64,
        names: &'a mut NameForge,
    ) -> Self {
        Self {
            catalog,
            policy,
            graph,
            rng,
            names,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: DraftHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The emission boundary, exposed for callers holding their own drafts.
    pub fn emit(&self, draft: DocumentDraft) -> Result<Document, SchemaViolation> {
        let draft = match self.hook {
            Some(hook) => hook(draft),
            None => draft,
        };
        draft.emit()
    }

    /// One document per plan slot, in plan order.
    pub fn synthesize(&mut self, plan: &EvidencePlan, proof: &ProofTree) -> Result<Vec<Document>, MysteryError> {
        let mut refs: HashMap<&DocumentId, Vec<u32>> = HashMap::new();
        for hop in &proof.hops {
            for id in &hop.supporting_document_ids {
                refs.entry(id).or_default().push(hop.step_number);
            }
        }

        let mut documents = Vec::with_capacity(plan.len());
        for slot in plan.slots() {
            let fact = match slot.role {
                SlotRole::Edge(edge_id) => {
                    let edge = self.graph.edge(edge_id).ok_or_else(|| GraphIncoherence::Disconnected {
                        subgraph: 0,
                        reason: format!("plan references missing {edge_id}"),
                    })?;
                    Fact::from_edge(self.graph, edge)
                }
                SlotRole::Noise(_) => self.noise_fact(),
            };
            let clue_refs = refs.get(&slot.document_id).cloned().unwrap_or_default();
            documents.push(self.synthesize_one(&slot.document_id, &fact, clue_refs)?);
        }
        debug!(documents = documents.len(), "documents synthesized");
        Ok(documents)
    }

    fn synthesize_one(&mut self, id: &DocumentId, fact: &Fact, clue_refs: Vec<u32>) -> Result<Document, MysteryError> {
        let mut attempt = 0;
        loop {
            let ty = match fact.category {
                Some(category) => self.catalog.sample(category, &mut *self.rng),
                None => self.catalog.sample_any(&mut *self.rng),
            };
            let draft = self.draft(id, ty, fact).with_clue_refs(clue_refs.clone());
            match self.emit(draft) {
                Ok(doc) => return Ok(doc),
                Err(violation) if attempt < self.policy.regenerate_limit => {
                    warn!(document = %id, attempt, error = %violation, "regenerating document");
                    attempt += 1;
                }
                Err(violation) => return Err(violation.into()),
            }
        }
    }

    fn bystander(&mut self) -> String {
        self.names.bystander(&mut *self.rng)
    }

    fn pick(&mut self, pool: &'static [&'static str]) -> &'static str {
        names::pick(pool, &mut *self.rng)
    }

    fn noise_fact(&mut self) -> Fact {
        let src = self.bystander();
        let dst = self.bystander();
        let base = self
            .graph
            .edges()
            .first()
            .map(|e| e.observed_at)
            .unwrap_or_default();
        let at = base + Duration::minutes(self.rng.gen_between(0, 240) as i64 - 120);
        let template = self.pick(NOISE_FACTS);
        let sentence = render_clue(template, &src, &dst, &at.format("%H:%M").to_string());
        Fact {
            src,
            dst,
            sentence,
            action: "NOTE",
            relation: "mentioned-with",
            at,
            category: None,
            src_is_person: true,
            dst_is_person: true,
            src_is_system: false,
        }
    }

    fn draft(&mut self, id: &DocumentId, ty: DocumentType, fact: &Fact) -> DocumentDraft {
        let body = match ty.schema() {
            Schema::Email => self.email(fact),
            Schema::Memo => self.memo(fact),
            Schema::Report => self.report(ty, fact),
            Schema::Statement => self.statement(fact),
            Schema::Ticket => self.ticket(fact),
            Schema::PersonnelFile => self.personnel_file(fact),
            Schema::Diary => self.diary(fact),
            Schema::LogTable => self.log_table(ty, fact),
            Schema::Registry => self.registry(ty, fact),
        };
        DocumentDraft::new(id, ty, fields(body))
    }

    fn later(&mut self, at: NaiveDateTime) -> NaiveDateTime {
        at + Duration::minutes(self.rng.gen_between(5, 90) as i64)
    }

    fn email(&mut self, fact: &Fact) -> Value {
        let author = self.bystander();
        let recipient = self.bystander();
        let cc = if self.rng.chance(40) {
            vec![mailbox(&self.bystander())]
        } else {
            Vec::new()
        };
        let sent_at = self.later(fact.at);
        let body = format!(
            "{}\n\n{} {}. {}\n\n{}\n{}",
            self.pick(GREETINGS),
            self.pick(OPENERS),
            fact.sentence,
            self.pick(CLOSERS),
            self.pick(SIGN_OFFS),
            author
        );
        json!({
            "from": mailbox(&author),
            "to": mailbox(&recipient),
            "cc": cc,
            "subject": self.pick(subject_for(fact.category)),
            "sent_at": sent_at.format("%Y-%m-%d %H:%M").to_string(),
            "body": body,
        })
    }

    fn memo(&mut self, fact: &Fact) -> Value {
        let author = self.bystander();
        let department = self.pick(DEPARTMENTS);
        let body = format!("{} {}. {}", self.pick(OPENERS), fact.sentence, self.pick(CLOSERS));
        json!({
            "from": format!("{author}, {department}"),
            "to": format!("{} team", self.pick(DEPARTMENTS)),
            "date": fact.at.format("%Y-%m-%d").to_string(),
            "subject": self.pick(subject_for(fact.category)),
            "body": body,
        })
    }

    fn report(&mut self, ty: DocumentType, fact: &Fact) -> Value {
        let mut findings = vec![
            self.pick(REPORT_FILLER).to_string(),
            format!("{}.", fact.sentence),
            self.pick(REPORT_FILLER).to_string(),
        ];
        self.rng.shuffle(&mut findings);
        findings.dedup();
        json!({
            "title": format!("{} {}-{}", title_case(ty.as_str()), report_code(ty), self.rng.gen_between(1000, 9999)),
            "author": self.bystander(),
            "date": self.later(fact.at).format("%Y-%m-%d").to_string(),
            "summary": format!("Review of activity recorded on {}.", fact.at.format("%Y-%m-%d")),
            "findings": findings,
        })
    }

    fn statement(&mut self, fact: &Fact) -> Value {
        let witness = self.bystander();
        let investigator = self.bystander();
        json!({
            "witness": witness,
            "taken_by": format!("Investigator {investigator}"),
            "date": self.later(fact.at).format("%Y-%m-%d").to_string(),
            "statement": format!("{} {}. That is all I saw.", self.pick(STATEMENT_LEADS), fact.sentence),
        })
    }

    fn ticket(&mut self, fact: &Fact) -> Value {
        json!({
            "ticket_id": format!("INC-{:05}", self.rng.gen_between(10_000, 99_999)),
            "reporter": self.bystander(),
            "assignee": self.bystander(),
            "opened_at": self.later(fact.at).format("%Y-%m-%d %H:%M").to_string(),
            "status": self.pick(TICKET_STATUSES),
            "title": self.pick(subject_for(fact.category)),
            "description": format!("{}. {}", fact.sentence, self.pick(CLOSERS)),
        })
    }

    fn personnel_file(&mut self, fact: &Fact) -> Value {
        let employee = if fact.src_is_person {
            fact.src.clone()
        } else if fact.dst_is_person {
            fact.dst.clone()
        } else {
            self.bystander()
        };
        json!({
            "employee": employee,
            "title": self.pick(JOB_TITLES),
            "department": self.pick(DEPARTMENTS),
            "manager": self.bystander(),
            "start_date": format!("{}-{:02}-01", self.rng.gen_between(2015, 2023), self.rng.gen_between(1, 12)),
            "notes": format!("{}.", fact.sentence),
        })
    }

    fn diary(&mut self, fact: &Fact) -> Value {
        json!({
            "author": self.bystander(),
            "date": fact.at.format("%Y-%m-%d").to_string(),
            "entry": format!("{} {}. I keep thinking about it.", self.pick(DIARY_MOODS), fact.sentence),
        })
    }

    /// A graph entity for a filler row, never the entity the document's
    /// clue points at.
    fn filler_name(&mut self, clue_target: &str) -> String {
        let graph = self.graph;
        let pool: Vec<&str> = graph
            .entities()
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| *name != clue_target)
            .collect();
        match self.rng.pick(&pool) {
            Some(name) => name.to_string(),
            None => self.bystander(),
        }
    }

    fn log_table(&mut self, ty: DocumentType, fact: &Fact) -> Value {
        let source = if fact.src_is_system {
            fact.src.clone()
        } else {
            format!("{}-collector", ty.as_str().replace('_', "-"))
        };
        let mut entries = vec![(
            fact.at,
            json!({
                "timestamp": fact.at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "actor": fact.src,
                "action": fact.action,
                "target": fact.dst,
                "detail": fact.relation,
            }),
        )];
        for _ in 0..self.rng.gen_between(2, 4) {
            let at = fact.at + Duration::minutes(self.rng.gen_between(0, 120) as i64 - 60);
            let entry = json!({
                "timestamp": at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "actor": self.filler_name(&fact.dst),
                "action": self.pick(FILLER_ACTIONS),
                "target": self.filler_name(&fact.dst),
                "detail": "routine",
            });
            entries.push((at, entry));
        }
        entries.sort_by_key(|(at, _)| *at);
        let entries: Vec<Value> = entries.into_iter().map(|(_, e)| e).collect();
        json!({ "source": source, "entries": entries })
    }

    fn registry(&mut self, ty: DocumentType, fact: &Fact) -> Value {
        let updated = fact.at.format("%Y-%m-%d").to_string();
        let mut records = vec![json!({
            "record_id": format!("REC-{:04}", self.rng.gen_between(1000, 9999)),
            "subject": fact.src,
            "relation": fact.relation,
            "linked_to": fact.dst,
            "updated": updated,
        })];
        for _ in 0..self.rng.gen_between(1, 3) {
            records.push(json!({
                "record_id": format!("REC-{:04}", self.rng.gen_between(1000, 9999)),
                "subject": self.filler_name(&fact.dst),
                "relation": "listed",
                "linked_to": self.filler_name(&fact.dst),
                "updated": updated,
            }));
        }
        self.rng.shuffle(&mut records);
        json!({ "registry": title_case(ty.as_str()), "records": records })
    }
}

/// Prompt for the illustration attached to `doc`.
pub fn illustration_prompt(doc: &Document) -> String {
    format!(
        "Grainy evidence photograph of a printed {} ({}), documentary style, no legible names",
        title_case(doc.document_type().as_str()).to_lowercase(),
        doc.id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::error::ViolationKind;
    use crate::graph::GraphBuilder;
    use crate::proof_tree::ProofTreeAssembler;

    struct Fixture {
        graph: IdentityGraph,
        plan: EvidencePlan,
        proof: ProofTree,
        names: NameForge,
        rng: XorShift64,
    }

    fn fixture(seed: u64) -> Fixture {
        let config = GeneratorConfig::default();
        let mut rng = XorShift64::new(seed);
        let mut names = NameForge::new();
        let graph = GraphBuilder::new(&config, &mut rng, &mut names).build().unwrap();
        let plan = EvidencePlan::new(&graph, 3, 0, &mut rng);
        let policy = crate::config::ProofPolicy {
            min_hops: 1,
            max_hops: 12,
        };
        let proof = ProofTreeAssembler::new(&graph, &plan, &policy).assemble().unwrap();
        Fixture {
            graph,
            plan,
            proof,
            names,
            rng,
        }
    }

    fn contaminate(mut draft: DocumentDraft) -> DocumentDraft {
        draft.fields.insert("system_logs".into(), json!([]));
        draft
    }

    #[test]
    fn every_supporting_document_states_its_inference() {
        let mut f = fixture(31);
        let catalog = DocumentCatalog::standard();
        let policy = SynthesisPolicy::default();
        let docs = DocumentSynthesizer::new(&catalog, &policy, &f.graph, &mut f.rng, &mut f.names)
            .synthesize(&f.plan, &f.proof)
            .unwrap();
        assert_eq!(docs.len(), f.plan.len());
        for hop in &f.proof.hops {
            let doc = docs
                .iter()
                .find(|d| d.id() == &hop.supporting_document_ids[0])
                .unwrap();
            assert!(doc.mentions(&hop.expected_inference), "{}", doc.render_text());
            assert!(doc.clue_refs().contains(&hop.step_number));
        }
        let noise = docs.iter().filter(|d| d.is_noise()).count();
        assert!(noise >= 3);
    }

    #[test]
    fn email_with_system_logs_is_a_schema_violation() {
        let mut f = fixture(2);
        let catalog = DocumentCatalog::standard();
        let policy = SynthesisPolicy::default();
        let synth = DocumentSynthesizer::new(&catalog, &policy, &f.graph, &mut f.rng, &mut f.names);
        let mut body = Map::new();
        body.insert("system_logs".into(), json!([{ "event": "login" }]));
        let draft = DocumentDraft::new(&DocumentId::from_index(1), DocumentType::Email, body);
        let err = synth.emit(draft).unwrap_err();
        assert!(matches!(err.kind, ViolationKind::TechnicalKey { ref key, .. } if key == "system_logs"));
    }

    #[test]
    fn contaminated_narrative_templates_exhaust_regeneration() {
        let mut f = fixture(5);
        let narrative_only = DocumentCatalog::from_multisets(
            Category::ALL.into_iter().map(|c| (c, vec![DocumentType::Email, DocumentType::Diary])),
        )
        .unwrap();
        let policy = SynthesisPolicy {
            regenerate_limit: 2,
            ..SynthesisPolicy::default()
        };
        let result = DocumentSynthesizer::new(&narrative_only, &policy, &f.graph, &mut f.rng, &mut f.names)
            .with_hook(contaminate)
            .synthesize(&f.plan, &f.proof);
        assert!(matches!(result, Err(MysteryError::Schema(_))));
    }

    #[test]
    fn technical_schemas_reject_undeclared_keys() {
        let mut f = fixture(5);
        let technical_only = DocumentCatalog::from_multisets(
            Category::ALL
                .into_iter()
                .map(|c| (c, vec![DocumentType::AuthLog, DocumentType::DeviceRegistry])),
        )
        .unwrap();
        let policy = SynthesisPolicy::default();
        let result = DocumentSynthesizer::new(&technical_only, &policy, &f.graph, &mut f.rng, &mut f.names)
            .with_hook(contaminate)
            .synthesize(&f.plan, &f.proof);
        match result {
            Err(MysteryError::Schema(v)) => {
                assert!(matches!(v.kind, ViolationKind::UnknownKey { .. }))
            }
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    fn lowercase_name(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Person => "E. Voss",
            EntityKind::System => "srv-ledger-03",
            EntityKind::Location => "server room b",
            EntityKind::Account => "acct-4471",
            EntityKind::Org => "Halden Holdings",
        }
    }

    #[test]
    fn every_edge_kind_keeps_its_target_verbatim_in_every_document_type() {
        let mut f = fixture(13);
        let catalog = DocumentCatalog::standard();
        let policy = SynthesisPolicy::default();
        let mut synth = DocumentSynthesizer::new(&catalog, &policy, &f.graph, &mut f.rng, &mut f.names);
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 14)
            .and_then(|d| d.and_hms_opt(22, 14, 0))
            .unwrap();
        for kind in crate::graph::EDGE_KINDS {
            for source in kind.sources {
                let src = lowercase_name(*source);
                let dst = lowercase_name(kind.target);
                let fact = Fact::for_kind(kind, src.to_string(), dst.to_string(), Some(*source), at);
                for ty in DocumentType::ALL {
                    let draft = synth.draft(&DocumentId::from_index(1), *ty, &fact);
                    let doc = synth.emit(draft).unwrap();
                    assert!(
                        doc.mentions(dst),
                        "{} in {}: {}",
                        kind.name,
                        ty.as_str(),
                        doc.render_text()
                    );
                }
            }
        }
    }

    #[test]
    fn clue_rendering_capitalizes_only_literal_openings() {
        assert_eq!(
            render_clue("{dst} is installed in {src}", "server room b", "srv-ledger-03", "22:14"),
            "srv-ledger-03 is installed in server room b"
        );
        assert_eq!(
            render_clue("account {dst} authenticated against {src} at {time}", "srv-ledger-03", "acct-4471", "22:14"),
            "Account acct-4471 authenticated against srv-ledger-03 at 22:14"
        );
    }

    #[test]
    fn filler_rows_never_name_the_clue_target() {
        let mut f = fixture(21);
        let catalog = DocumentCatalog::standard();
        let policy = SynthesisPolicy::default();
        let target = f.graph.name_of(f.graph.answer()).to_string();
        let mut synth = DocumentSynthesizer::new(&catalog, &policy, &f.graph, &mut f.rng, &mut f.names);
        for _ in 0..200 {
            assert_ne!(synth.filler_name(&target), target);
        }
    }

    #[test]
    fn title_case_splits_tags() {
        assert_eq!(title_case("device_registry"), "Device Registry");
        assert_eq!(sentence_case("the export"), "The export");
    }
}
