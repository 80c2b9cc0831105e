//! Document type catalog.
//!
//! Each relationship [`Category`] owns an explicit discrete distribution over
//! [`DocumentType`] tags. Weights are occurrence counts: a category listed as
//! `[email, email, internal_memo, server_log]` draws `email` with weight 2.
//! Partition membership (narrative vs technical) is intrinsic to the tag.

use crate::error::CatalogError;
use crate::rng::XorShift64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Relationship category of an identity-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Auth,
    Physical,
    System,
    Transaction,
    Mapping,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Network,
        Category::Auth,
        Category::Physical,
        Category::System,
        Category::Transaction,
        Category::Mapping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Network => "network",
            Category::Auth => "auth",
            Category::Physical => "physical",
            Category::System => "system",
            Category::Transaction => "transaction",
            Category::Mapping => "mapping",
        }
    }

    /// Identifier chains (who is behind which identifier), as opposed to
    /// asset or money trails.
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            Category::Network | Category::Auth | Category::Physical | Category::Mapping
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| CatalogError::UnknownCategory(s.to_string()))
    }
}

/// Narrative documents are authored by people; technical documents are
/// machine-generated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Narrative,
    Technical,
}

/// The fixed field layout a document type is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    Email,
    Memo,
    Report,
    Statement,
    Ticket,
    PersonnelFile,
    Diary,
    LogTable,
    Registry,
}

macro_rules! document_types {
    ($( $variant:ident => $tag:literal, $partition:ident, $schema:ident; )*) => {
        /// Catalog tag of a document.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum DocumentType {
            $( $variant, )*
        }

        impl DocumentType {
            pub const ALL: &'static [DocumentType] = &[ $( DocumentType::$variant, )* ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( DocumentType::$variant => $tag, )*
                }
            }

            pub fn partition(self) -> Partition {
                match self {
                    $( DocumentType::$variant => Partition::$partition, )*
                }
            }

            pub fn schema(self) -> Schema {
                match self {
                    $( DocumentType::$variant => Schema::$schema, )*
                }
            }
        }
    };
}

document_types! {
    Email => "email", Narrative, Email;
    InternalMemo => "internal_memo", Narrative, Memo;
    HrMemo => "hr_memo", Narrative, Memo;
    IncidentReport => "incident_report", Narrative, Report;
    SecurityReport => "security_report", Narrative, Report;
    AuditReport => "audit_report", Narrative, Report;
    PoliceReport => "police_report", Narrative, Report;
    WitnessStatement => "witness_statement", Narrative, Statement;
    ItTicket => "it_ticket", Narrative, Ticket;
    PersonnelFile => "personnel_file", Narrative, PersonnelFile;
    Diary => "diary", Narrative, Diary;
    ServerLog => "server_log", Technical, LogTable;
    NetworkLog => "network_log", Technical, LogTable;
    FirewallLog => "firewall_log", Technical, LogTable;
    VpnLog => "vpn_log", Technical, LogTable;
    AuthLog => "auth_log", Technical, LogTable;
    LoginHistory => "login_history", Technical, LogTable;
    AccessControl => "access_control", Technical, LogTable;
    BadgeLog => "badge_log", Technical, LogTable;
    DoorAccessLog => "door_access_log", Technical, LogTable;
    SecurityScan => "security_scan", Technical, LogTable;
    AuditLog => "audit_log", Technical, LogTable;
    TransactionHistory => "transaction_history", Technical, LogTable;
    SystemLog => "system_log", Technical, LogTable;
    AssetDatabase => "asset_database", Technical, Registry;
    ItInventory => "it_inventory", Technical, Registry;
    DeviceRegistry => "device_registry", Technical, Registry;
    EmployeeDatabase => "employee_database", Technical, Registry;
    UserRegistry => "user_registry", Technical, Registry;
    HrDirectory => "hr_directory", Technical, Registry;
}

impl DocumentType {
    pub fn is_narrative(self) -> bool {
        self.partition() == Partition::Narrative
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| CatalogError::UnknownDocumentType(s.to_string()))
    }
}

/// Discrete distribution over document types for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// `(type, weight)` in first-occurrence order.
    weights: Vec<(DocumentType, u32)>,
}

impl Distribution {
    /// Fold a multiset of tags into weights.
    pub fn from_multiset(tags: &[DocumentType]) -> Self {
        let mut weights: Vec<(DocumentType, u32)> = Vec::new();
        for tag in tags {
            match weights.iter_mut().find(|(t, _)| t == tag) {
                Some((_, w)) => *w += 1,
                None => weights.push((*tag, 1)),
            }
        }
        Self { weights }
    }

    pub fn weights(&self) -> &[(DocumentType, u32)] {
        &self.weights
    }

    pub fn total_weight(&self) -> u32 {
        self.weights.iter().map(|(_, w)| *w).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight() == 0
    }

    /// Probability mass of narrative tags.
    pub fn narrative_fraction(&self) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        let narrative: u32 = self
            .weights
            .iter()
            .filter(|(t, _)| t.is_narrative())
            .map(|(_, w)| *w)
            .sum();
        f64::from(narrative) / f64::from(total)
    }

    pub fn sample(&self, rng: &mut XorShift64) -> Option<DocumentType> {
        let raw: Vec<u32> = self.weights.iter().map(|(_, w)| *w).collect();
        rng.weighted_index(&raw).map(|idx| self.weights[idx].0)
    }
}

/// Immutable category → distribution table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCatalog {
    tables: BTreeMap<Category, Distribution>,
}

impl DocumentCatalog {
    /// Build from per-category multisets. Every category must be present and
    /// non-empty.
    pub fn from_multisets<I>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (Category, Vec<DocumentType>)>,
    {
        let mut tables = BTreeMap::new();
        for (category, tags) in entries {
            tables.insert(category, Distribution::from_multiset(&tags));
        }
        for category in Category::ALL {
            match tables.get(&category) {
                Some(dist) if !dist.is_empty() => {}
                _ => return Err(CatalogError::MissingCategory(category.to_string())),
            }
        }
        Ok(Self { tables })
    }

    /// Parse a string-keyed table, e.g. from a config file.
    pub fn from_tag_table(table: &BTreeMap<String, Vec<String>>) -> Result<Self, CatalogError> {
        let mut entries = Vec::with_capacity(table.len());
        for (category, tags) in table {
            let category: Category = category.parse()?;
            let tags = tags
                .iter()
                .map(|t| t.parse::<DocumentType>())
                .collect::<Result<Vec<_>, _>>()?;
            entries.push((category, tags));
        }
        Self::from_multisets(entries)
    }

    /// The default table: narrative-leaning in every category.
    pub fn standard() -> Self {
        use DocumentType::*;
        let tables = [
            (
                Category::Network,
                vec![
                    Email,
                    Email,
                    InternalMemo,
                    InternalMemo,
                    IncidentReport,
                    SecurityReport,
                    ServerLog,
                    NetworkLog,
                ],
            ),
            (
                Category::Auth,
                vec![Email, ItTicket, SecurityReport, IncidentReport, AuthLog, LoginHistory],
            ),
            (
                Category::Physical,
                vec![
                    WitnessStatement,
                    WitnessStatement,
                    SecurityReport,
                    IncidentReport,
                    BadgeLog,
                    DoorAccessLog,
                ],
            ),
            (
                Category::System,
                vec![ItTicket, ItTicket, InternalMemo, AuditReport, AssetDatabase, DeviceRegistry],
            ),
            (
                Category::Transaction,
                vec![Email, AuditReport, AuditReport, InternalMemo, TransactionHistory, AuditLog],
            ),
            (
                Category::Mapping,
                vec![HrMemo, PersonnelFile, PersonnelFile, Email, EmployeeDatabase, UserRegistry],
            ),
        ];
        let tables = tables
            .into_iter()
            .map(|(c, tags)| (c, Distribution::from_multiset(&tags)))
            .collect();
        Self { tables }
    }

    pub fn distribution(&self, category: Category) -> &Distribution {
        // Construction guarantees every category is present.
        &self.tables[&category]
    }

    pub fn sample(&self, category: Category, rng: &mut XorShift64) -> DocumentType {
        self.distribution(category)
            .sample(rng)
            .unwrap_or(DocumentType::InternalMemo)
    }

    /// Draw a category uniformly, then a type from it. Used for noise.
    pub fn sample_any(&self, rng: &mut XorShift64) -> DocumentType {
        let category = Category::ALL[rng.gen_range_usize(Category::ALL.len())];
        self.sample(category, rng)
    }

    pub fn narrative_fraction(&self, category: Category) -> f64 {
        self.distribution(category).narrative_fraction()
    }
}
