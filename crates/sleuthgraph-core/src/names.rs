//! Display-name generation for entities and bystanders.

use crate::graph::EntityKind;
use crate::rng::XorShift64;
use std::collections::HashSet;

const INITIALS: &[&str] = &[
    "A.", "B.", "C.", "D.", "E.", "F.", "G.", "H.", "J.", "K.", "L.", "M.", "N.", "P.", "R.", "S.",
    "T.", "V.", "W.",
];

const SURNAMES: &[&str] = &[
    "Voss", "Kline", "Marsh", "Okafor", "Lindqvist", "Reyes", "Thorne", "Castellan", "Brandt",
    "Nakamura", "Osei", "Halloran", "Petrov", "Quill", "Sandoval", "Whitcombe", "Yilmaz", "Draper",
    "Ferreira", "Gallagher", "Ibsen", "Jovanovic", "Kowalski", "Moreau", "Novak", "Pryce",
];

const SYSTEM_PREFIXES: &[&str] = &["srv", "wks", "vpn", "db", "app", "nas", "fw"];
const SYSTEM_ROLES: &[&str] = &[
    "ledger", "payroll", "fin", "hr", "build", "mail", "backup", "gw", "archive", "crm",
];

const LOCATIONS: &[&str] = &[
    "Server Room B",
    "Loading Dock 2",
    "Finance Wing 3F",
    "Records Archive",
    "Data Hall A",
    "North Stairwell",
    "Executive Suite",
    "Print Room",
    "Parking Level P2",
    "Network Closet 4",
    "Mail Room",
    "Conference Room Juniper",
];

const ORG_STEMS: &[&str] = &[
    "Halden", "Corvane", "Brightwater", "Esker", "Marrow", "Tallis", "Greyfield", "Oakhurst",
];
const ORG_SUFFIXES: &[&str] = &["Freight Ltd", "Holdings", "Consulting", "Logistics", "Partners"];

pub const DEPARTMENTS: &[&str] = &[
    "Finance",
    "IT Operations",
    "Facilities",
    "Human Resources",
    "Security",
    "Procurement",
    "Legal",
];

pub const JOB_TITLES: &[&str] = &[
    "Systems Administrator",
    "Accounts Payable Clerk",
    "Facilities Coordinator",
    "Security Analyst",
    "Payroll Specialist",
    "Network Engineer",
    "Procurement Officer",
];

/// Hands out unique display names. Names already handed out (including to
/// bystanders) are never repeated within one mystery.
#[derive(Debug, Default)]
pub struct NameForge {
    used: HashSet<String>,
}

impl NameForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    pub fn release(&mut self, name: &str) {
        self.used.remove(name);
    }

    pub fn entity_name(&mut self, kind: EntityKind, rng: &mut XorShift64) -> String {
        for _ in 0..64 {
            let candidate = match kind {
                EntityKind::Person => person_name(rng),
                EntityKind::System => format!(
                    "{}-{}-{:02}",
                    pick(SYSTEM_PREFIXES, rng),
                    pick(SYSTEM_ROLES, rng),
                    rng.gen_between(1, 40)
                ),
                EntityKind::Location => pick(LOCATIONS, rng).to_string(),
                EntityKind::Account => format!("acct-{:04}", rng.gen_between(1000, 9999)),
                EntityKind::Org => format!("{} {}", pick(ORG_STEMS, rng), pick(ORG_SUFFIXES, rng)),
            };
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
        // Pools exhausted: disambiguate with a counter.
        let base = match kind {
            EntityKind::Location => "Annex",
            EntityKind::Org => "Numbered Company",
            EntityKind::Person => "X. Doe",
            EntityKind::System => "host",
            EntityKind::Account => "acct",
        };
        let mut n = self.used.len();
        loop {
            let candidate = format!("{base} {n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// A person who appears in documents but is not part of the graph.
    pub fn bystander(&mut self, rng: &mut XorShift64) -> String {
        self.entity_name(EntityKind::Person, rng)
    }
}

fn person_name(rng: &mut XorShift64) -> String {
    format!("{} {}", pick(INITIALS, rng), pick(SURNAMES, rng))
}

pub fn pick<'a>(pool: &'a [&'a str], rng: &mut XorShift64) -> &'a str {
    rng.pick(pool).copied().unwrap_or_default()
}

/// `"E. Voss"` → `"e.voss@corp.example"`.
pub fn mailbox(name: &str) -> String {
    let slug: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(".")
        .to_ascii_lowercase();
    format!("{slug}@corp.example")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_within_a_forge() {
        let mut forge = NameForge::new();
        let mut rng = XorShift64::new(11);
        let mut seen = HashSet::new();
        for _ in 0..40 {
            let name = forge.entity_name(EntityKind::Location, &mut rng);
            assert!(seen.insert(name));
        }
    }

    #[test]
    fn mailbox_slugs_names() {
        assert_eq!(mailbox("E. Voss"), "e.voss@corp.example");
    }
}
