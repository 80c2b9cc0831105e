use proptest::prelude::*;
use sleuthgraph_core::catalog::{Category, DocumentCatalog, DocumentType};
use sleuthgraph_core::document::is_technical_key;
use sleuthgraph_core::rng::XorShift64;
use sleuthgraph_core::{GeneratorConfig, Mystery, MysteryForge};

fn generate(seed: u64) -> Mystery {
    MysteryForge::new(GeneratorConfig::default())
        .unwrap()
        .generate(seed, 1_700_000_000)
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn narrative_documents_carry_no_technical_keys(seed in any::<u64>()) {
        let mystery = generate(seed);
        for doc in mystery.documents().iter().filter(|d| d.document_type().is_narrative()) {
            let view = doc.public_view();
            let top = view.as_object().unwrap();
            let fields = top["fields"].as_object().unwrap();
            for key in top.keys().chain(fields.keys()) {
                prop_assert!(!is_technical_key(key), "{} carries `{}`", doc.id(), key);
            }
        }
    }

    #[test]
    fn step_numbers_are_contiguous_from_one(seed in any::<u64>()) {
        let mystery = generate(seed);
        let tree = mystery.proof_tree();
        prop_assert_eq!(tree.total_hops, tree.hops.len());
        for (idx, hop) in tree.hops.iter().enumerate() {
            prop_assert_eq!(hop.step_number as usize, idx + 1);
        }
    }

    #[test]
    fn every_hop_cites_existing_documents(seed in any::<u64>()) {
        let mystery = generate(seed);
        for hop in &mystery.proof_tree().hops {
            prop_assert!(!hop.supporting_document_ids.is_empty());
            for id in &hop.supporting_document_ids {
                prop_assert!(mystery.document(id).is_some(), "step {} cites {}", hop.step_number, id);
            }
        }
    }

    #[test]
    fn every_hop_is_stated_verbatim_by_a_supporting_document(seed in any::<u64>()) {
        let mystery = generate(seed);
        for hop in &mystery.proof_tree().hops {
            let stated = hop
                .supporting_document_ids
                .iter()
                .filter_map(|id| mystery.document(id))
                .any(|doc| doc.mentions(&hop.expected_inference));
            prop_assert!(stated, "step {} expects `{}`", hop.step_number, hop.expected_inference);
        }
    }

    #[test]
    fn json_round_trip_preserves_the_artifact(seed in any::<u64>()) {
        let mystery = generate(seed);
        let json = serde_json::to_string(&mystery).unwrap();
        let back: Mystery = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, mystery);
    }

    #[test]
    fn metadata_counts_match_collections(seed in any::<u64>()) {
        let mystery = generate(seed);
        let meta = mystery.metadata();
        prop_assert_eq!(meta.total_documents, mystery.documents().len());
        prop_assert_eq!(meta.total_images, mystery.images().len());
        prop_assert!((1..=10).contains(&meta.difficulty));
        prop_assert_eq!(mystery.proof_tree().final_inference(), Some(mystery.answer()));
    }
}

#[test]
fn network_catalog_is_three_quarters_narrative() {
    use DocumentType::*;
    let catalog = DocumentCatalog::from_multisets(Category::ALL.into_iter().map(|c| {
        let tags = match c {
            Category::Network => vec![
                Email,
                Email,
                InternalMemo,
                InternalMemo,
                IncidentReport,
                SecurityReport,
                ServerLog,
                NetworkLog,
            ],
            _ => vec![Email],
        };
        (c, tags)
    }))
    .unwrap();
    assert_eq!(catalog.narrative_fraction(Category::Network), 0.75);

    let mut rng = XorShift64::new(2024);
    let narrative = (0..1000)
        .filter(|_| catalog.sample(Category::Network, &mut rng).is_narrative())
        .count();
    let fraction = narrative as f64 / 1000.0;
    assert!((0.70..=0.80).contains(&fraction), "narrative fraction {fraction}");
}

#[test]
fn distinct_seeds_give_distinct_mysteries() {
    let a = generate(1);
    let b = generate(2);
    assert_ne!(a.id(), b.id());
}
