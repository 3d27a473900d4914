//! Property tests for info levels, inclusion rules and report determinism.

use dbcrawler_core::provider::{DatabaseSnapshot, RowOrder, SnapshotProvider};
use dbcrawler_core::{
    CrawlOptions, InclusionRule, InfoLevel, MetadataCategory, MetadataCrawler, RenderOptions,
    RuleCategory, SchemaInfoLevel, render,
};
use proptest::prelude::*;

const BOOKSTORE: &str = include_str!("fixtures/bookstore.json");

fn report(seed: Option<u64>, concurrency: usize, portable_names: bool) -> String {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let snapshot = DatabaseSnapshot::from_json_str(BOOKSTORE).unwrap();
        let provider = match seed {
            Some(seed) => {
                SnapshotProvider::new(snapshot).with_row_order(RowOrder::Shuffled { seed })
            }
            None => SnapshotProvider::new(snapshot),
        };
        let config = CrawlOptions {
            info_level: Some("maximum".to_string()),
            max_concurrent_queries: Some(concurrency),
            ..Default::default()
        }
        .into_config()
        .unwrap();

        let outcome = MetadataCrawler::new(&provider, &config).crawl().await.unwrap();
        render(
            &outcome,
            &RenderOptions {
                portable_names,
                ..Default::default()
            },
        )
        .unwrap()
    })
}

proptest! {
    #[test]
    fn prop_presets_are_monotonic(lower in 0usize..4, higher in 0usize..4) {
        prop_assume!(lower <= higher);
        let lower = SchemaInfoLevel::preset(InfoLevel::PRESETS[lower]);
        let higher = SchemaInfoLevel::preset(InfoLevel::PRESETS[higher]);

        prop_assert!(higher.is_superset_of(&lower));
        for category in MetadataCategory::ALL {
            if lower.is_enabled(category) {
                prop_assert!(higher.is_enabled(category));
            }
        }
    }

    #[test]
    fn prop_exclusion_wins(schema in "[a-z]{1,8}", table in "[a-z_]{1,12}") {
        let name = format!("{}.{}", schema, table);
        let pattern = regex::escape(&name);

        let both = InclusionRule::new(RuleCategory::Tables, Some(&pattern), Some(&pattern)).unwrap();
        prop_assert!(!both.included(&name));

        let include_all = InclusionRule::new(RuleCategory::Tables, None, Some(&pattern)).unwrap();
        prop_assert!(!include_all.included(&name));

        let include_only = InclusionRule::new(RuleCategory::Tables, Some(&pattern), None).unwrap();
        prop_assert!(include_only.included(&name));
    }

    #[test]
    fn prop_patterns_match_whole_name(schema in "[a-z]{2,8}", table in "[a-z]{2,8}") {
        let name = format!("{}.{}", schema, table);
        // A prefix of the name must not match on its own
        let rule = InclusionRule::new(RuleCategory::Tables, Some(&regex::escape(&schema)), None)
            .unwrap();
        prop_assert!(!rule.included(&name));
        prop_assert!(rule.included(&schema));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_report_independent_of_retrieval_order(
        seed in any::<u64>(),
        concurrency in 1usize..=50,
        portable_names in any::<bool>(),
    ) {
        let baseline = report(None, 1, portable_names);
        prop_assert_eq!(report(Some(seed), concurrency, portable_names), baseline);
    }
}
