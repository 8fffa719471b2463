//! Property tests: query evaluation against a `BTreeSet` model.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use foi_core::{FilterQuery, IndexGroup, IndexGroupOptions, LockWait, MemoryStore, ObjectSet};
use proptest::prelude::*;

const FILTERS: [&str; 4] = ["dinner", "dessert", "vegetable", "fruit"];
const NO_WAIT: LockWait = LockWait::no_wait();

fn filters_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(FILTERS.to_vec(), 0..=FILTERS.len())
}

fn query_strategy() -> impl Strategy<Value = Vec<Vec<&'static str>>> {
    proptest::collection::vec(proptest::sample::subsequence(FILTERS.to_vec(), 1..=3), 0..=3)
}

/// Objects matching every group, each group matched by any of its filters.
fn model_matches<'a>(
    model: &BTreeMap<String, BTreeSet<&'a str>>,
    groups: &[Vec<&'a str>],
) -> Vec<String> {
    model
        .iter()
        .filter(|(_, tags)| groups.iter().all(|group| group.iter().any(|f| tags.contains(f))))
        .map(|(object, _)| object.clone())
        .collect()
}

fn new_group() -> IndexGroup {
    IndexGroup::new("food", Arc::new(MemoryStore::new()), IndexGroupOptions::default())
        .expect("group")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: both evaluation paths agree with the model
    #[test]
    fn prop_query_matches_model(
        assignments in proptest::collection::vec((0usize..6, filters_strategy()), 1..=12),
        groups in query_strategy(),
    ) {
        let group = new_group();
        let mut model: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for (object, filters) in &assignments {
            let object_id = format!("obj{object}");
            group
                .add_object_to_index(&object_id, "recipe", filters.iter().copied(), NO_WAIT)
                .expect("add");
            model.insert(object_id, filters.iter().copied().collect());
        }

        let mut query = FilterQuery::new();
        for filters in &groups {
            query.add_group(filters.iter().copied()).expect("group");
        }
        let expected = model_matches(&model, &groups);

        let mut direct = group.get_objects_in_index("recipe", &query).expect("direct");
        direct.sort();
        let lazy = group.create_set_for_query("recipe", &query).expect("set");
        let mut lazy_ids = lazy.object_ids().expect("ids").to_vec();
        lazy_ids.sort();

        prop_assert_eq!(&direct, &expected);
        prop_assert_eq!(&lazy_ids, &expected);
        prop_assert_eq!(lazy.count().expect("count"), expected.len());
    }

    /// Property: removal restores the model exactly
    #[test]
    fn prop_remove_drops_object_from_every_set(
        assignments in proptest::collection::vec((0usize..4, filters_strategy()), 1..=8),
        victim in 0usize..4,
    ) {
        let group = new_group();
        for (object, filters) in &assignments {
            let object_id = format!("obj{object}");
            group
                .add_object_to_index(&object_id, "recipe", filters.iter().copied(), NO_WAIT)
                .expect("add");
        }
        let victim_id = format!("obj{victim}");
        let was_indexed = assignments.iter().any(|(object, _)| *object == victim);

        let removed = group
            .remove_object_from_index(&victim_id, "recipe", LockWait::no_wait())
            .expect("remove");

        prop_assert_eq!(removed, was_indexed);
        prop_assert!(!group.is_object_in_index(&victim_id, "recipe").expect("in index"));
        for filter in FILTERS {
            let filter_set = group.get_index_filter_set("recipe", filter);
            prop_assert!(!filter_set.has_object(&victim_id).expect("filter"));
        }
    }
}
