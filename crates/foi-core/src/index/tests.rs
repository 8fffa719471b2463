//! Tests for index groups and object locks.

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::Error;
use crate::query::FilterQuery;
use crate::set::{ObjectSet, SetExpr};
use crate::store::{Clock, Command, ManualClock, MemoryStore, Store};

const NO_FILTERS: [&str; 0] = [];

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    group: IndexGroup,
}

impl Fixture {
    fn new() -> Self {
        Self::with_tenant(None)
    }

    fn with_tenant(tenant: Option<&str>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let group = IndexGroup::new("food", store.clone(), IndexGroupOptions::default())
            .expect("group")
            .with_tenant(tenant)
            .with_clock(clock.clone());
        Self { store, clock, group }
    }

    fn members(&self, key: &str) -> Vec<String> {
        self.store.smembers(key).expect("smembers")
    }

    fn recipes(&self) {
        let wait = LockWait::default();
        self.group
            .add_object_to_index("salt", "recipe", ["dinner", "dessert"], wait)
            .expect("salt");
        self.group
            .add_object_to_index("carrot", "recipe", ["vegetable", "dinner"], wait)
            .expect("carrot");
        self.group
            .add_object_to_index("apple", "recipe", ["dessert", "fruit"], wait)
            .expect("apple");
    }
}

// =========================================================================
// LockWait
// =========================================================================

#[test]
fn test_lock_wait_validation() {
    assert_eq!(LockWait::default().as_secs(), 3);
    assert_eq!(LockWait::seconds(0).expect("zero"), LockWait::no_wait());
    assert_eq!(LockWait::try_from(7_i64).expect("seven").as_duration(), Duration::from_secs(7));
    assert!(matches!(LockWait::seconds(-1), Err(Error::InvalidArgument(_))));
}

// =========================================================================
// ObjectLock
// =========================================================================

#[test]
fn test_object_lock_acquire_and_release() {
    // Arrange
    let fx = Fixture::new();
    let store: Arc<dyn Store> = fx.store.clone();

    // Act
    let lock = ObjectLock::acquire(
        store,
        fx.clock.as_ref(),
        "lock".to_string(),
        "salt",
        5,
        LockWait::no_wait(),
        Duration::from_millis(10),
    )
    .expect("acquire");

    // Assert
    assert_eq!(fx.store.ttl("lock").expect("ttl"), 5);
    assert_eq!(lock.key(), "lock");
    lock.release().expect("release");
    assert!(!fx.store.exists("lock").expect("exists"));
}

#[test]
fn test_object_lock_drop_releases_key() {
    let fx = Fixture::new();
    let store: Arc<dyn Store> = fx.store.clone();

    {
        let _lock = ObjectLock::acquire(
            store,
            fx.clock.as_ref(),
            "lock".to_string(),
            "salt",
            5,
            LockWait::no_wait(),
            Duration::from_millis(10),
        )
        .expect("acquire");
    }

    assert!(!fx.store.exists("lock").expect("exists"));
}

#[test]
fn test_zero_wait_makes_one_attempt() {
    // Arrange
    let fx = Fixture::new();
    let lock_key = fx.group.namespace().object_lock_key("salt");
    fx.store.set_nx_ex(&lock_key, "1", 60).expect("hold");
    let before = fx.clock.now();

    // Act
    let result = fx
        .group
        .add_object_to_index("salt", "recipe", ["dinner"], LockWait::no_wait());

    // Assert
    assert!(matches!(result, Err(Error::LockedObject { timeout_secs: 0, .. })));
    assert_eq!(fx.clock.now(), before);
}

#[test]
fn test_lock_timeout_leaves_foreign_lock_in_place() {
    let fx = Fixture::new();
    let lock_key = fx.group.namespace().object_lock_key("salt");
    fx.store.set_nx_ex(&lock_key, "1", 60).expect("hold");

    let result = fx
        .group
        .remove_object_from_index("salt", "recipe", LockWait::from_secs(1));

    assert!(matches!(result, Err(Error::LockedObject { .. })));
    assert!(fx.store.exists(&lock_key).expect("exists"));
}

#[test]
fn test_unbounded_wait_polls_until_lock_expires() {
    // Arrange
    let fx = Fixture::new();
    let lock_key = fx.group.namespace().object_lock_key("salt");
    fx.store.set_nx_ex(&lock_key, "1", 1).expect("hold");
    let wait = LockWait::seconds(i64::MAX).expect("wait");

    // Act
    let result = fx.group.add_object_to_index("salt", "recipe", ["dinner"], wait);

    // Assert
    assert!(result.is_ok());
    assert!(fx.group.is_object_in_index("salt", "recipe").expect("in index"));
    fx.group
        .remove_object_from_index("salt", "recipe", LockWait::from_secs(u64::MAX))
        .expect("remove");
}

// =========================================================================
// Mutations
// =========================================================================

#[test]
fn test_add_object_writes_map_and_sets() {
    // Arrange
    let fx = Fixture::new();

    // Act
    fx.group
        .add_object_to_index("salt", "recipe", ["dinner", "dessert", "dinner"], LockWait::default())
        .expect("add");

    // Assert
    assert_eq!(
        fx.store.hget("foi:food:obj:salt:map", "recipe").expect("hget"),
        Some(r#"["dinner","dessert"]"#.to_string())
    );
    assert_eq!(fx.members("foi:food:idx:recipe:g"), vec!["salt"]);
    assert_eq!(fx.members("foi:food:idx:recipe:f:dinner"), vec!["salt"]);
    assert_eq!(fx.members("foi:food:idx:recipe:f:dessert"), vec!["salt"]);
    assert!(!fx.store.exists("foi:food:obj:salt:lock").expect("lock"));
}

#[test]
fn test_add_object_replaces_previous_filters() {
    let fx = Fixture::new();
    let wait = LockWait::default();
    fx.group
        .add_object_to_index("salt", "recipe", ["dinner", "dessert"], wait)
        .expect("first");

    fx.group
        .add_object_to_index("salt", "recipe", ["dessert", "snack"], wait)
        .expect("second");

    assert!(!fx.store.exists("foi:food:idx:recipe:f:dinner").expect("dinner"));
    assert_eq!(fx.members("foi:food:idx:recipe:f:dessert"), vec!["salt"]);
    assert_eq!(fx.members("foi:food:idx:recipe:f:snack"), vec!["salt"]);
    assert_eq!(
        fx.group.get_object_filters("salt", "recipe").expect("filters"),
        Some(vec!["dessert".to_string(), "snack".to_string()])
    );
}

#[test]
fn test_add_object_without_filters() {
    let fx = Fixture::new();

    fx.group
        .add_object_to_index("salt", "pantry", NO_FILTERS, LockWait::default())
        .expect("add");

    assert!(fx.group.is_object_in_index("salt", "pantry").expect("in"));
    assert_eq!(fx.group.get_object_filters("salt", "pantry").expect("filters"), Some(vec![]));
    assert_eq!(fx.group.count_objects_in_index("pantry").expect("count"), 1);
}

#[test]
fn test_remove_object_from_index() {
    // Arrange
    let fx = Fixture::new();
    fx.recipes();

    // Act
    let removed = fx
        .group
        .remove_object_from_index("salt", "recipe", LockWait::default())
        .expect("remove");

    // Assert
    assert!(removed);
    assert!(!fx.group.is_object_in_index("salt", "recipe").expect("in"));
    assert_eq!(fx.members("foi:food:idx:recipe:g"), vec!["apple", "carrot"]);
    assert_eq!(fx.members("foi:food:idx:recipe:f:dinner"), vec!["carrot"]);
    assert_eq!(fx.members("foi:food:idx:recipe:f:dessert"), vec!["apple"]);
    assert!(!fx.store.exists("foi:food:obj:salt:map").expect("map"));
}

#[test]
fn test_remove_missing_object_is_noop() {
    let fx = Fixture::new();
    fx.recipes();
    let keys_before = fx.store.key_count();

    let removed = fx
        .group
        .remove_object_from_index("pepper", "recipe", LockWait::default())
        .expect("remove");

    assert!(!removed);
    assert_eq!(fx.store.key_count(), keys_before);
}

#[test]
fn test_remove_object_from_all_indexes() {
    let fx = Fixture::new();
    let wait = LockWait::default();
    fx.group.add_object_to_index("salt", "recipe", ["dinner"], wait).expect("recipe");
    fx.group.add_object_to_index("salt", "pantry", ["spice"], wait).expect("pantry");

    let removed = fx.group.remove_object_from_all_indexes("salt", wait).expect("remove");

    assert_eq!(removed, vec!["pantry", "recipe"]);
    assert!(fx.group.get_indexes_with_object("salt").expect("indexes").is_empty());
    assert_eq!(fx.store.key_count(), 0);
    assert!(fx
        .group
        .remove_object_from_all_indexes("salt", wait)
        .expect("again")
        .is_empty());
}

#[test]
fn test_move_object_to_other_index() {
    // Arrange
    let fx = Fixture::new();
    let wait = LockWait::default();
    fx.group.add_object_to_index("salt", "pantry", ["spice"], wait).expect("pantry");

    // Act
    let removed = fx
        .group
        .move_object_to_index("salt", "recipe", ["dinner"], wait)
        .expect("move");

    // Assert
    assert_eq!(removed, vec!["pantry"]);
    assert_eq!(fx.group.get_indexes_with_object("salt").expect("indexes"), vec!["recipe"]);
    assert!(!fx.store.exists("foi:food:idx:pantry:g").expect("pantry"));
    assert!(!fx.store.exists("foi:food:idx:pantry:f:spice").expect("spice"));
    assert_eq!(fx.members("foi:food:idx:recipe:f:dinner"), vec!["salt"]);
}

#[test]
fn test_move_object_within_same_index_reports_nothing() {
    let fx = Fixture::new();
    let wait = LockWait::default();
    fx.group.add_object_to_index("salt", "recipe", ["dinner"], wait).expect("add");

    let removed = fx
        .group
        .move_object_to_index("salt", "recipe", ["dessert"], wait)
        .expect("move");

    assert!(removed.is_empty());
    assert_eq!(
        fx.group.get_object_filters("salt", "recipe").expect("filters"),
        Some(vec!["dessert".to_string()])
    );
    assert!(!fx.store.exists("foi:food:idx:recipe:f:dinner").expect("dinner"));
    assert_eq!(fx.members("foi:food:idx:recipe:f:dessert"), vec!["salt"]);
}

#[test]
fn test_move_unindexed_object() {
    let fx = Fixture::new();

    let removed = fx
        .group
        .move_object_to_index("salt", "recipe", ["dinner"], LockWait::default())
        .expect("move");

    assert!(removed.is_empty());
    assert!(fx.group.is_object_in_index("salt", "recipe").expect("in"));
}

#[test]
fn test_corrupt_map_entry_is_fatal() {
    // Arrange
    let fx = Fixture::new();
    fx.store
        .execute(&Command::HSet {
            key: "foi:food:obj:salt:map".into(),
            field: "recipe".into(),
            value: "{not json".into(),
        })
        .expect("hset");

    // Act
    let result = fx
        .group
        .add_object_to_index("salt", "recipe", ["dinner"], LockWait::default());

    // Assert
    let err = result.expect_err("corrupt");
    assert!(matches!(err, Error::CorruptIndexMap { .. }));
    assert!(!err.is_retryable());
    assert!(!fx.store.exists("foi:food:obj:salt:lock").expect("lock released"));
    assert!(!fx.store.exists("foi:food:idx:recipe:g").expect("no partial write"));
}

#[test]
fn test_tenant_namespace_prefixes_keys() {
    let fx = Fixture::with_tenant(Some("acme"));

    fx.group
        .add_object_to_index("salt", "recipe", ["dinner"], LockWait::default())
        .expect("add");

    assert!(fx.store.exists("foi:acme:food:obj:salt:map").expect("map"));
    assert!(fx.store.exists("foi:acme:food:idx:recipe:f:dinner").expect("filter"));
    assert!(!fx.store.exists("foi:food:obj:salt:map").expect("untenanted"));
}

#[test]
fn test_invalid_group_configuration() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    assert!(IndexGroup::new("", store.clone(), IndexGroupOptions::default()).is_err());
    assert!(IndexGroup::new("fo:od", store.clone(), IndexGroupOptions::default()).is_err());
    let options = IndexGroupOptions {
        object_lock_ttl: 0,
        ..IndexGroupOptions::default()
    };
    assert!(matches!(
        IndexGroup::new("food", store.clone(), options),
        Err(Error::InvalidArgument(_))
    ));
    let options = IndexGroupOptions {
        temporary_key_ttl: 0,
        ..IndexGroupOptions::default()
    };
    assert!(matches!(
        IndexGroup::new("food", store, options),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_short_temporary_ttl_keeps_grouped_queries_intact() {
    // Arrange
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let options = IndexGroupOptions {
        temporary_key_ttl: 1,
        ..IndexGroupOptions::default()
    };
    let group = IndexGroup::new("food", store, options)
        .expect("group")
        .with_clock(clock);
    group
        .add_object_to_index("salt", "recipe", ["dinner", "dessert"], LockWait::default())
        .expect("add");
    let query = FilterQuery::new()
        .with_group(["dinner", "vegetable"])
        .and_then(|q| q.with_group(["dessert", "fruit"]))
        .expect("query");

    // Act
    let lazy = group.create_set_for_query("recipe", &query).expect("set");
    let direct = group.get_objects_in_index("recipe", &query).expect("direct");

    // Assert
    assert_eq!(lazy.object_ids().expect("ids"), ["salt"]);
    assert_eq!(direct, ["salt"]);
}

// =========================================================================
// Flush
// =========================================================================

#[test]
fn test_flush_index_only_touches_that_index() {
    // Arrange
    let fx = Fixture::new();
    fx.recipes();
    fx.group
        .add_object_to_index("salt", "pantry", ["spice"], LockWait::default())
        .expect("pantry");

    // Act
    let deleted = fx.group.flush_index("recipe").expect("flush");

    // Assert
    // global set plus dinner, dessert, vegetable and fruit
    assert_eq!(deleted, 5);
    assert_eq!(fx.group.count_objects_in_index("recipe").expect("count"), 0);
    assert_eq!(fx.group.count_objects_in_index("pantry").expect("count"), 1);
}

#[test]
fn test_flush_all_indexes_leaves_other_groups() {
    let fx = Fixture::new();
    fx.recipes();
    let other = IndexGroup::new("drinks", fx.store.clone(), IndexGroupOptions::default())
        .expect("group")
        .with_clock(fx.clock.clone());
    other
        .add_object_to_index("tea", "menu", ["hot"], LockWait::default())
        .expect("tea");

    fx.group.flush_all_indexes().expect("flush");

    assert!(fx.store.scan_keys("foi:food:*").expect("scan").is_empty());
    assert!(other.is_object_in_index("tea", "menu").expect("tea"));
}

// =========================================================================
// Query compilation
// =========================================================================

#[test]
fn test_query_without_groups_is_global_set() {
    let fx = Fixture::new();
    fx.recipes();

    let set = fx.group.create_set_for_query("recipe", &FilterQuery::new()).expect("set");

    assert!(matches!(&set, SetExpr::Stored(s) if s.key() == "foi:food:idx:recipe:g"));
    assert_eq!(set.object_ids().expect("ids"), vec!["apple", "carrot", "salt"]);
}

#[test]
fn test_query_with_one_group_is_union() {
    let fx = Fixture::new();
    fx.recipes();
    let query = FilterQuery::new().with_group(["vegetable", "fruit"]).expect("query");

    let set = fx.group.create_set_for_query("recipe", &query).expect("set");

    assert!(matches!(&set, SetExpr::Computed(c) if c.included_sets().len() == 2));
    assert_eq!(set.object_ids().expect("ids"), vec!["apple", "carrot"]);
}

#[test]
fn test_query_with_groups_unwraps_single_filters() {
    // Arrange
    let fx = Fixture::new();
    fx.recipes();
    let query = FilterQuery::new()
        .with_group(["dinner", "vegetable"])
        .expect("group")
        .with_group(["dessert"])
        .expect("group");

    // Act
    let set = fx.group.create_set_for_query("recipe", &query).expect("set");

    // Assert
    let SetExpr::Computed(intersection) = &set else {
        panic!("expected computed set");
    };
    assert_eq!(intersection.operation(), crate::set::SetOperation::Intersection);
    assert!(matches!(intersection.included_sets()[0], SetExpr::Computed(_)));
    assert!(matches!(intersection.included_sets()[1], SetExpr::Stored(_)));
    assert_eq!(set.object_ids().expect("ids"), vec!["salt"]);
}

#[test]
fn test_direct_query_paths_agree_with_lazy_sets() {
    let fx = Fixture::new();
    fx.recipes();
    let queries = [
        FilterQuery::new(),
        FilterQuery::new().with_group(["dinner"]).expect("q"),
        FilterQuery::new()
            .with_group(["dinner", "vegetable"])
            .expect("q")
            .with_group(["dessert", "fruit"])
            .expect("q"),
        FilterQuery::new()
            .with_group(["dessert"])
            .expect("q")
            .with_group(["fruit"])
            .expect("q"),
    ];

    for query in &queries {
        let direct = fx.group.get_objects_in_index("recipe", query).expect("direct");
        let lazy = fx.group.create_set_for_query("recipe", query).expect("lazy");
        assert_eq!(direct, lazy.object_ids().expect("ids"), "query {query:?}");
    }
}

#[test]
fn test_direct_query_deletes_throwaway_keys() {
    let fx = Fixture::new();
    fx.recipes();
    let keys_before = fx.store.key_count();
    let query = FilterQuery::new()
        .with_group(["dinner", "vegetable"])
        .expect("q")
        .with_group(["dessert", "fruit"])
        .expect("q");

    let ids = fx.group.get_objects_in_index("recipe", &query).expect("ids");

    assert_eq!(ids, vec!["salt"]);
    assert_eq!(fx.store.key_count(), keys_before);
}

#[test]
fn test_set_builders_share_group_context() {
    let fx = Fixture::new();
    fx.recipes();

    let dinner_or_fruit = fx
        .group
        .create_union_of_index_filters("recipe", &["dinner", "fruit"])
        .expect("union");
    let dinner_and_dessert = fx
        .group
        .create_intersection_of_index_filters("recipe", &["dinner", "dessert"])
        .expect("inter");
    let global = fx.group.get_index_global_set("recipe");

    assert_eq!(dinner_or_fruit.count().expect("count"), 3);
    assert_eq!(dinner_and_dessert.object_ids().expect("ids"), vec!["salt"]);
    assert_eq!(global.count().expect("count"), 3);
    assert!(fx.group.create_union().object_ids().is_err());
    assert!(fx
        .group
        .get_index_filter_set("recipe", "fruit")
        .has_object("apple")
        .expect("has"));
}
