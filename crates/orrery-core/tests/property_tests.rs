//! # Property-Based Tests
//!
//! Random patch sequences over a small planet/moon graph. After every
//! patch, successful or not, the cache must satisfy its invariants.

use orrery_core::{
    Cache, ModelDefinition, Record, RecordAccessor, RecordIdentity, RecordOperation,
    RelationshipDefinition, RelationshipIndex, Schema,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// FIXTURES
// =============================================================================

const PLANETS: usize = 3;
const MOONS: usize = 4;

fn schema() -> Schema {
    let mut models = BTreeMap::new();
    models.insert(
        "planet".to_string(),
        ModelDefinition::new().relationship(
            "moons",
            RelationshipDefinition::has_many("moon")
                .inverse("planet")
                .dependent_remove(),
        ),
    );
    models.insert(
        "moon".to_string(),
        ModelDefinition::new()
            .relationship("planet", RelationshipDefinition::has_one("planet").inverse("moons")),
    );
    Schema::new(models).expect("schema")
}

fn planet(n: usize) -> RecordIdentity {
    RecordIdentity::new("planet", format!("p{n}"))
}

fn moon(n: usize) -> RecordIdentity {
    RecordIdentity::new("moon", format!("m{n}"))
}

fn seeded_cache() -> Cache {
    let mut cache = Cache::new(schema());
    let ops = (0..PLANETS)
        .map(|n| RecordOperation::add_record(Record::new(planet(n))))
        .chain((0..MOONS).map(|n| RecordOperation::add_record(Record::new(moon(n)))))
        .collect();
    cache.patch(ops).expect("seed");
    cache
}

#[derive(Debug, Clone)]
enum Action {
    AddPlanet(usize),
    AddMoon(usize),
    Attach(usize, usize),
    Detach(usize, usize),
    SetPlanet(usize, Option<usize>),
    ReplaceMoons(usize, Vec<usize>),
    RemovePlanet(usize),
    RemoveMoon(usize),
}

impl Action {
    fn into_operation(self) -> RecordOperation {
        match self {
            Self::AddPlanet(p) => RecordOperation::add_record(Record::new(planet(p))),
            Self::AddMoon(m) => RecordOperation::add_record(Record::new(moon(m))),
            Self::Attach(p, m) => RecordOperation::add_to_related_records(planet(p), "moons", moon(m)),
            Self::Detach(p, m) => {
                RecordOperation::remove_from_related_records(planet(p), "moons", moon(m))
            }
            Self::SetPlanet(m, p) => {
                RecordOperation::replace_related_record(moon(m), "planet", p.map(planet))
            }
            Self::ReplaceMoons(p, moons) => RecordOperation::replace_related_records(
                planet(p),
                "moons",
                moons.into_iter().map(moon).collect(),
            ),
            Self::RemovePlanet(p) => RecordOperation::remove_record(planet(p)),
            Self::RemoveMoon(m) => RecordOperation::remove_record(moon(m)),
        }
    }
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..PLANETS).prop_map(Action::AddPlanet),
        (0..MOONS).prop_map(Action::AddMoon),
        (0..PLANETS, 0..MOONS).prop_map(|(p, m)| Action::Attach(p, m)),
        (0..PLANETS, 0..MOONS).prop_map(|(p, m)| Action::Detach(p, m)),
        (0..MOONS, proptest::option::of(0..PLANETS)).prop_map(|(m, p)| Action::SetPlanet(m, p)),
        (0..PLANETS, vec(0..MOONS, 0..3)).prop_map(|(p, ms)| Action::ReplaceMoons(p, ms)),
        (0..PLANETS).prop_map(Action::RemovePlanet),
        (0..MOONS).prop_map(Action::RemoveMoon),
    ]
}

fn patches() -> impl Strategy<Value = Vec<Vec<RecordOperation>>> {
    vec(
        vec(action(), 1..4).prop_map(|actions| {
            actions.into_iter().map(Action::into_operation).collect()
        }),
        1..12,
    )
}

/// Planet/moon pairs that disagree about their relationship.
fn asymmetries(cache: &Cache) -> Vec<(RecordIdentity, RecordIdentity)> {
    let mut found = Vec::new();
    for record in cache.records_of_type("planet") {
        for m in cache.related_records(&record.identity, "moons") {
            if cache.related_record(m, "planet") != Some(&record.identity) {
                found.push((record.identity.clone(), m.clone()));
            }
        }
    }
    for record in cache.records_of_type("moon") {
        let Some(p) = cache.related_record(&record.identity, "planet") else {
            continue;
        };
        if !cache.related_records(p, "moons").contains(&&record.identity) {
            found.push((p.clone(), record.identity.clone()));
        }
    }
    found
}

fn dangling(cache: &Cache) -> usize {
    cache
        .records()
        .flat_map(|record| record.relationships.values())
        .flat_map(|data| data.members())
        .filter(|member| !cache.has_record(member))
        .count()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Both sides of the planet/moon relationship always agree.
    #[test]
    fn inverse_relationships_stay_symmetric(batches in patches()) {
        let mut cache = seeded_cache();
        for ops in batches {
            let _ = cache.patch(ops);
            prop_assert!(asymmetries(&cache).is_empty(), "{:?}", asymmetries(&cache));
        }
    }

    /// The index always equals one rebuilt from the records.
    #[test]
    fn index_mirrors_record_data(batches in patches()) {
        let mut cache = seeded_cache();
        for ops in batches {
            let _ = cache.patch(ops);
            let rebuilt = RelationshipIndex::from_records(cache.records());
            prop_assert!(cache.index().iter().eq(rebuilt.iter()));
        }
    }

    /// No relationship ever names a missing record.
    #[test]
    fn no_dangling_references(batches in patches()) {
        let mut cache = seeded_cache();
        for ops in batches {
            let _ = cache.patch(ops);
            prop_assert_eq!(dangling(&cache), 0);
        }
    }

    /// A failed patch leaves records and index untouched.
    #[test]
    fn failed_patch_has_no_effect(batches in patches()) {
        let mut cache = seeded_cache();
        for ops in batches {
            let records: Vec<Record> = cache.records().cloned().collect();
            let entries: Vec<_> = cache.index().iter().cloned().collect();
            if cache.patch(ops).is_err() {
                prop_assert_eq!(cache.records().cloned().collect::<Vec<_>>(), records);
                prop_assert_eq!(cache.index().iter().cloned().collect::<Vec<_>>(), entries);
            }
        }
    }

    /// Same patches on two caches produce identical applied operations.
    #[test]
    fn patching_is_deterministic(batches in patches()) {
        let mut first = seeded_cache();
        let mut second = seeded_cache();
        for ops in batches {
            let a = first.patch(ops.clone()).ok();
            let b = second.patch(ops).ok();
            prop_assert_eq!(a, b);
        }
        prop_assert_eq!(
            first.records().cloned().collect::<Vec<_>>(),
            second.records().cloned().collect::<Vec<_>>()
        );
    }
}
