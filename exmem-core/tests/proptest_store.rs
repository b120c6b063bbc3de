//! Property-Based Tests for exmem Core
//!
//! Uses `proptest` to check store and statistics invariants under random
//! stores, decay rates and seeds.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use exmem_core::corpus::Corpus;
use exmem_core::sampler::ModelKind;
use exmem_core::simulation::{Phase, Simulation};
use exmem_core::stats::{GroupTracker, VarianceForm};
use exmem_core::store::ExemplarStore;
use exmem_core::{DecaySchedule, SimulationConfig, STRENGTH_THRESHOLD};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// One-decimal values, the only kind a running simulation produces.
fn arb_value() -> impl Strategy<Value = f64> {
    (-50i32..50).prop_map(|tenths| f64::from(tenths) / 10.0)
}

fn arb_store(max_strength: f64) -> impl Strategy<Value = ExemplarStore> {
    prop::collection::vec(
        (arb_value(), prop::collection::vec(1e-9..max_strength, 1..6)),
        1..8,
    )
    .prop_map(|traces| {
        let mut store = ExemplarStore::new();
        for (value, strengths) in traces {
            store.insert_trace(value, &strengths);
        }
        store
    })
}

fn is_ascending(list: &[f64]) -> bool {
    list.windows(2).all(|w| w[0] <= w[1])
}

// ---------------------------------------------------------------------------
// Property: Decay shrinks every strength and keeps lists sorted
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn decay_is_monotone_and_order_preserving(
        store in arb_store(1.0),
        rate in 0.01..0.999f64,
    ) {
        let before: Vec<(f64, Vec<f64>)> =
            store.traces().map(|(v, s)| (v, s.to_vec())).collect();
        let mut decayed = store.clone();
        decayed.decay(rate);

        prop_assert_eq!(decayed.len(), store.len());
        for ((value, old), (new_value, new)) in before.iter().zip(decayed.traces()) {
            prop_assert_eq!(*value, new_value);
            prop_assert!(is_ascending(new));
            for (o, n) in old.iter().zip(new) {
                prop_assert!(n < o);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: Pruning removes exactly the weak entries, never all of them
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prune_keeps_store_non_empty(store in arb_store(1e-5)) {
        let strongest = store.strongest();
        let before = store.entry_count();
        let mut pruned = store.clone();
        let report = pruned.prune_weak();

        prop_assert!(!pruned.is_empty());
        prop_assert_eq!(pruned.entry_count() + report.removed, before);

        if report.resurrected {
            prop_assert_eq!(pruned.entry_count(), 1);
            prop_assert_eq!(pruned.strongest(), strongest);
        } else {
            for (_, list) in pruned.traces() {
                prop_assert!(list.iter().all(|&s| s > STRENGTH_THRESHOLD));
            }
        }
    }

    #[test]
    fn prune_leaves_strong_entries_untouched(store in arb_store(1.0)) {
        let strong_before: Vec<(f64, Vec<f64>)> = store
            .traces()
            .map(|(v, s)| (v, s.iter().copied().filter(|&x| x > STRENGTH_THRESHOLD).collect()))
            .filter(|(_, s): &(f64, Vec<f64>)| !s.is_empty())
            .collect();
        let mut pruned = store.clone();
        let report = pruned.prune_weak();

        if !strong_before.is_empty() {
            prop_assert!(!report.resurrected);
            let after: Vec<(f64, Vec<f64>)> =
                pruned.traces().map(|(v, s)| (v, s.to_vec())).collect();
            prop_assert_eq!(after, strong_before);
        }
    }
}

// ---------------------------------------------------------------------------
// Property: Weighted sampling only returns stored values
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn weighted_sample_returns_a_stored_value(store in arb_store(1.0), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..16 {
            let value = store.weighted_sample(&mut rng);
            prop_assert!(value.is_some());
            prop_assert!(store.strengths(value.unwrap_or(f64::NAN)).is_some());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: Incremental statistics track a full recomputation
// ---------------------------------------------------------------------------

fn small_corpus() -> Corpus {
    Corpus::from_json_str(
        r#"{
            "a": {"frequency": 1,  "exemplars": [1.0, 2.0]},
            "b": {"frequency": 3,  "exemplars": {"0.5": [0.6, 0.9]}},
            "c": {"frequency": 8,  "exemplars": [4.0]},
            "d": {"frequency": 12, "exemplars": {"2.5": [1.0], "3.5": [0.7]}}
        }"#,
    )
    .expect("valid corpus")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn incremental_tracks_recompute(
        seed in any::<u64>(),
        rate in 0.8..0.999f64,
        advancement in prop::sample::select(vec![0.0, 0.1, -0.1]),
        steps in 1u64..300,
        raw in any::<bool>(),
    ) {
        // Fast rates prune within a few dozen steps; forgotten mass keeps
        // the tracker exact either way.
        let form = if raw { VarianceForm::RawMoment } else { VarianceForm::Recentered };
        let config = SimulationConfig {
            decay: DecaySchedule::Rate { rate },
            advancement,
            iterations: steps,
            save_every: 10,
            burn_in: false,
            variance_form: form,
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::load(&small_corpus(), config, seed).expect("loads");
        sim.execute().expect("runs");
        prop_assert_eq!(sim.phase(), Phase::Done);

        let tracker = sim.tracker().expect("seeded");
        let reference = GroupTracker::recompute(sim.population(), form);
        let d = tracker.divergence(&reference);
        prop_assert!(d.mean <= 1e-9, "mean divergence {}", d.mean);
        prop_assert!(d.variance <= 1e-6, "variance divergence {}", d.variance);
    }

    #[test]
    fn overwrite_tracks_recompute(
        seed in any::<u64>(),
        advancement in prop::sample::select(vec![0.0, 0.1, -0.1]),
        steps in 1u64..300,
        raw in any::<bool>(),
    ) {
        let form = if raw { VarianceForm::RawMoment } else { VarianceForm::Recentered };
        let corpus = Corpus::from_json_str(
            r#"{
                "a": {"frequency": 1,  "exemplars": [1.0, 2.0]},
                "b": {"frequency": 3,  "exemplars": [0.5, 0.5, 4.5]},
                "c": {"frequency": 8,  "exemplars": [4.0]},
                "d": {"frequency": 12, "exemplars": [2.5, 3.5]}
            }"#,
        )
        .expect("valid corpus");
        let config = SimulationConfig {
            model: ModelKind::Overwrite,
            advancement,
            iterations: steps,
            save_every: 10,
            variance_form: form,
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::load(&corpus, config, seed).expect("loads");
        sim.execute().expect("runs");
        prop_assert_eq!(sim.population().entry_count(), 8);

        let tracker = sim.tracker().expect("seeded");
        let reference = GroupTracker::recompute(sim.population(), form);
        let d = tracker.divergence(&reference);
        prop_assert!(d.mean <= 1e-9, "mean divergence {}", d.mean);
        prop_assert!(d.variance <= 1e-6, "variance divergence {}", d.variance);
    }

    #[test]
    fn same_seed_same_history(seed in any::<u64>()) {
        let config = SimulationConfig {
            decay: DecaySchedule::Rate { rate: 0.9 },
            iterations: 100,
            save_every: 5,
            ..SimulationConfig::default()
        };
        let run = || {
            let mut sim = Simulation::load(&small_corpus(), config.clone(), seed).expect("loads");
            sim.execute().expect("runs");
            sim.finish().expect("done")
        };
        let a = run();
        let b = run();
        prop_assert_eq!(a.time_series, b.time_series);
        prop_assert_eq!(a.final_corpus, b.final_corpus);
    }
}
