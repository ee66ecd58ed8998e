//! Integration tests across the record store, horizon and state bridge:
//! store → sync → recall → persist → reload.

use hz_core::time::SECS_PER_HOUR;
use hz_core::{
    BridgeConfig, BridgeSnapshot, CURVATURE_FLOOR, Depth, DimensionSpec, Horizon, HorizonParams,
    HorizonSnapshot, LinkOptions, RecordStore, RecordType, StateBridge, parse_record_file,
    render_record_file,
};
use proptest::prelude::*;

const N: usize = 4;
const NOW: f64 = 1_700_000_000.0;

fn seeded_store() -> RecordStore {
    let mut store = RecordStore::new(N);
    let entries: [(&str, [f64; N], f64); 6] = [
        ("the harbor at first light", [0.9, 0.1, 0.0, 0.0], 0.95),
        ("a letter that never arrived", [0.1, 0.8, 0.1, 0.0], 0.7),
        ("tea going cold on the sill", [0.0, 0.2, 0.8, 0.0], 0.4),
        ("rain against the window", [0.0, 0.0, 0.3, 0.7], 0.3),
        ("a borrowed coat", [0.4, 0.4, 0.1, 0.1], 0.65),
        ("the smell of cut grass", [0.2, 0.0, 0.1, 0.7], 0.92),
    ];
    for (i, (content, vector, weight)) in entries.into_iter().enumerate() {
        store
            .store_at(
                content,
                vector.to_vec(),
                RecordType::Dialog,
                weight,
                LinkOptions::default(),
                NOW - 3600.0 * i as f64,
            )
            .unwrap();
    }
    store
}

fn ranking(horizon: &mut Horizon, vector: &[f64]) -> Vec<String> {
    horizon
        .recall_at("what do I remember of mornings", vector, 10, 2.0, NOW)
        .into_iter()
        .map(|h| h.id)
        .collect()
}

/// The three-record depth scenario: weights file into depths, the shallow
/// record attaches to its most similar parent, and a query on the deep
/// record's vector brings it back first.
#[test]
fn depth_scenario() {
    let mut store = RecordStore::new(N);
    let deep = store
        .store_at(
            "an anchor memory",
            vec![1.0, 0.0, 0.0, 0.1],
            RecordType::Dialog,
            0.95,
            LinkOptions::default(),
            NOW,
        )
        .unwrap();
    let middle = store
        .store_at(
            "a working note",
            vec![0.1, 1.0, 0.0, 0.0],
            RecordType::Dialog,
            0.7,
            LinkOptions::default(),
            NOW,
        )
        .unwrap();
    let shallow = store
        .store_at(
            "a passing remark",
            vec![0.2, 0.9, 0.1, 0.0],
            RecordType::Dialog,
            0.4,
            LinkOptions::default(),
            NOW,
        )
        .unwrap();

    assert_eq!(store.get(&deep).unwrap().depth(), Depth::Deep);
    assert_eq!(store.get(&middle).unwrap().depth(), Depth::Middle);
    assert_eq!(store.get(&shallow).unwrap().depth(), Depth::Surface);
    assert_eq!(
        store.get(&shallow).unwrap().fractal.parent_id.as_deref(),
        Some(middle.as_str())
    );
    assert!(store.get(&middle).unwrap().fractal.children_ids.contains(&shallow));

    let mut horizon = Horizon::new(N, HorizonParams::default());
    horizon.sync_all(&store, NOW);
    let hits = horizon.recall_at("what anchors me", &[1.0, 0.0, 0.0, 0.1], 3, 1.0, NOW);
    assert_eq!(hits[0].id, deep);
}

#[test]
fn wrong_length_store_leaves_no_trace() {
    let mut store = seeded_store();
    let before = store.stats();
    assert!(
        store
            .store_at(
                "too short",
                vec![1.0, 0.0],
                RecordType::Dialog,
                0.5,
                LinkOptions::default(),
                NOW,
            )
            .is_err()
    );
    assert_eq!(store.stats(), before);
}

/// Save and reload both the record file and the horizon snapshot after any
/// number of recalls; the next resonance ranking for a fixed query must be
/// the same from the live horizon and from the reloaded one.
#[test]
fn roundtrip_preserves_ranking() {
    let store = seeded_store();
    let mut horizon = Horizon::new(N, HorizonParams::default());
    horizon.sync_all(&store, NOW);
    horizon.reinforce(store.iter().nth(3).unwrap().id.as_str(), 0.5).unwrap();
    let query = [0.5, 0.2, 0.2, 0.1];

    for recalls in 0..30 {
        let text = render_record_file(&store, NOW).unwrap();
        let snapshot_json = serde_json::to_string(&horizon.snapshot(NOW)).unwrap();

        let (reloaded, report) = parse_record_file(&text, N);
        assert!(report.skipped.is_empty());
        assert_eq!(reloaded.len(), store.len());
        for record in store.iter() {
            let other = reloaded.get(&record.id).unwrap();
            assert_eq!(other.content, record.content);
            assert_eq!(other.weight, record.weight);
            assert_eq!(other.depth(), record.depth());
            assert_eq!(other.fractal.parent_id, record.fractal.parent_id);
            assert_eq!(other.resonance.linked_ids, record.resonance.linked_ids);
        }

        let snapshot: HorizonSnapshot = serde_json::from_str(&snapshot_json).unwrap();
        let mut restored = Horizon::new(N, HorizonParams::default());
        restored.restore(snapshot, &reloaded);
        restored.sync_all(&reloaded, NOW);

        let live = ranking(&mut horizon, &query);
        assert!(!live.is_empty());
        assert_eq!(ranking(&mut restored, &query), live, "after {recalls} recalls");
    }
}

/// The horizon is a derived cache: store and forget are invisible to it
/// until the host resyncs.
#[test]
fn horizon_requires_explicit_resync() {
    let mut store = seeded_store();
    let mut horizon = Horizon::new(N, HorizonParams::default());
    horizon.sync_all(&store, NOW);
    assert_eq!(horizon.len(), store.len());

    let added = store
        .store_at(
            "a late arrival",
            vec![0.0, 0.0, 0.0, 1.0],
            RecordType::Read,
            0.8,
            LinkOptions::none(),
            NOW,
        )
        .unwrap();
    assert!(!horizon.contains(&added));

    let forgotten = store.iter().next().unwrap().id.clone();
    store.forget(&forgotten).unwrap();
    assert!(horizon.contains(&forgotten));
    let stale = horizon.recall_at("harbor", &[0.9, 0.1, 0.0, 0.0], 10, 5.0, NOW);
    assert!(stale.iter().any(|h| h.id == forgotten));

    horizon.sync_all(&store, NOW);
    assert!(horizon.contains(&added));
    assert!(!horizon.contains(&forgotten));
    assert_eq!(horizon.len(), store.len());
}

/// Regression: reinforcing one memory over and over must stop at the
/// floor instead of letting it swallow every recall.
#[test]
fn reinforcement_stops_at_floor() {
    let store = seeded_store();
    let mut horizon = Horizon::new(N, HorizonParams::default());
    horizon.sync_all(&store, NOW);
    let favourite = store.iter().nth(3).unwrap().id.clone();

    for _ in 0..1000 {
        let c = horizon.reinforce(&favourite, 0.9).unwrap();
        assert!(c >= CURVATURE_FLOOR);
    }
    assert_eq!(horizon.curvature(&favourite), Some(CURVATURE_FLOOR));

    // A query aimed elsewhere still finds its own match first
    let target = store.iter().next().unwrap().id.clone();
    let hits = horizon.recall_at("the harbor at first light", &[0.9, 0.1, 0.0, 0.0], 3, 1.0, NOW);
    assert_eq!(hits[0].id, target);
}

#[test]
fn combined_recall_rewards_agreement() {
    let store = seeded_store();
    let mut horizon = Horizon::new(N, HorizonParams::default());
    horizon.sync_all(&store, NOW);
    let target = store.iter().next().unwrap().id.clone();

    let hits = horizon.recall_combined_at(
        &store,
        "the harbor at first light",
        &[0.9, 0.1, 0.0, 0.0],
        5,
        2.0,
        0.3,
        NOW,
    );
    let top = &hits[0];
    assert_eq!(top.id, target);
    assert!(top.resonance.is_some() && top.similarity.is_some());
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn bridge_zero_sync_fills_vacuum() {
    let mut bridge = StateBridge::new(BridgeConfig::default());
    bridge.sync_from_external(&[0.0; 8]).unwrap();
    let probabilities = bridge.probabilities();
    let named: f64 = probabilities[..8].iter().sum();
    assert!(bridge.vacuum_probability() > named);
    assert!(bridge.vacuum_probability() > 0.5);
}

/// Ten hours offline: the fast-relaxing dimension moves much further than
/// the slow one.
#[test]
fn bridge_offline_fast_dimension_moves_further() {
    let config = BridgeConfig {
        dimensions: vec![DimensionSpec::volatile("mood"), DimensionSpec::structural("trust")],
        ..Default::default()
    };
    let mut bridge = StateBridge::new(config.clone());
    bridge.sync_from_external(&[0.8, 0.8]).unwrap();
    let before = bridge.external_vector();

    let saved = bridge.to_persisted(NOW);
    let json = serde_json::to_string(&saved).unwrap();
    let snapshot: BridgeSnapshot = serde_json::from_str(&json).unwrap();

    let later = NOW + 10.0 * SECS_PER_HOUR;
    let (reloaded, evolution) = StateBridge::from_persisted(&snapshot, config, later);
    let evolution = evolution.expect("ten hours exceeds the offline threshold");

    let after = reloaded.external_vector();
    let fast_move = (after[0] - before[0]).abs();
    let slow_move = (after[1] - before[1]).abs();
    assert!(fast_move > 5.0 * slow_move, "fast {fast_move} vs slow {slow_move}");
    assert!(evolution.vacuum_after > evolution.vacuum_before);
    assert!((reloaded.total_probability() - 1.0).abs() < 1e-6);
}

proptest! {
    #[test]
    fn bridge_sync_and_offline_conserve_probability(
        values in prop::collection::vec(0.0..1.0f64, 8),
        hours in 0.0..2000.0f64,
        steps in 0usize..6,
    ) {
        let mut bridge = StateBridge::new(BridgeConfig::default());
        bridge.sync_from_external(&values).unwrap();
        prop_assert!((bridge.total_probability() - 1.0).abs() < 1e-6);

        let mut out = vec![0.0; 8];
        for _ in 0..steps {
            bridge.process_interference(0.1, &mut out);
            prop_assert!((bridge.total_probability() - 1.0).abs() < 1e-6);
        }
        bridge.predict_trajectory();

        let snapshot = bridge.to_persisted(NOW);
        let later = NOW + hours * SECS_PER_HOUR;
        let (reloaded, _) = StateBridge::from_persisted(&snapshot, BridgeConfig::default(), later);
        prop_assert!((reloaded.total_probability() - 1.0).abs() < 1e-6);
        prop_assert!(reloaded.external_vector().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn auto_decay_only_raises_shallow_curvature(
        weights in prop::collection::vec(0.0..1.0f64, 1..12),
        age_hours in 0.0..500.0f64,
        factor in 1.01..3.0f64,
    ) {
        let mut store = RecordStore::new(N);
        for (i, w) in weights.iter().enumerate() {
            store
                .store_at(
                    &format!("record {i}"),
                    vec![0.25; N],
                    RecordType::Dialog,
                    *w,
                    LinkOptions::none(),
                    NOW,
                )
                .unwrap();
        }
        let mut horizon = Horizon::new(N, HorizonParams::default());
        horizon.sync_all(&store, NOW);
        let before: Vec<(String, f64)> = store
            .iter()
            .map(|r| (r.id.clone(), horizon.curvature(&r.id).unwrap()))
            .collect();

        let touched = horizon
            .auto_decay(48.0, factor, NOW + age_hours * SECS_PER_HOUR)
            .unwrap();

        for (id, c) in before {
            let after = horizon.curvature(&id).unwrap();
            prop_assert!(after >= c);
            let record = store.get(&id).unwrap();
            if touched.contains(&id) {
                prop_assert_eq!(record.depth(), Depth::Surface);
                prop_assert!(record.weight < 0.5);
                prop_assert!(age_hours > 48.0);
            } else {
                prop_assert_eq!(after, c);
            }
        }
    }
}
