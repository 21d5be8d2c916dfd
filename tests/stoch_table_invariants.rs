use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use stoch_trellis::{ModelBuilder, StateSpec, StochError, StochTable, Trellis, ValueKind};

/// Fully connected layers: `weights[p][s][prev]`, position 0 uses `prev = 0`
/// as the INIT weight. Cells whose weights are all absent stay unreachable.
fn layered(weights: &[Vec<Vec<Option<f64>>>]) -> (StochTable, Vec<Vec<bool>>) {
    let states = weights[0].len();
    let mut table = StochTable::new();
    let mut reachable = vec![vec![false; states]; weights.len()];
    for (s, w) in weights[0].iter().enumerate() {
        if let Some(w) = w[0] {
            table.push(0, s, None, w).unwrap();
            reachable[0][s] = true;
        }
    }
    for p in 1..weights.len() {
        for s in 0..states {
            for prev in 0..states {
                if !reachable[p - 1][prev] {
                    continue;
                }
                if let Some(w) = weights[p][s][prev] {
                    table.push(p, s, Some(prev), w).unwrap();
                    reachable[p][s] = true;
                }
            }
        }
    }
    let last = weights.len() - 1;
    for s in 0..states {
        if reachable[last][s] {
            table.push(weights.len(), states, Some(s), 0.0).unwrap();
        }
    }
    (table, reachable)
}

fn layer_weights() -> impl Strategy<Value = Vec<Vec<Vec<Option<f64>>>>> {
    (1usize..5, 1usize..4).prop_flat_map(|(positions, states)| {
        prop::collection::vec(
            prop::collection::vec(
                prop::collection::vec(prop::option::weighted(0.7, -6.0f64..0.0), states),
                states,
            ),
            positions,
        )
    })
}

proptest! {
    #[test]
    fn groups_are_distributions(weights in layer_weights()) {
        let (mut table, reachable) = layered(&weights);
        prop_assume!(reachable[weights.len() - 1].iter().any(|&r| r));
        table.finalize().unwrap();
        for pos in 0..table.bucket_count() {
            for (_, entries) in table.groups(pos) {
                let sum: f64 = entries.iter().map(|e| e.prob).sum();
                prop_assert!((sum - 1.0).abs() < 1e-9);
                prop_assert!(entries.iter().all(|e| (0.0..=1.0).contains(&e.prob)));
            }
        }
        prop_assert_eq!(table.groups(weights.len()).count(), 1);
    }

    #[test]
    fn sampled_steps_were_pushed(weights in layer_weights(), seed in any::<u64>()) {
        let (mut table, reachable) = layered(&weights);
        prop_assume!(reachable[weights.len() - 1].iter().any(|&r| r));
        table.finalize().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            let mut path = Vec::new();
            table.traceback(&mut rng, &mut path).unwrap();
            // Vec receives states last position first.
            path.reverse();
            prop_assert_eq!(path.len(), weights.len());
            prop_assert!(weights[0][path[0]][0].is_some());
            for p in 1..path.len() {
                prop_assert!(weights[p][path[p]][path[p - 1]].is_some());
            }
        }
    }
}

#[test]
fn sweep_tables_are_normalized_per_cell() {
    let model = ModelBuilder::new(2)
        .init_transition("Hot", ValueKind::Probability, 0.8)
        .init_transition("Cold", ValueKind::Probability, 0.2)
        .state(
            StateSpec::new("Hot")
                .transition("Hot", ValueKind::Probability, 0.6)
                .transition("Cold", ValueKind::Probability, 0.4)
                .emission(ValueKind::Probability, vec![0.2, 0.8]),
        )
        .state(
            StateSpec::new("Cold")
                .transition("Hot", ValueKind::Probability, 0.5)
                .transition("Cold", ValueKind::Probability, 0.5)
                .emission(ValueKind::Probability, vec![0.5, 0.5]),
        )
        .build()
        .unwrap();
    let seq = vec![1usize, 0, 1, 1, 0];
    let mut t = Trellis::new(&model, &seq).unwrap();
    t.stochastic_forward().unwrap();
    let table = t.stoch_table().unwrap();
    assert_eq!(table.bucket_count(), seq.len() + 1);
    for pos in 0..table.bucket_count() {
        let mut groups = 0;
        for (state, entries) in table.groups(pos) {
            groups += 1;
            let sum: f64 = entries.iter().map(|e| e.prob).sum();
            assert!((sum - 1.0).abs() < 1e-9, "({pos}, {state}) sums to {sum}");
        }
        let expected = if pos == seq.len() { 1 } else { 2 };
        assert_eq!(groups, expected);
    }
}

#[test]
fn lifecycle_errors_are_typed() {
    let mut table = StochTable::new();
    table.push(1, 0, Some(0), -1.0).unwrap();
    assert_eq!(
        table.push(0, 0, None, -1.0),
        Err(StochError::PositionOrder {
            position: 0,
            current: 1
        })
    );
    let mut rng = StdRng::seed_from_u64(0);
    let mut path = Vec::new();
    assert_eq!(
        table.traceback(&mut rng, &mut path),
        Err(StochError::NotFinalized)
    );
    // Position 0 was skipped, so state 0's predecessor cannot be found.
    assert!(matches!(
        table.finalize(),
        Err(StochError::MissingPredecessor { position: 1, prev: 0 })
    ));
}
