use rand::{rngs::StdRng, SeedableRng};
use stoch_trellis::{
    ModelBuilder, StateSpec, SweepMode, Trellis, TrellisBuilder, TrellisError, ValueKind,
};

/// INIT → A → B, B loops and ends. A prefers symbol 0, B symbol 1.
fn linear() -> stoch_trellis::Model {
    ModelBuilder::new(2)
        .init_transition("A", ValueKind::Probability, 1.0)
        .state(
            StateSpec::new("A")
                .transition("B", ValueKind::Probability, 1.0)
                .emission(ValueKind::Probability, vec![0.8, 0.2]),
        )
        .state(
            StateSpec::new("B")
                .transition("B", ValueKind::Probability, 1.0)
                .end(ValueKind::Probability, 1.0)
                .emission(ValueKind::Probability, vec![0.3, 0.7]),
        )
        .build()
        .unwrap()
}

/// Three states with several competing paths.
fn branching() -> stoch_trellis::Model {
    ModelBuilder::new(3)
        .init_transition("X", ValueKind::Probability, 0.5)
        .init_transition("Y", ValueKind::Probability, 0.3)
        .init_transition("Z", ValueKind::Probability, 0.2)
        .state(
            StateSpec::new("X")
                .transition("X", ValueKind::Probability, 0.5)
                .transition("Y", ValueKind::Probability, 0.3)
                .transition("Z", ValueKind::Probability, 0.2)
                .emission(ValueKind::Probability, vec![0.5, 0.3, 0.2]),
        )
        .state(
            StateSpec::new("Y")
                .transition("X", ValueKind::Probability, 0.2)
                .transition("Y", ValueKind::Probability, 0.6)
                .transition("Z", ValueKind::Probability, 0.2)
                .emission(ValueKind::Probability, vec![0.1, 0.6, 0.3]),
        )
        .state(
            StateSpec::new("Z")
                .transition("X", ValueKind::Probability, 0.3)
                .transition("Z", ValueKind::Probability, 0.7)
                .end(ValueKind::Probability, 0.5)
                .emission(ValueKind::Probability, vec![0.2, 0.2, 0.6]),
        )
        .build()
        .unwrap()
}

#[test]
fn linear_model_decodes_the_only_path() {
    let model = linear();
    let seq = vec![0usize, 1, 1, 0];
    let mut t = Trellis::new(&model, &seq).unwrap();
    let score = t.viterbi().unwrap();
    let expected = 0.8f64.ln() + 0.7f64.ln() + 0.7f64.ln() + 0.3f64.ln();
    assert!((score - expected).abs() < 1e-12);
    let path = t.traceback().unwrap();
    assert_eq!(path.states(), &[0, 1, 1, 1]);
    let names = path.labels(|s| model.state(s).name.as_str());
    assert_eq!(names, vec!["A", "B", "B", "B"]);

    t.reset();
    let total = t.forward().unwrap();
    assert!((total - expected).abs() < 1e-12);
}

#[test]
fn linear_model_samples_only_its_path() {
    let model = linear();
    let seq = vec![0usize, 1, 1, 0];
    let mut t = Trellis::new(&model, &seq).unwrap();
    t.stochastic_forward().unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let multi = t.stochastic_tracebacks(&mut rng, 100_000).unwrap();
    assert_eq!(multi.total(), 100_000);
    assert_eq!(multi.distinct(), 1);
    assert_eq!(multi.count(&[0, 1, 1, 1]), 100_000);
}

#[test]
fn sum_sweeps_agree_and_bound_viterbi() {
    let model = branching();
    let seq = vec![0usize, 1, 2, 2, 1, 0, 2];
    let mut t = Trellis::new(&model, &seq).unwrap();
    let vit = t.viterbi().unwrap();
    t.reset();
    let fwd = t.forward().unwrap();
    t.reset();
    let bwd = t.backward().unwrap();
    assert!((fwd - bwd).abs() < 1e-9);
    assert!(fwd >= vit);

    t.reset();
    let total = t.posterior().unwrap();
    assert!((total - fwd).abs() < 1e-12);
    for p in 0..seq.len() {
        let sum: f64 = (0..model.state_count())
            .map(|s| t.posterior_prob(p, s).unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
    // Only Z may end, so the posterior path must finish there.
    let path = t.posterior_path().unwrap();
    assert_eq!(path.states().last(), Some(&2));
}

#[test]
fn stochastic_viterbi_draws_model_transitions() {
    let model = branching();
    let seq = vec![2usize, 1, 0, 1, 2];
    let mut t = Trellis::new(&model, &seq).unwrap();
    t.stochastic_viterbi().unwrap();
    let mut rng = StdRng::seed_from_u64(77);
    for _ in 0..500 {
        let path = t.stochastic_traceback(&mut rng).unwrap();
        let states = path.states();
        assert_eq!(states.len(), seq.len());
        assert!(model.init_score(states[0]).is_finite());
        for pair in states.windows(2) {
            let edge_exists = model
                .state(pair[0])
                .transitions
                .iter()
                .any(|tr| tr.to == pair[1]);
            assert!(edge_exists, "sampled missing edge {pair:?}");
        }
        assert_eq!(states.last(), Some(&2));
        assert!(path.score().unwrap().is_finite());
    }
}

#[test]
fn stochastic_forward_frequencies_match_posterior() {
    let model = branching();
    let seq = vec![0usize, 2, 1];
    let mut t = Trellis::new(&model, &seq).unwrap();
    t.posterior().unwrap();
    let expected: Vec<f64> = (0..model.state_count())
        .map(|s| t.posterior_prob(1, s).unwrap())
        .collect();

    t.reset();
    t.stochastic_forward().unwrap();
    let mut rng = StdRng::seed_from_u64(31);
    let multi = t.stochastic_tracebacks(&mut rng, 40_000).unwrap();
    for (s, want) in expected.iter().enumerate() {
        let got = multi.state_frequency(1, s);
        assert!((got - want).abs() < 0.02, "state {s}: {got} vs {want}");
    }
    let ranked = multi.by_frequency();
    assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn sweep_mode_is_enforced() {
    let model = branching();
    let seq = vec![0usize, 1];
    let mut t = Trellis::new(&model, &seq).unwrap();
    assert!(matches!(t.viterbi_score(), Err(TrellisError::NoSweep)));

    t.forward().unwrap();
    assert!(matches!(
        t.viterbi(),
        Err(TrellisError::SweepInProgress(SweepMode::Forward))
    ));
    assert!(matches!(
        t.traceback(),
        Err(TrellisError::WrongMode {
            found: SweepMode::Forward,
            ..
        })
    ));
    assert!(matches!(
        t.posterior_table(),
        Err(TrellisError::WrongMode { .. })
    ));

    t.reset();
    assert_eq!(t.mode(), None);
    t.nth_viterbi(2).unwrap();
    assert!(matches!(t.forward_score(), Err(TrellisError::WrongMode { .. })));
    assert!(t.traceback().is_ok());
}

#[test]
fn bad_sequences_are_rejected() {
    let model = linear();
    let empty: Vec<usize> = Vec::new();
    assert!(matches!(
        Trellis::new(&model, &empty),
        Err(TrellisError::EmptySequence)
    ));
    let seq = vec![0usize, 2];
    assert!(matches!(
        Trellis::new(&model, &seq),
        Err(TrellisError::SymbolOutOfRange {
            position: 1,
            symbol: 2,
            alphabet: 2
        })
    ));
}

#[test]
fn byte_sequences_are_digitized_input() {
    let model = linear();
    let seq: &[u8] = &[0, 1, 1];
    let mut t = Trellis::new(&model, seq).unwrap();
    assert!(t.viterbi().unwrap().is_finite());
    assert_eq!(t.len(), 3);
}

#[test]
fn counts_are_normalized_with_end() {
    let model = ModelBuilder::new(1)
        .init_transition("A", ValueKind::Counts, 4.0)
        .state(
            StateSpec::new("A")
                .transition("A", ValueKind::Counts, 3.0)
                .end(ValueKind::Counts, 1.0)
                .emission(ValueKind::Counts, vec![2.0]),
        )
        .build()
        .unwrap();
    let seq = vec![0usize; 3];
    let mut t = Trellis::new(&model, &seq).unwrap();
    let score = t.viterbi().unwrap();
    let expected = 2.0 * 0.75f64.ln() + 0.25f64.ln();
    assert!((score - expected).abs() < 1e-12);
}

#[test]
fn duration_model_keeps_forward_and_backward_consistent() {
    let model = ModelBuilder::new(2)
        .init_transition("Exon", ValueKind::Probability, 1.0)
        .state(
            StateSpec::new("Exon")
                .duration("Exon", ValueKind::Probability, vec![0.9, 0.8, 0.5])
                .duration("Intron", ValueKind::Probability, vec![0.1, 0.2, 0.5])
                .emission(ValueKind::Probability, vec![0.7, 0.3]),
        )
        .state(
            StateSpec::new("Intron")
                .transition("Exon", ValueKind::Probability, 0.3)
                .transition("Intron", ValueKind::Probability, 0.7)
                .emission(ValueKind::Probability, vec![0.2, 0.8]),
        )
        .build()
        .unwrap();
    let seq = vec![0usize, 0, 0, 1, 1, 0, 0, 1];
    let mut t = Trellis::new(&model, &seq).unwrap();
    let vit = t.viterbi().unwrap();
    let path = t.traceback().unwrap();
    assert!((model.path_score(&seq, path.states()) - vit).abs() < 1e-9);

    t.reset();
    let fwd = t.forward().unwrap();
    t.reset();
    let bwd = t.backward().unwrap();
    assert!((fwd - bwd).abs() < 1e-9);
    assert!(fwd >= vit);
}

#[test]
fn export_lists_retained_tables() {
    let model = linear();
    let seq = vec![0usize, 1, 0];
    let mut t = TrellisBuilder::new()
        .store_values(true)
        .build(&model, &seq)
        .unwrap();
    t.posterior().unwrap();
    let mut out = Vec::new();
    t.export_tables(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    for header in ["# forward", "# backward", "# posterior"] {
        assert!(text.contains(header), "missing {header}");
    }
    assert!(!text.contains("# viterbi"));
    assert!(text.contains("position\tA\tB"));

    t.reset();
    t.stochastic_viterbi().unwrap();
    let mut out = Vec::new();
    t.export_tables(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("# viterbi"));
    assert!(text.contains("# stochastic"));
    assert!(text.contains("INIT"));
}
