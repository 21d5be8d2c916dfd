use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use stoch_trellis::{Model, ModelBuilder, StateSpec, Trellis, TrellisBuilder, ValueKind};
use sysinfo::{get_current_pid, ProcessRefreshKind, System};

fn random_obs(rng: &mut StdRng, len: usize, vocab: usize) -> Vec<usize> {
    (0..len).map(|_| rng.gen_range(0..vocab)).collect()
}

fn casino() -> Model {
    ModelBuilder::new(2)
        .init_transition("Fair", ValueKind::Probability, 0.5)
        .init_transition("Loaded", ValueKind::Probability, 0.5)
        .state(
            StateSpec::new("Fair")
                .transition("Fair", ValueKind::Probability, 0.9)
                .transition("Loaded", ValueKind::Probability, 0.1)
                .emission(ValueKind::Probability, vec![0.8, 0.2]),
        )
        .state(
            StateSpec::new("Loaded")
                .transition("Fair", ValueKind::Probability, 0.2)
                .transition("Loaded", ValueKind::Probability, 0.8)
                .emission(ValueKind::Probability, vec![0.3, 0.7]),
        )
        .build()
        .expect("casino model")
}

fn rss_kib() -> u64 {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessRefreshKind::new());
    if let Some(p) = sys.process(get_current_pid().unwrap()) {
        p.memory()
    } else {
        0
    }
}

fn bench_viterbi_perf(c: &mut Criterion) {
    let model = casino();
    let mut group = c.benchmark_group("viterbi_perf");
    for &len in &[10_000usize, 50_000] {
        group.bench_function(format!("viterbi_len_{len}"), |b| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(44);
                    random_obs(&mut rng, len, 2)
                },
                |obs| {
                    let before = rss_kib();
                    let mut trellis = Trellis::new(&model, &obs).unwrap();
                    let logp = trellis.viterbi().unwrap();
                    let path = trellis.traceback().unwrap();
                    let after = rss_kib();
                    criterion::black_box((logp, path));
                    eprintln!(
                        "RSS KiB delta (viterbi {len}): {}",
                        after.saturating_sub(before)
                    );
                },
                BatchSize::PerIteration,
            )
        });
        group.bench_function(format!("viterbi_stored_len_{len}"), |b| {
            b.iter_batched(
                || {
                    let mut rng = StdRng::seed_from_u64(44);
                    random_obs(&mut rng, len, 2)
                },
                |obs| {
                    let mut trellis = TrellisBuilder::new()
                        .store_values(true)
                        .build(&model, &obs)
                        .unwrap();
                    criterion::black_box(trellis.viterbi().unwrap());
                },
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

fn bench_posterior(c: &mut Criterion) {
    let model = casino();
    let mut rng = StdRng::seed_from_u64(7);
    let obs = random_obs(&mut rng, 20_000, 2);
    let mut trellis = Trellis::new(&model, &obs).unwrap();
    c.bench_function("posterior_len_20000_reused", |b| {
        b.iter(|| {
            trellis.reset();
            criterion::black_box(trellis.posterior().unwrap());
        })
    });
}

criterion_group!(benches, bench_viterbi_perf, bench_posterior);
criterion_main!(benches);
