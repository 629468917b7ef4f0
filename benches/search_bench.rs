use criterion::{black_box, criterion_group, criterion_main, Criterion};
use factorfleet::algorithms::{exact_isqrt, fermat, pollard_p1_round, trial_down, trial_up};
use factorfleet::config::SearchConfig;
use factorfleet::coordinator::CompositeState;
use factorfleet::kind::FactorKind;
use factorfleet::record::WorkRecord;
use factorfleet::worker;
use rug::Integer;

fn scenario() -> Integer {
    Integer::from(6563u32) * Integer::from(9311u32)
}

fn bench_trial(c: &mut Criterion) {
    let n = scenario();
    let (root, _) = exact_isqrt(&n).unwrap();
    let two = Integer::from(2u32);
    c.bench_function("trial_up(6563*9311)", |b| {
        b.iter(|| trial_up(black_box(&n), &two, &root));
    });
    c.bench_function("trial_down(6563*9311)", |b| {
        b.iter(|| trial_down(black_box(&n), &two, &root));
    });
}

fn bench_fermat(c: &mut Criterion) {
    // factors 2^31-1 and 2^31+11 sit close together, so Fermat wins in one step
    let n = Integer::from(2_147_483_647u64) * Integer::from(2_147_483_659u64);
    let (root, _) = exact_isqrt(&n).unwrap();
    let start = root + 1u32;
    c.bench_function("fermat(close factors, 1000)", |b| {
        b.iter(|| fermat(black_box(&n), &start, 1000));
    });
}

fn bench_pollard(c: &mut Criterion) {
    let n = scenario();
    let base = Integer::from(2u32);
    let one = Integer::from(1u32);
    let bound = Integer::from(200u32);
    c.bench_function("pollard_p1_round(bound 200)", |b| {
        b.iter(|| pollard_p1_round(black_box(&n), &base, &one, &bound));
    });
}

fn bench_worker_round(c: &mut Criterion) {
    let record = WorkRecord::new(scenario(), FactorKind::PollardP1, SearchConfig::default().fermat_attempts).unwrap();
    c.bench_function("worker::search(pollard first round)", |b| {
        b.iter(|| worker::search(black_box(record.clone())));
    });
}

fn bench_composite_apply(c: &mut Criterion) {
    let n = Integer::from(1009u32) * 1013u32 * 1019u32 * 1021u32;
    c.bench_function("CompositeState::apply x3", |b| {
        b.iter(|| {
            let mut state = CompositeState::new(n.clone(), 25);
            for f in [1009u32, 1013, 1019] {
                state.apply(&Integer::from(f));
            }
            black_box(state.is_complete())
        });
    });
}

criterion_group!(
    benches,
    bench_trial,
    bench_fermat,
    bench_pollard,
    bench_worker_round,
    bench_composite_apply
);
criterion_main!(benches);
