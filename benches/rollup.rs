//! Roll-up cost over growing child sets.
//!
//! Covers evaluations rolling into a variant run and run states rolling
//! into a test or suite run, including the early exit while children are
//! still running.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use uuid::Uuid;

use chatcheck::domain::models::{Evaluation, EvaluationOutcome, RunState};
use chatcheck::services::roll_up;

const SIZES: [usize; 3] = [10, 100, 1_000];

/// Judged evaluations where every third one failed.
fn evaluations(n: usize) -> Vec<Evaluation> {
    let variant_run_id = Uuid::new_v4();
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let mut evaluation = Evaluation::new(variant_run_id, "", i as f64 * 0.25);
            let outcome = if i % 3 == 0 {
                EvaluationOutcome::Fail {
                    reason: Some(format!("reply {i} changed the refund window")),
                }
            } else {
                EvaluationOutcome::Pass {
                    baseline_id: Uuid::new_v4(),
                }
            };
            evaluation
                .complete(outcome, Utc::now())
                .expect("fresh evaluation completes");
            evaluation
        })
        .collect()
}

/// Scored child runs with a spread of pass rates.
fn run_states(n: usize) -> Vec<RunState> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let rate = (i % 5) as f64 / 4.0;
            RunState::scored(rate, Some(2.0), Some(format!("variant {i} drifted")), now)
        })
        .collect()
}

fn bench_evaluation_rollup(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollup_evaluations");
    for size in SIZES {
        let children = evaluations(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &children, |b, children| {
            b.iter(|| roll_up(black_box(size as u32), black_box(children.as_slice())));
        });
    }
    group.finish();
}

fn bench_run_state_rollup(c: &mut Criterion) {
    let mut group = c.benchmark_group("rollup_run_states");
    for size in SIZES {
        let children = run_states(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &children, |b, children| {
            b.iter(|| roll_up(black_box(size as u32), black_box(children.as_slice())));
        });
    }
    group.finish();
}

fn bench_waiting_rollup(c: &mut Criterion) {
    let mut children = run_states(1_000);
    children[999] = RunState::running();

    c.bench_function("rollup_waiting_on_last_child", |b| {
        b.iter(|| roll_up(black_box(1_000), black_box(children.as_slice())));
    });
}

criterion_group!(benches, bench_evaluation_rollup, bench_run_state_rollup, bench_waiting_rollup);
criterion_main!(benches);
