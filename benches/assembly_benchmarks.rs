//! Assembly solver benchmarks.
//!
//! Measures the Newton–Raphson correction cost per simulation step for the
//! bundled scenarios.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mecsim::assembly::AssemblyProblemSolver;
use mecsim::scenarios::four_bar::{FourBar, FourBarConfig};
use mecsim::scenarios::pendulum::{DrivenPendulum, DrivenPendulumConfig};

fn bench_pendulum_step(c: &mut Criterion) {
    let scenario = DrivenPendulum::new(DrivenPendulumConfig::default());
    let (mut state, constraints) = scenario.build();
    let solver = AssemblyProblemSolver::new(constraints);
    solver.init(&mut state).expect("pendulum init");

    c.bench_function("pendulum_assembly_step", |b| {
        b.iter(|| {
            let mut s = state.clone();
            s.time += 0.01;
            solver.step(black_box(&mut s), 0.01).expect("pendulum step");
        });
    });
}

fn bench_four_bar_step(c: &mut Criterion) {
    let scenario = FourBar::new(FourBarConfig::default());
    let (mut state, constraints) = scenario.build();
    let solver = AssemblyProblemSolver::new(constraints);
    solver.init(&mut state).expect("four-bar init");

    c.bench_function("four_bar_assembly_step", |b| {
        b.iter(|| {
            let mut s = state.clone();
            s.time += 0.01;
            solver.step(black_box(&mut s), 0.01).expect("four-bar step");
        });
    });
}

fn bench_four_bar_init(c: &mut Criterion) {
    let scenario = FourBar::new(FourBarConfig::default());

    c.bench_function("four_bar_assembly_init", |b| {
        b.iter(|| {
            let (mut state, constraints) = scenario.build();
            let solver = AssemblyProblemSolver::new(constraints);
            solver.init(black_box(&mut state)).expect("four-bar init");
        });
    });
}

criterion_group!(
    benches,
    bench_pendulum_step,
    bench_four_bar_step,
    bench_four_bar_init
);
criterion_main!(benches);
