use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::DVector;
use optim::{ControlProblem, MpcSolver, StageParams};

fn two_state_problem() -> ControlProblem {
    // coupled lag: dx0 = u0 - x0, dx1 = x0 - x1, track x1
    let mut problem = ControlProblem::new(
        2,
        1,
        10,
        0.1,
        Box::new(|x, u, _p| DVector::from_vec(vec![u[0] - x[0], x[0] - x[1]])),
        Box::new(|x, _u, p| (x[1] - p.setpoint[0]).powi(2)),
        Box::new(|x, p| (x[1] - p.setpoint[0]).powi(2)),
        Box::new(|_i| StageParams {
            setpoint: DVector::from_vec(vec![1.0]),
            disturbance: None,
            prev_action: None,
        }),
    );
    problem.set_action_bounds(DVector::from_vec(vec![-2.0]), DVector::from_vec(vec![2.0]));
    problem
}

fn bench_make_step(c: &mut Criterion) {
    c.bench_function("mpc_make_step_2state_h10", |b| {
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        b.iter(|| {
            let mut solver = MpcSolver::new(two_state_problem());
            solver.make_step(&x0).unwrap()
        });
    });
}

criterion_group!(benches, bench_make_step);
criterion_main!(benches);
