#![deny(clippy::all, clippy::pedantic)]

use std::sync::Arc;

use anyhow::Result;
use oracle::{ActionBounds, EnvParams, FirstOrderLag, Oracle, ProcessModel, Schedule};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Building MPC oracle for the first-order lag demo...");
    let model: Arc<dyn ProcessModel> = Arc::new(FirstOrderLag::default());

    // setpoint steps: hold 0.5, then step to 1.5 halfway through the run
    let n_sim = 100;
    let mut setpoint = vec![0.5; n_sim / 2];
    setpoint.extend(vec![1.5; n_sim / 2]);

    let params = EnvParams::basic(
        vec![0.0],
        vec![Schedule::new("x", setpoint)],
        ActionBounds::new(vec![-2.0], vec![2.0]),
        0.1,
        n_sim,
    );

    tracing::info!(steps = n_sim, "Starting oracle control run...");
    let log = Oracle::new(model, params).run()?;

    for i in (0..log.len()).step_by(25) {
        tracing::info!(
            "Step {} complete. state: {:.4}, action: {:.4}",
            i + 1,
            log.states[i][0],
            log.actions[i][0]
        );
    }

    let last = log.len() - 1;
    tracing::info!(
        "Oracle run finished after {} steps. Final state: {:.4}",
        log.len(),
        log.states[last][0]
    );

    Ok(())
}
