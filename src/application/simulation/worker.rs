//! Worker boundary for the Monte Carlo simulator.
//!
//! The resampler is the one CPU-bound workload in the crate, so it runs off
//! the async runtime on a blocking thread. The exchange is exactly one
//! request message in and one report message out; no shared state, no
//! streaming.

use crate::domain::simulation::{SimulationReport, SimulationRequest, run_monte_carlo};
use tracing::info;

/// Run a simulation batch on a dedicated blocking thread and await its
/// single aggregated report.
pub async fn simulate(request: SimulationRequest) -> SimulationReport {
    let sim_count = request.sim_count;
    let handle = tokio::task::spawn_blocking(move || run_monte_carlo(&request));

    // a panicked worker yields an empty report
    let report = match handle.await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("SimulationWorker: worker thread failed: {}", e);
            run_monte_carlo(&SimulationRequest {
                trades: Vec::new(),
                sim_count: 0,
                risk_percent: 0.0,
            })
        }
    };

    info!(
        "SimulationWorker: {} simulations complete, ruin probability {:.2}%",
        sim_count, report.ruin_probability
    );
    report
}
