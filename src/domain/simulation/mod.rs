pub mod monte_carlo;

pub use monte_carlo::{Percentiles, SimulationReport, SimulationRequest, run_monte_carlo};
