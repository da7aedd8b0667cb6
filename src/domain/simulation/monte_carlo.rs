use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Equity at or below this level counts as ruin (a -50% drawdown from the
/// 100-unit baseline); the simulation stops replaying further trades.
const RUIN_EQUITY: f64 = 50.0;
const STARTING_EQUITY: f64 = 100.0;
/// Full equity curves kept for visualization.
const SAMPLE_CURVES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Per-trade fractional returns (e.g. +0.02, -0.015). Historical order
    /// carries no meaning here; every simulation reshuffles the full list.
    pub trades: Vec<f64>,
    pub sim_count: usize,
    pub risk_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub sim_count: usize,
    pub drawdown_percentiles: Percentiles,
    pub equity_percentiles: Percentiles,
    /// ruin_count / sim_count * 100.
    pub ruin_probability: f64,
    /// First `SAMPLE_CURVES` full equity curves, visualization only.
    pub sample_curves: Vec<Vec<f64>>,
}

/// Bootstrap-resample trade outcomes into equity/drawdown/ruin statistics.
///
/// Each simulation is a full Fisher-Yates reshuffle of the trade list (not
/// sampling with replacement) replayed from 100 units of equity. A ruined
/// simulation stops early but its truncated drawdown and final equity still
/// enter the aggregates.
pub fn run_monte_carlo(req: &SimulationRequest) -> SimulationReport {
    let mut rng = rand::rng();
    let mut shuffled = req.trades.clone();

    let mut final_equities = Vec::with_capacity(req.sim_count);
    let mut max_drawdowns = Vec::with_capacity(req.sim_count);
    let mut sample_curves = Vec::with_capacity(SAMPLE_CURVES.min(req.sim_count));
    let mut ruin_count = 0usize;

    for sim in 0..req.sim_count {
        shuffled.shuffle(&mut rng);

        let mut equity = STARTING_EQUITY;
        let mut peak = STARTING_EQUITY;
        let mut max_dd_pct = 0.0f64;
        let keep_curve = sim < SAMPLE_CURVES;
        let mut curve = if keep_curve {
            let mut c = Vec::with_capacity(shuffled.len() + 1);
            c.push(equity);
            c
        } else {
            Vec::new()
        };

        for &r in &shuffled {
            equity += equity * req.risk_percent * r;
            if keep_curve {
                curve.push(equity);
            }
            if equity > peak {
                peak = equity;
            }
            let dd = (equity - peak) / peak * 100.0;
            if dd < max_dd_pct {
                max_dd_pct = dd;
            }
            if equity <= RUIN_EQUITY {
                ruin_count += 1;
                break;
            }
        }

        final_equities.push(equity);
        max_drawdowns.push(max_dd_pct);
        if keep_curve {
            sample_curves.push(curve);
        }
    }

    final_equities.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    max_drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    SimulationReport {
        sim_count: req.sim_count,
        drawdown_percentiles: percentiles_of(&max_drawdowns),
        equity_percentiles: percentiles_of(&final_equities),
        ruin_probability: if req.sim_count > 0 {
            ruin_count as f64 / req.sim_count as f64 * 100.0
        } else {
            0.0
        },
        sample_curves,
    }
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn percentiles_of(sorted: &[f64]) -> Percentiles {
    Percentiles {
        p5: percentile(sorted, 5.0),
        p25: percentile(sorted, 25.0),
        p50: percentile(sorted, 50.0),
        p75: percentile(sorted, 75.0),
        p95: percentile(sorted, 95.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_returns_never_ruin() {
        let report = run_monte_carlo(&SimulationRequest {
            trades: vec![0.0; 30],
            sim_count: 1000,
            risk_percent: 1.0,
        });

        assert_eq!(report.ruin_probability, 0.0);
        for p in [
            report.equity_percentiles.p5,
            report.equity_percentiles.p25,
            report.equity_percentiles.p50,
            report.equity_percentiles.p75,
            report.equity_percentiles.p95,
        ] {
            assert_eq!(p, 100.0);
        }
    }

    #[test]
    fn test_catastrophic_returns_always_ruin() {
        // -60% per trade at full risk: 100 -> 40 on the first trade
        let report = run_monte_carlo(&SimulationRequest {
            trades: vec![-0.6; 10],
            sim_count: 500,
            risk_percent: 1.0,
        });

        assert_eq!(report.ruin_probability, 100.0);
        assert!(report.equity_percentiles.p95 <= RUIN_EQUITY);
    }

    #[test]
    fn test_ruined_runs_still_count_in_aggregates() {
        let report = run_monte_carlo(&SimulationRequest {
            trades: vec![-0.6; 10],
            sim_count: 100,
            risk_percent: 1.0,
        });
        // truncated drawdowns are recorded, not discarded
        assert!(report.drawdown_percentiles.p50 <= -50.0);
    }

    #[test]
    fn test_sample_curve_cap() {
        let report = run_monte_carlo(&SimulationRequest {
            trades: vec![0.01; 5],
            sim_count: 200,
            risk_percent: 0.5,
        });
        assert_eq!(report.sample_curves.len(), 50);
        // starting point plus one equity per trade
        assert_eq!(report.sample_curves[0].len(), 6);
    }

    #[test]
    fn test_reshuffle_does_not_change_outcome_distribution_bounds() {
        // a single +100% trade at half risk lands on 150 regardless of order
        let report = run_monte_carlo(&SimulationRequest {
            trades: vec![1.0],
            sim_count: 50,
            risk_percent: 0.5,
        });
        assert_eq!(report.equity_percentiles.p5, 150.0);
        assert_eq!(report.equity_percentiles.p95, 150.0);
    }
}
