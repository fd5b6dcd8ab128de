// src/portfolio.rs
//
// Portfolio aggregation over per-location simulations:
// - summed / max / average VaR and Herfindahl concentration
// - client vs supplier breakdown
// - correlated simulation (constant pairwise correlation, nalgebra Cholesky)
//   and the distribution of the summed portfolio loss

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::location::LocationKind;
use crate::monte_carlo::{
    mean_yield_loss, royalty_loss_percent, LocationSimulation, SimulationInput, SimulationParams,
};
use crate::stats::RunningStats;
use crate::tail_risk::{expected_shortfall, var_upper, ExceedanceProbability};

/// Number of locations listed in `top_5_risks`.
pub const TOP_N: usize = 5;

// ============================================================================
// Standalone aggregation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLocation {
    pub location: String,
    pub var_95: f64,
    pub mean_loss: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_mean_loss: f64,
    /// Sum of standalone VaR95 (no diversification credit).
    pub total_var_95: f64,
    pub total_var_99: f64,
    pub max_single_location_var95: f64,
    pub avg_location_var95: f64,
    pub herfindahl_index: f64,
    /// `1 - HHI`; higher is more diversified.
    pub diversification_score: f64,
    /// `1 / HHI`, 0 when HHI is 0.
    pub effective_locations: f64,
    pub top_5_risks: Vec<RankedLocation>,
    pub num_high_risk_locations: usize,
}

/// Σ impact².
pub fn herfindahl_index(impacts: impl IntoIterator<Item = f64>) -> f64 {
    impacts.into_iter().map(|x| x * x).sum()
}

pub fn portfolio_metrics(sims: &[LocationSimulation], high_risk_var95: f64) -> PortfolioMetrics {
    if sims.is_empty() {
        return PortfolioMetrics::default();
    }

    let hhi = herfindahl_index(sims.iter().map(|s| s.impact_percent));
    let total_var_95: f64 = sims.iter().map(|s| s.var_95).sum();

    let mut ranked: Vec<&LocationSimulation> = sims.iter().collect();
    // Stable: equal VaRs keep input order.
    ranked.sort_by(|a, b| b.var_95.total_cmp(&a.var_95));
    let top_5_risks = ranked
        .iter()
        .take(TOP_N)
        .map(|s| RankedLocation {
            location: s.location.clone(),
            var_95: s.var_95,
            mean_loss: s.mean_loss,
        })
        .collect();

    PortfolioMetrics {
        total_mean_loss: sims.iter().map(|s| s.mean_loss).sum(),
        total_var_95,
        total_var_99: sims.iter().map(|s| s.var_99).sum(),
        max_single_location_var95: sims
            .iter()
            .map(|s| s.var_95)
            .fold(f64::NEG_INFINITY, f64::max),
        avg_location_var95: total_var_95 / sims.len() as f64,
        herfindahl_index: hhi,
        diversification_score: 1.0 - hhi,
        effective_locations: if hhi > 0.0 { 1.0 / hhi } else { 0.0 },
        top_5_risks,
        num_high_risk_locations: sims.iter().filter(|s| s.var_95 > high_risk_var95).count(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTotals {
    pub count: usize,
    pub total_impact: f64,
    pub total_mean_loss: f64,
    pub total_var_95: f64,
}

impl SegmentTotals {
    fn add(&mut self, sim: &LocationSimulation) {
        self.count += 1;
        self.total_impact += sim.impact_percent;
        self.total_mean_loss += sim.mean_loss;
        self.total_var_95 += sim.var_95;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueChainBreakdown {
    pub clients: SegmentTotals,
    pub suppliers: SegmentTotals,
}

/// Client vs supplier totals. `inputs[i]` must describe `sims[i]`; extra
/// entries on either side are ignored.
pub fn value_chain_breakdown(
    inputs: &[SimulationInput],
    sims: &[LocationSimulation],
) -> ValueChainBreakdown {
    let mut out = ValueChainBreakdown::default();
    for (input, sim) in inputs.iter().zip(sims) {
        match input.kind {
            LocationKind::Client => out.clients.add(sim),
            LocationKind::Supplier => out.suppliers.add(sim),
        }
    }
    out
}

// ============================================================================
// Correlation
// ============================================================================

/// n x n matrix with 1 on the diagonal and `rho` elsewhere.
pub fn correlation_matrix(n: usize, rho: f64) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 } else { rho })
}

/// Lower-triangular L with `L * L^T = a`.
pub fn cholesky(a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if !a.is_square() {
        return Err(RiskError::validation("correlation", "matrix is not square"));
    }
    a.clone()
        .cholesky()
        .map(|c| c.l())
        .ok_or(RiskError::NotPositiveDefinite { dim: a.nrows() })
}

/// `n_simulations x n_locations` loss matrix (% of royalties).
#[derive(Debug, Clone, PartialEq)]
pub struct LossMatrix {
    losses: DMatrix<f64>,
}

impl Default for LossMatrix {
    fn default() -> Self {
        Self {
            losses: DMatrix::zeros(0, 0),
        }
    }
}

impl LossMatrix {
    pub fn n_simulations(&self) -> usize {
        self.losses.nrows()
    }

    pub fn n_locations(&self) -> usize {
        self.losses.ncols()
    }

    pub fn get(&self, sim: usize, location: usize) -> f64 {
        self.losses[(sim, location)]
    }

    pub fn row(&self, sim: usize) -> Vec<f64> {
        self.losses.row(sim).iter().copied().collect()
    }

    pub fn column(&self, location: usize) -> Vec<f64> {
        self.losses.column(location).iter().copied().collect()
    }

    /// Summed loss per draw.
    pub fn portfolio_losses(&self) -> Vec<f64> {
        self.losses.column_sum().iter().copied().collect()
    }
}

/// Correlated draws: an `n x m` matrix `E` of independent standard normals
/// is mapped to shocks `Z = E L^T`, so each row is `L e`.
pub fn simulate_correlated_losses<R: Rng + ?Sized>(
    inputs: &[SimulationInput],
    rho: f64,
    params: &SimulationParams,
    rng: &mut R,
) -> Result<LossMatrix> {
    let m = inputs.len();
    let n = params.n_simulations;
    if m == 0 {
        return Ok(LossMatrix::default());
    }

    let l = cholesky(&correlation_matrix(m, rho))?;
    let means: Vec<f64> = inputs
        .iter()
        .map(|i| mean_yield_loss(i.climate_likelihood, params.mean_loss_factor))
        .collect();
    let sd = params.std_dev_yield_loss;

    // Row-major fill keeps the draw order of one row per simulation.
    let draws: Vec<f64> = (0..n * m).map(|_| StandardNormal.sample(rng)).collect();
    let shocks = DMatrix::from_row_slice(n, m, &draws) * l.transpose();

    let losses = DMatrix::from_fn(n, m, |i, j| {
        royalty_loss_percent(means[j] + sd * shocks[(i, j)], inputs[j].impact_percent)
    });
    Ok(LossMatrix { losses })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPortfolio {
    pub correlation: f64,
    pub n_simulations: usize,
    pub n_locations: usize,
    pub mean_loss: f64,
    pub std_dev: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub es_95: f64,
    pub sum_standalone_var_95: f64,
    /// `sum_standalone_var_95 - var_95`.
    pub diversification_benefit: f64,
    pub exceedance: ExceedanceProbability,
}

impl CorrelatedPortfolio {
    pub fn compute(matrix: &LossMatrix, correlation: f64, loss_threshold: f64) -> Self {
        let totals = matrix.portfolio_losses();
        let moments = RunningStats::from_slice(&totals);
        let sum_standalone_var_95: f64 = (0..matrix.n_locations())
            .map(|j| var_upper(&matrix.column(j), 0.95))
            .sum();

        // Empty matrices report zeros rather than NaN.
        let or_zero = |x: f64| if x.is_finite() { x } else { 0.0 };
        let var_95 = or_zero(var_upper(&totals, 0.95));

        Self {
            correlation,
            n_simulations: matrix.n_simulations(),
            n_locations: matrix.n_locations(),
            mean_loss: moments.mean(),
            std_dev: moments.std_pop(),
            var_95,
            var_99: or_zero(var_upper(&totals, 0.99)),
            es_95: or_zero(expected_shortfall(&totals, 0.95)),
            sum_standalone_var_95,
            diversification_benefit: sum_standalone_var_95 - var_95,
            exceedance: ExceedanceProbability::compute(&totals, loss_threshold, 0.95),
        }
    }
}
