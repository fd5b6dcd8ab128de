// src/monte_carlo.rs
//
// Per-location Monte Carlo of royalty loss.
//
// Model, per draw:
//   yield_loss ~ Normal(likelihood / 5 * mean_loss_factor, std_dev), clamped to [0, 100]
//   loss       = yield_loss / 100 * impact * 100      (% of total royalties)
//
// Determinism: location i of a portfolio run is simulated on its own
// ChaCha8 stream seeded with `seed.wrapping_add(i)`, so results do not
// depend on how many draws earlier locations consumed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::config::MonteCarloConfig;
use crate::location::LocationKind;
use crate::logging::{EventSink, SimulationEvent};
use crate::stats::RunningStats;
use crate::tail_risk::{quantile_sorted, sorted_finite, VAR_LEVELS};

pub use crate::tail_risk::expected_shortfall;

/// Maximum climate likelihood score.
pub const MAX_LIKELIHOOD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub n_simulations: usize,
    pub std_dev_yield_loss: f64,
    pub mean_loss_factor: f64,
}

impl From<&MonteCarloConfig> for SimulationParams {
    fn from(cfg: &MonteCarloConfig) -> Self {
        Self {
            n_simulations: cfg.n_simulations,
            std_dev_yield_loss: cfg.std_dev_yield_loss,
            mean_loss_factor: cfg.mean_loss_factor,
        }
    }
}

/// Mean yield loss (%) for a likelihood score; 5/5 maps to `mean_loss_factor`.
pub fn mean_yield_loss(likelihood: f64, mean_loss_factor: f64) -> f64 {
    likelihood / MAX_LIKELIHOOD * mean_loss_factor
}

/// Royalty loss (% of total royalties) for one yield-loss draw.
pub fn royalty_loss_percent(yield_loss: f64, impact: f64) -> f64 {
    yield_loss.clamp(0.0, 100.0) / 100.0 * impact * 100.0
}

/// What the simulator needs to know about one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInput {
    pub location: String,
    pub kind: LocationKind,
    pub climate_likelihood: f64,
    pub impact_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSimulation {
    pub location: String,
    pub climate_likelihood: f64,
    pub impact_percent: f64,
    pub n_simulations: usize,
    pub mean_yield_loss: f64,
    pub mean_loss: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min_loss: f64,
    pub max_loss: f64,
    pub median_loss: f64,
    pub var_90: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub es_95: f64,
    /// Raw draws; not serialised.
    #[serde(skip)]
    pub losses: Vec<f64>,
}

impl LocationSimulation {
    pub fn from_losses(
        location: &str,
        climate_likelihood: f64,
        impact_percent: f64,
        mean_yield_loss: f64,
        losses: Vec<f64>,
    ) -> Self {
        let moments = RunningStats::from_slice(&losses);
        let sorted = sorted_finite(&losses);
        let [var_90, var_95, var_99] = VAR_LEVELS.map(|c| quantile_sorted(&sorted, c));
        Self {
            location: location.to_string(),
            climate_likelihood,
            impact_percent,
            n_simulations: losses.len(),
            mean_yield_loss,
            mean_loss: moments.mean(),
            std_dev: moments.std_pop(),
            min_loss: moments.min(),
            max_loss: moments.max(),
            median_loss: quantile_sorted(&sorted, 0.50),
            var_90,
            var_95,
            var_99,
            es_95: expected_shortfall(&losses, 0.95),
            losses,
        }
    }
}

pub fn simulate_location<R: Rng + ?Sized>(
    location: &str,
    climate_likelihood: f64,
    impact_percent: f64,
    params: &SimulationParams,
    rng: &mut R,
) -> LocationSimulation {
    let mean = mean_yield_loss(climate_likelihood, params.mean_loss_factor);
    let sd = params.std_dev_yield_loss;

    let losses: Vec<f64> = (0..params.n_simulations)
        .map(|_| {
            let z: f64 = StandardNormal.sample(rng);
            royalty_loss_percent(mean + sd * z, impact_percent)
        })
        .collect();

    LocationSimulation::from_losses(location, climate_likelihood, impact_percent, mean, losses)
}

/// Simulate every input in order, one seeded stream per location.
pub fn simulate_portfolio(
    inputs: &[SimulationInput],
    cfg: &MonteCarloConfig,
    sink: &mut dyn EventSink,
) -> Vec<LocationSimulation> {
    let params = SimulationParams::from(cfg);
    let total = inputs.len();
    let mut out = Vec::with_capacity(total);

    for (i, input) in inputs.iter().enumerate() {
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed.wrapping_add(i as u64));
        let sim = simulate_location(
            &input.location,
            input.climate_likelihood,
            input.impact_percent,
            &params,
            &mut rng,
        );
        sink.on_location(&SimulationEvent {
            index: i + 1,
            total,
            location: &input.location,
            mean_loss: sim.mean_loss,
            var_95: sim.var_95,
        });
        out.push(sim);
    }

    sink.finish();
    out
}

// ============================================================================
// Stress test
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTest {
    pub stress_factor: f64,
    pub baseline: LocationSimulation,
    pub stressed: LocationSimulation,
}

impl StressTest {
    pub fn mean_loss_increase(&self) -> f64 {
        self.stressed.mean_loss - self.baseline.mean_loss
    }

    pub fn var_95_increase(&self) -> f64 {
        self.stressed.var_95 - self.baseline.var_95
    }
}

/// Baseline vs impact x `stress_factor`, both on a stream seeded with `seed`.
pub fn run_stress_test(
    location: &str,
    climate_likelihood: f64,
    impact_percent: f64,
    stress_factor: f64,
    params: &SimulationParams,
    seed: u64,
) -> StressTest {
    let baseline = simulate_location(
        location,
        climate_likelihood,
        impact_percent,
        params,
        &mut ChaCha8Rng::seed_from_u64(seed),
    );
    let stressed = simulate_location(
        location,
        climate_likelihood,
        impact_percent * stress_factor,
        params,
        &mut ChaCha8Rng::seed_from_u64(seed),
    );
    StressTest {
        stress_factor,
        baseline,
        stressed,
    }
}

// ============================================================================
// Presentation helpers
// ============================================================================

/// Sorted losses and `P(loss > level)` estimated as `1 - i/n` (1-based i).
pub fn loss_exceedance_curve(losses: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let sorted = sorted_finite(losses);
    let n = sorted.len() as f64;
    let probs = (1..=sorted.len()).map(|i| 1.0 - i as f64 / n).collect();
    (sorted, probs)
}

/// (metric, "x.xx%") rows for display.
pub fn summary_table(sim: &LocationSimulation) -> Vec<(&'static str, String)> {
    [
        ("Mean Loss", sim.mean_loss),
        ("Median Loss", sim.median_loss),
        ("Std Deviation", sim.std_dev),
        ("Min Loss", sim.min_loss),
        ("Max Loss", sim.max_loss),
        ("VaR 90%", sim.var_90),
        ("VaR 95%", sim.var_95),
        ("VaR 99%", sim.var_99),
    ]
    .into_iter()
    .map(|(k, v)| (k, format!("{v:.2}%")))
    .collect()
}
