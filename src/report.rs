// src/report.rs
//
// End-to-end analysis run and its outputs:
// - run_analysis: cache -> assessment -> simulations -> portfolio views
// - analysis_summary.json: stable, pretty JSON with a determinism checksum
// - console summary in the research-harness SUMMARY style
//
// Raw simulated losses never leave memory; the JSON carries statistics only.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::assessment::{
    assess, portfolio_summary, sensitivity_analysis, LocationRisk, PortfolioSummary,
    SensitivityAnalysis,
};
use crate::cache::{atomic_write, RiskDataCache};
use crate::config::Config;
use crate::error::{Result, RiskError};
use crate::logging::EventSink;
use crate::monte_carlo::{
    simulate_portfolio, LocationSimulation, SimulationInput, SimulationParams,
};
use crate::portfolio::{
    portfolio_metrics, simulate_correlated_losses, value_chain_breakdown, CorrelatedPortfolio,
    ValueChainBreakdown,
};

pub const REPORT_SCHEMA_VERSION: u32 = 1;
pub const SUMMARY_FILE: &str = "analysis_summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub seed: u64,
    pub n_simulations: usize,
    pub correlation: f64,
    pub stress_factor: f64,
    /// FNV-1a of the resolved config, hex.
    pub config_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminismInfo {
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schema_version: u32,
    pub canerisk_version: String,
    pub run: RunInfo,
    pub config: Config,
    pub locations: Vec<LocationRisk>,
    pub simulations: Vec<LocationSimulation>,
    pub portfolio: PortfolioSummary,
    pub value_chain: ValueChainBreakdown,
    pub correlated: CorrelatedPortfolio,
    pub sensitivity: Option<SensitivityAnalysis>,
    pub determinism: DeterminismInfo,
}

/// Run the full pipeline over a loaded cache.
///
/// Location i is simulated with `seed + i`; the correlated run uses the next
/// stream after the last location.
pub fn run_analysis(
    cache: &RiskDataCache,
    cfg: &Config,
    stress_target: Option<&str>,
    sink: &mut dyn EventSink,
) -> Result<AnalysisReport> {
    cfg.validate()?;
    let mc = &cfg.monte_carlo;

    let rows = assess(cache, cfg);
    let inputs: Vec<SimulationInput> = rows.iter().map(LocationRisk::simulation_input).collect();
    info!(
        locations = rows.len(),
        n_simulations = mc.n_simulations,
        "running simulations"
    );

    let sims = simulate_portfolio(&inputs, mc, sink);
    let metrics = portfolio_metrics(&sims, mc.high_risk_var95_threshold);
    let portfolio = portfolio_summary(&rows, Some(&metrics));
    let value_chain = value_chain_breakdown(&inputs, &sims);

    let mut rng = ChaCha8Rng::seed_from_u64(mc.seed.wrapping_add(inputs.len() as u64));
    let matrix = simulate_correlated_losses(
        &inputs,
        mc.correlation,
        &SimulationParams::from(mc),
        &mut rng,
    )?;
    let correlated =
        CorrelatedPortfolio::compute(&matrix, mc.correlation, mc.high_risk_var95_threshold);

    let sensitivity = sensitivity_analysis(&rows, mc.stress_factor, stress_target)?;

    let checksum = compute_checksum(mc.seed, mc.n_simulations, &sims, &correlated);

    Ok(AnalysisReport {
        schema_version: REPORT_SCHEMA_VERSION,
        canerisk_version: env!("CARGO_PKG_VERSION").to_string(),
        run: RunInfo {
            seed: mc.seed,
            n_simulations: mc.n_simulations,
            correlation: mc.correlation,
            stress_factor: mc.stress_factor,
            config_fingerprint: format!("{:016x}", cfg.fingerprint()),
        },
        config: cfg.clone(),
        locations: rows,
        simulations: sims,
        portfolio,
        value_chain,
        correlated,
        sensitivity,
        determinism: DeterminismInfo { checksum },
    })
}

/// SHA-256 over the seed, draw count and rounded per-location statistics.
///
/// Values are rounded to 6 decimals so the checksum is stable across
/// platforms with identical draws.
pub fn compute_checksum(
    seed: u64,
    n_simulations: usize,
    sims: &[LocationSimulation],
    correlated: &CorrelatedPortfolio,
) -> String {
    let round = |x: f64| (x * 1_000_000.0).round() as i64;
    let mut hasher = Sha256::new();

    hasher.update(seed.to_le_bytes());
    hasher.update((n_simulations as u64).to_le_bytes());
    hasher.update((sims.len() as u64).to_le_bytes());

    for s in sims {
        hasher.update(s.location.as_bytes());
        hasher.update([0u8]);
        for v in [s.mean_loss, s.var_90, s.var_95, s.var_99] {
            hasher.update(round(v).to_le_bytes());
        }
    }

    for v in [correlated.mean_loss, correlated.var_95, correlated.var_99] {
        hasher.update(round(v).to_le_bytes());
    }

    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl AnalysisReport {
    /// Write `analysis_summary.json` into `dir` (created if missing).
    pub fn write_json<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| RiskError::io(dir, e))?;
        let path = dir.join(SUMMARY_FILE);
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        atomic_write(&path, json.as_bytes())?;
        Ok(path)
    }
}

// ============================================================================
// Console output
// ============================================================================

/// Fixed-width per-location table (losses in % of total royalties).
pub fn format_simulation_table(sims: &[LocationSimulation]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<28} {:>6} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "location", "like", "impact", "mean", "var90", "var95", "var99"
    );
    for s in sims {
        let _ = writeln!(
            out,
            "{:<28} {:>6.1} {:>7.2}% {:>7.3}% {:>7.3}% {:>7.3}% {:>7.3}%",
            truncate(&s.location, 28),
            s.climate_likelihood,
            s.impact_percent * 100.0,
            s.mean_loss,
            s.var_90,
            s.var_95,
            s.var_99
        );
    }
    out
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        s.chars().take(width - 1).chain(std::iter::once('~')).collect()
    }
}

pub fn print_summary(report: &AnalysisReport) {
    let p = &report.portfolio;
    let c = &report.correlated;

    println!();
    println!("SUMMARY");
    println!(
        "  locations:          {} ({} clients, {} suppliers)",
        p.total_locations, p.num_clients, p.num_suppliers
    );
    println!(
        "  climate:            avg={:.2}  max={}  high={}",
        p.avg_climate_likelihood, p.max_climate_likelihood, p.high_climate_risk_count
    );
    println!(
        "  hazard:             avg={:.2}  max={}  high={}",
        p.avg_hazard_severity, p.max_hazard_severity, p.high_hazard_risk_count
    );
    println!(
        "  aggregate:          avg={:.2}  high={}  weighted_total={:.2}",
        p.avg_aggregate_risk, p.high_aggregate_risk_count, p.total_aggregate_weighted_risk
    );
    println!(
        "  confidence:         avg={:.1}  high={}  medium={}  low={}",
        p.avg_confidence,
        p.high_confidence_count,
        p.medium_confidence_count,
        p.low_confidence_count
    );

    if let Some(m) = &p.monte_carlo {
        println!(
            "  standalone loss:    mean={:.3}%  var95={:.3}%  var99={:.3}%  max_var95={:.3}%",
            m.total_mean_loss, m.total_var_95, m.total_var_99, m.max_single_location_var95
        );
        println!(
            "  concentration:      hhi={:.4}  diversification={:.4}  effective_n={:.2}  high_risk={}",
            m.herfindahl_index,
            m.diversification_score,
            m.effective_locations,
            m.num_high_risk_locations
        );
        for (i, r) in m.top_5_risks.iter().enumerate() {
            println!(
                "    #{} {:<26} var95={:.3}%  mean={:.3}%",
                i + 1,
                r.location,
                r.var_95,
                r.mean_loss
            );
        }
    }

    println!(
        "  correlated (rho={:.2}): mean={:.3}%  var95={:.3}%  var99={:.3}%  es95={:.3}%  benefit={:.3}%",
        c.correlation, c.mean_loss, c.var_95, c.var_99, c.es_95, c.diversification_benefit
    );
    println!(
        "  P(loss > {:.1}%):     {:.4}  [{:.4}, {:.4}]",
        c.exceedance.threshold,
        c.exceedance.point_estimate,
        c.exceedance.ci_lower,
        c.exceedance.ci_upper
    );

    match &report.sensitivity {
        Some(s) => println!(
            "  sensitivity:        {} x{:.2}  weighted {:.2} -> {:.2}  top {} -> {}{}",
            s.stressed_client,
            s.stress_factor,
            s.baseline_weighted_risk,
            s.stressed_weighted_risk,
            s.baseline_top_risk,
            s.new_top_risk,
            if s.ranking_changed { "  (ranking changed)" } else { "" }
        ),
        None => println!("  sensitivity:        skipped (no clients)"),
    }

    println!("  checksum:           {}", report.determinism.checksum);
}
