// src/config.rs
//
// Central configuration for the canerisk engine.
//
// `Config::default()` carries the production constants (Monte Carlo
// parameters, climate / agro-met thresholds, hazard scores and weights,
// confidence weights). Layering, highest precedence first:
//
//   1. CLI flags            (`Overrides`, applied by the binary)
//   2. Environment          (CANERISK_* variables)
//   3. YAML config file     (`--config path.yaml`, every field optional)
//   4. Defaults
//
// Maps use BTreeMap so that debug output (and therefore the config
// fingerprint) is stable across runs.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, RiskError};

/// Human-readable config schema version, printed in the run header.
pub const CONFIG_VERSION: &str = "canerisk-cfg-v1";

pub const ENV_N_SIMULATIONS: &str = "CANERISK_N_SIMULATIONS";
pub const ENV_STD_DEV_YIELD_LOSS: &str = "CANERISK_STD_DEV_YIELD_LOSS";
pub const ENV_MEAN_LOSS_FACTOR: &str = "CANERISK_MEAN_LOSS_FACTOR";
pub const ENV_CORRELATION: &str = "CANERISK_CORRELATION";
pub const ENV_STRESS_FACTOR: &str = "CANERISK_STRESS_FACTOR";
pub const ENV_SEED: &str = "CANERISK_SEED";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monte_carlo: MonteCarloConfig,
    pub climate: ClimateThresholds,
    pub agro: AgroThresholds,
    pub hazard: HazardConfig,
    pub risk_weights: RiskWeights,
    pub confidence: ConfidenceConfig,
}

/// Monte Carlo yield-loss model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Draws per location.
    pub n_simulations: usize,
    /// Standard deviation of the yield loss, in percentage points.
    pub std_dev_yield_loss: f64,
    /// Mean yield loss (%) at climate likelihood 5/5. Scales linearly.
    pub mean_loss_factor: f64,
    /// Pairwise correlation used by the correlated portfolio simulation.
    pub correlation: f64,
    /// Impact multiplier for stress tests (1.5 = +50%).
    pub stress_factor: f64,
    /// A location counts as high risk when its VaR95 (% of royalties)
    /// exceeds this value.
    pub high_risk_var95_threshold: f64,
    /// Base seed. Location i is simulated with `seed.wrapping_add(i)`.
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 10_000,
            std_dev_yield_loss: 15.0,
            mean_loss_factor: 50.0,
            correlation: 0.3,
            stress_factor: 1.5,
            high_risk_var95_threshold: 5.0,
            seed: 42,
        }
    }
}

/// A two-level threshold: values strictly above `high` score 2,
/// strictly above `medium` score 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub high: f64,
    pub medium: f64,
}

impl Threshold {
    pub const fn new(high: f64, medium: f64) -> Self {
        Self { high, medium }
    }

    /// Points contributed by `value` (0, 1 or 2).
    pub fn points(&self, value: f64) -> u8 {
        if value > self.high {
            2
        } else if value > self.medium {
            1
        } else {
            0
        }
    }
}

/// Thresholds on projected (2040-2059 SSP5-8.5 vs 1995-2014) changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateThresholds {
    /// Mean temperature change, °C.
    pub temp_change: Threshold,
    /// Maximum temperature change, °C.
    pub temp_max_change: Threshold,
    /// Absolute precipitation change, percent.
    pub precipitation_change: Threshold,
}

impl Default for ClimateThresholds {
    fn default() -> Self {
        Self {
            temp_change: Threshold::new(2.5, 1.5),
            temp_max_change: Threshold::new(3.5, 2.0),
            precipitation_change: Threshold::new(20.0, 10.0),
        }
    }
}

/// Thresholds for agricultural meteorology indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgroThresholds {
    /// Consecutive dry days.
    pub consecutive_dry_days: Threshold,
    /// Extreme heat days per year (Tmax > 35 °C).
    pub extreme_heat_days: Threshold,
    /// Growing degree days change, percent.
    pub growing_degree_days_change: Threshold,
    /// Solar radiation change, percent (absolute).
    pub solar_radiation_change: Threshold,
}

impl Default for AgroThresholds {
    fn default() -> Self {
        Self {
            consecutive_dry_days: Threshold::new(30.0, 20.0),
            extreme_heat_days: Threshold::new(50.0, 30.0),
            growing_degree_days_change: Threshold::new(15.0, 10.0),
            solar_radiation_change: Threshold::new(10.0, 5.0),
        }
    }
}

/// ThinkHazard level scores and per-hazard relevance weights for sugarcane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    pub score_high: f64,
    pub score_medium: f64,
    pub score_low: f64,
    pub score_very_low: f64,
    /// Maximum raw hazard total mapped onto the 0-5 scale (5 hazards x 3).
    pub severity_normaliser: f64,
    /// Relevance weight keyed by hazard mnemonic (FL, DR, ...).
    pub weights: BTreeMap<String, f64>,
}

impl Default for HazardConfig {
    fn default() -> Self {
        let weights = [
            ("FL", 0.30),
            ("DR", 0.30),
            ("WF", 0.20),
            ("LS", 0.10),
            ("EQ", 0.05),
            ("CY", 0.05),
            ("UF", 0.15),
            ("CF", 0.10),
            ("TS", 0.02),
            ("VO", 0.02),
            ("EH", 0.25),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            score_high: 3.0,
            score_medium: 2.0,
            score_low: 1.0,
            score_very_low: 0.5,
            severity_normaliser: 15.0,
            weights,
        }
    }
}

/// Blend of climate likelihood and hazard severity into the aggregate score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub climate: f64,
    pub hazard: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            climate: 0.6,
            hazard: 0.4,
        }
    }
}

/// Data-source weights behind the 0-100 confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub cckp_temperature: f64,
    pub cckp_precipitation: f64,
    pub cckp_tasmax: f64,
    pub thinkhazard_flood: f64,
    pub thinkhazard_drought: f64,
    pub nasa_power_cdd: f64,
    pub nasa_power_extreme_heat: f64,
    pub firms_wildfire: f64,
    /// Score at or above which confidence is High.
    pub high_threshold: f64,
    /// Score at or above which confidence is Medium.
    pub medium_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            cckp_temperature: 20.0,
            cckp_precipitation: 20.0,
            cckp_tasmax: 10.0,
            thinkhazard_flood: 10.0,
            thinkhazard_drought: 10.0,
            nasa_power_cdd: 15.0,
            nasa_power_extreme_heat: 10.0,
            firms_wildfire: 5.0,
            high_threshold: 80.0,
            medium_threshold: 50.0,
        }
    }
}

impl ConfidenceConfig {
    pub fn total_weight(&self) -> f64 {
        self.cckp_temperature
            + self.cckp_precipitation
            + self.cckp_tasmax
            + self.thinkhazard_flood
            + self.thinkhazard_drought
            + self.nasa_power_cdd
            + self.nasa_power_extreme_heat
            + self.firms_wildfire
    }
}

/// CLI-level overrides (highest precedence). `None` leaves the value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub n_simulations: Option<usize>,
    pub std_dev_yield_loss: Option<f64>,
    pub seed: Option<u64>,
    pub correlation: Option<f64>,
    pub stress_factor: Option<f64>,
}

impl Config {
    /// Parse a (possibly partial) YAML config. Missing fields keep defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(yaml)?;
        Ok(cfg)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| RiskError::io(path, e))?;
        Self::from_yaml_str(&contents)
    }

    /// Defaults, then the optional YAML file, then environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut cfg = match file {
            Some(p) => {
                info!(path = %p.display(), "loading config file");
                Self::from_yaml_file(p)?
            }
            None => Config::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Apply CANERISK_* environment overrides.
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn apply_env(&mut self) {
        let mc = &mut self.monte_carlo;
        env_override(ENV_N_SIMULATIONS, &mut mc.n_simulations);
        env_override(ENV_STD_DEV_YIELD_LOSS, &mut mc.std_dev_yield_loss);
        env_override(ENV_MEAN_LOSS_FACTOR, &mut mc.mean_loss_factor);
        env_override(ENV_CORRELATION, &mut mc.correlation);
        env_override(ENV_STRESS_FACTOR, &mut mc.stress_factor);
        env_override(ENV_SEED, &mut mc.seed);
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        let mc = &mut self.monte_carlo;
        if let Some(v) = o.n_simulations {
            mc.n_simulations = v;
        }
        if let Some(v) = o.std_dev_yield_loss {
            mc.std_dev_yield_loss = v;
        }
        if let Some(v) = o.seed {
            mc.seed = v;
        }
        if let Some(v) = o.correlation {
            mc.correlation = v;
        }
        if let Some(v) = o.stress_factor {
            mc.stress_factor = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mc = &self.monte_carlo;
        if mc.n_simulations == 0 {
            return Err(RiskError::validation(
                "monte_carlo.n_simulations",
                "must be >= 1",
            ));
        }
        if !mc.std_dev_yield_loss.is_finite() || mc.std_dev_yield_loss < 0.0 {
            return Err(RiskError::validation(
                "monte_carlo.std_dev_yield_loss",
                format!("must be finite and >= 0, got {}", mc.std_dev_yield_loss),
            ));
        }
        if !(0.0..=100.0).contains(&mc.mean_loss_factor) {
            return Err(RiskError::validation(
                "monte_carlo.mean_loss_factor",
                format!("must be within [0, 100], got {}", mc.mean_loss_factor),
            ));
        }
        if !(-1.0..=1.0).contains(&mc.correlation) {
            return Err(RiskError::validation(
                "monte_carlo.correlation",
                format!("must be within [-1, 1], got {}", mc.correlation),
            ));
        }
        if !(mc.stress_factor.is_finite() && mc.stress_factor > 0.0) {
            return Err(RiskError::validation(
                "monte_carlo.stress_factor",
                format!("must be > 0, got {}", mc.stress_factor),
            ));
        }
        let w = &self.risk_weights;
        if w.climate < 0.0 || w.hazard < 0.0 {
            return Err(RiskError::validation(
                "risk_weights",
                "weights must be non-negative",
            ));
        }
        let thresholds = [
            ("climate.temp_change", self.climate.temp_change),
            ("climate.temp_max_change", self.climate.temp_max_change),
            ("climate.precipitation_change", self.climate.precipitation_change),
            ("agro.consecutive_dry_days", self.agro.consecutive_dry_days),
            ("agro.extreme_heat_days", self.agro.extreme_heat_days),
            (
                "agro.growing_degree_days_change",
                self.agro.growing_degree_days_change,
            ),
            ("agro.solar_radiation_change", self.agro.solar_radiation_change),
        ];
        for (field, t) in thresholds {
            if t.high < t.medium {
                return Err(RiskError::validation(
                    field,
                    format!("high ({}) must be >= medium ({})", t.high, t.medium),
                ));
            }
        }
        if self.hazard.severity_normaliser <= 0.0 {
            return Err(RiskError::validation(
                "hazard.severity_normaliser",
                "must be > 0",
            ));
        }
        Ok(())
    }

    /// Stable FNV-1a hash of the resolved config, for run headers.
    pub fn fingerprint(&self) -> u64 {
        fnv1a64(&format!("{self:?}"))
    }
}

fn env_override<T>(name: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            *slot = v;
            info!("[config] {name} = {slot} (overrode default)");
        }
        Err(_) => {
            warn!("[config] could not parse {name} = {raw:?}; using default {slot}");
        }
    }
}

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.monte_carlo.n_simulations, 10_000);
        assert_eq!(cfg.hazard.weights.get("DR"), Some(&0.30));
    }

    #[test]
    fn threshold_points_are_strict() {
        let t = Threshold::new(2.5, 1.5);
        assert_eq!(t.points(1.5), 0);
        assert_eq!(t.points(1.6), 1);
        assert_eq!(t.points(2.5), 1);
        assert_eq!(t.points(2.51), 2);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "monte_carlo:\n  n_simulations: 500\n  seed: 7\n";
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.monte_carlo.n_simulations, 500);
        assert_eq!(cfg.monte_carlo.seed, 7);
        assert_eq!(cfg.monte_carlo.std_dev_yield_loss, 15.0);
        assert_eq!(cfg.risk_weights.climate, 0.6);
    }

    #[test]
    fn validate_rejects_zero_simulations() {
        let mut cfg = Config::default();
        cfg.monte_carlo.n_simulations = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("n_simulations"));
    }

    #[test]
    fn validate_rejects_inverted_threshold() {
        let mut cfg = Config::default();
        cfg.agro.extreme_heat_days = Threshold::new(10.0, 20.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = Config::default();
        cfg.apply_overrides(&Overrides {
            n_simulations: Some(123),
            correlation: Some(0.5),
            ..Overrides::default()
        });
        assert_eq!(cfg.monte_carlo.n_simulations, 123);
        assert_eq!(cfg.monte_carlo.correlation, 0.5);
        assert_eq!(cfg.monte_carlo.seed, 42);
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.monte_carlo.seed = 43;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
