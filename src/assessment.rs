// src/assessment.rs
//
// Per-location risk rows built from cached observations, the portfolio
// summary over those rows, and the impact sensitivity analysis.
//
// Rows are always ordered by aggregate weighted risk, highest first; the
// sort is stable so ties keep cache order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CachedLocation, RiskDataCache};
use crate::config::Config;
use crate::error::{Result, RiskError};
use crate::location::{location_key, thinkhazard_division, Location, LocationKind};
use crate::monte_carlo::SimulationInput;
use crate::portfolio::PortfolioMetrics;
use crate::scoring::{
    agro_climate_score, aggregate_risk, climate_likelihood, confidence,
    enhanced_climate_likelihood, hazard_severity, weighted_hazard_index, weighted_risk,
    ClimateScore, Confidence, ConfidenceLevel, DataSources, RiskCategory, MAX_SCORE,
};

/// Scores at or above this count as "high" in the summary.
pub const HIGH_SCORE: f64 = 4.0;

const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRisk {
    pub location: String,
    pub kind: LocationKind,
    pub state: Option<String>,
    pub state_name: Option<String>,
    pub thinkhazard_division: Option<String>,

    /// CCKP-based likelihood, 0-5. Drives the simulation.
    pub climate_likelihood: u8,
    /// Likelihood blended with agro-met indicators, 0-5.
    pub enhanced_climate_likelihood: u8,
    pub agro_score: Option<u8>,
    pub temp_change: Option<f64>,
    pub temp_max_change: Option<f64>,
    pub precip_change_pct: Option<f64>,

    pub hazards: BTreeMap<String, String>,
    pub hazard_severity: u8,
    pub hazard_scores: BTreeMap<String, f64>,
    pub weighted_hazard_index: f64,

    pub impact_percent: f64,
    /// `impact_percent * 100`.
    pub impact_score: f64,
    pub climate_weighted_risk: f64,
    pub hazard_weighted_risk: f64,
    pub aggregate_risk: f64,
    pub aggregate_weighted_risk: f64,

    pub climate_category: RiskCategory,
    pub hazard_category: RiskCategory,
    pub aggregate_category: RiskCategory,
    pub confidence: Confidence,
}

impl LocationRisk {
    fn set_impact(&mut self, impact_percent: f64) {
        self.impact_percent = impact_percent;
        self.impact_score = impact_percent * 100.0;
        self.climate_weighted_risk = weighted_risk(self.climate_likelihood as f64, self.impact_score);
        self.hazard_weighted_risk = weighted_risk(self.hazard_severity as f64, self.impact_score);
        self.aggregate_weighted_risk = weighted_risk(self.aggregate_risk, self.impact_score);
    }

    pub fn simulation_input(&self) -> SimulationInput {
        SimulationInput {
            location: self.location.clone(),
            kind: self.kind,
            climate_likelihood: self.climate_likelihood as f64,
            impact_percent: self.impact_percent,
        }
    }
}

pub fn assess_location(entry: &CachedLocation, cfg: &Config) -> LocationRisk {
    let loc: Location = entry.to_location();

    let climate = entry
        .projection
        .as_ref()
        .map(|p| climate_likelihood(p, &cfg.climate))
        .unwrap_or_else(ClimateScore::default);
    let agro = entry
        .agro
        .as_ref()
        .and_then(|a| agro_climate_score(a, &cfg.agro));
    let hazard = hazard_severity(&entry.hazards, &cfg.hazard);
    let aggregate = aggregate_risk(
        climate.score as f64,
        hazard.severity as f64,
        &cfg.risk_weights,
    );
    let sources = DataSources::from_observations(
        entry.projection.as_ref(),
        &entry.hazards,
        entry.agro.as_ref(),
        entry.fire_detections,
    );

    let mut row = LocationRisk {
        thinkhazard_division: thinkhazard_division(&loc.name, entry.adm_code.as_deref()),
        state_name: loc.state_name().map(str::to_string),
        location: loc.name,
        kind: loc.kind,
        state: loc.state,

        climate_likelihood: climate.score,
        enhanced_climate_likelihood: enhanced_climate_likelihood(climate.score, agro),
        agro_score: agro,
        temp_change: climate.temp_change,
        temp_max_change: climate.temp_max_change,
        precip_change_pct: climate.precip_change_pct,

        hazards: entry.hazards.clone(),
        hazard_severity: hazard.severity,
        hazard_scores: hazard.individual,
        weighted_hazard_index: weighted_hazard_index(&entry.hazards, &cfg.hazard),

        impact_percent: 0.0,
        impact_score: 0.0,
        climate_weighted_risk: 0.0,
        hazard_weighted_risk: 0.0,
        aggregate_risk: aggregate,
        aggregate_weighted_risk: 0.0,

        climate_category: RiskCategory::from_score(climate.score as f64, MAX_SCORE),
        hazard_category: RiskCategory::from_score(hazard.severity as f64, MAX_SCORE),
        aggregate_category: RiskCategory::from_score(aggregate, MAX_SCORE),
        confidence: confidence(&sources, &cfg.confidence),
    };
    row.set_impact(entry.impact_percent);
    row
}

/// Score every cached location, highest aggregate weighted risk first.
pub fn assess(cache: &RiskDataCache, cfg: &Config) -> Vec<LocationRisk> {
    let mut rows: Vec<LocationRisk> = cache
        .locations
        .iter()
        .map(|e| assess_location(e, cfg))
        .collect();
    sort_by_weighted_risk(&mut rows);
    debug!(locations = rows.len(), "assessed locations");
    rows
}

fn sort_by_weighted_risk(rows: &mut [LocationRisk]) {
    rows.sort_by(|a, b| b.aggregate_weighted_risk.total_cmp(&a.aggregate_weighted_risk));
}

// ============================================================================
// Portfolio summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskHighlight {
    pub location: String,
    pub kind: LocationKind,
    pub score: f64,
    pub weighted_risk: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_locations: usize,
    pub num_clients: usize,
    pub num_suppliers: usize,

    pub avg_climate_likelihood: f64,
    pub max_climate_likelihood: u8,
    pub high_climate_risk_count: usize,

    pub avg_hazard_severity: f64,
    pub max_hazard_severity: u8,
    pub high_hazard_risk_count: usize,

    pub avg_aggregate_risk: f64,
    pub high_aggregate_risk_count: usize,

    pub total_climate_weighted_risk: f64,
    pub total_hazard_weighted_risk: f64,
    pub total_aggregate_weighted_risk: f64,

    pub top_5_climate_risks: Vec<RiskHighlight>,
    pub top_5_aggregate_risks: Vec<RiskHighlight>,

    /// `None` when there are no clients.
    pub client_avg_risk: Option<f64>,
    /// `None` when there are no suppliers.
    pub supplier_avg_risk: Option<f64>,
    pub client_total_weighted_risk: f64,
    pub supplier_total_weighted_risk: f64,

    pub high_confidence_count: usize,
    pub medium_confidence_count: usize,
    pub low_confidence_count: usize,
    pub avg_confidence: f64,

    pub monte_carlo: Option<PortfolioMetrics>,
}

fn mean(xs: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = xs.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn top_by<F, G>(rows: &[LocationRisk], key: F, score: G) -> Vec<RiskHighlight>
where
    F: Fn(&LocationRisk) -> f64,
    G: Fn(&LocationRisk) -> f64,
{
    let mut sorted: Vec<&LocationRisk> = rows.iter().collect();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)));
    sorted
        .into_iter()
        .take(TOP_N)
        .map(|r| RiskHighlight {
            location: r.location.clone(),
            kind: r.kind,
            score: score(r),
            weighted_risk: key(r),
        })
        .collect()
}

pub fn portfolio_summary(rows: &[LocationRisk], mc: Option<&PortfolioMetrics>) -> PortfolioSummary {
    let of_kind = |k: LocationKind| rows.iter().filter(move |r| r.kind == k);
    let count_conf = |lvl: ConfidenceLevel| rows.iter().filter(|r| r.confidence.level == lvl).count();

    PortfolioSummary {
        total_locations: rows.len(),
        num_clients: of_kind(LocationKind::Client).count(),
        num_suppliers: of_kind(LocationKind::Supplier).count(),

        avg_climate_likelihood: mean(rows.iter().map(|r| r.climate_likelihood as f64)).unwrap_or(0.0),
        max_climate_likelihood: rows.iter().map(|r| r.climate_likelihood).max().unwrap_or(0),
        high_climate_risk_count: rows
            .iter()
            .filter(|r| r.climate_likelihood as f64 >= HIGH_SCORE)
            .count(),

        avg_hazard_severity: mean(rows.iter().map(|r| r.hazard_severity as f64)).unwrap_or(0.0),
        max_hazard_severity: rows.iter().map(|r| r.hazard_severity).max().unwrap_or(0),
        high_hazard_risk_count: rows
            .iter()
            .filter(|r| r.hazard_severity as f64 >= HIGH_SCORE)
            .count(),

        avg_aggregate_risk: mean(rows.iter().map(|r| r.aggregate_risk)).unwrap_or(0.0),
        high_aggregate_risk_count: rows.iter().filter(|r| r.aggregate_risk >= HIGH_SCORE).count(),

        total_climate_weighted_risk: rows.iter().map(|r| r.climate_weighted_risk).sum(),
        total_hazard_weighted_risk: rows.iter().map(|r| r.hazard_weighted_risk).sum(),
        total_aggregate_weighted_risk: rows.iter().map(|r| r.aggregate_weighted_risk).sum(),

        top_5_climate_risks: top_by(
            rows,
            |r| r.climate_weighted_risk,
            |r| r.climate_likelihood as f64,
        ),
        top_5_aggregate_risks: top_by(rows, |r| r.aggregate_weighted_risk, |r| r.aggregate_risk),

        client_avg_risk: mean(of_kind(LocationKind::Client).map(|r| r.aggregate_risk)),
        supplier_avg_risk: mean(of_kind(LocationKind::Supplier).map(|r| r.aggregate_risk)),
        client_total_weighted_risk: of_kind(LocationKind::Client)
            .map(|r| r.aggregate_weighted_risk)
            .sum(),
        supplier_total_weighted_risk: of_kind(LocationKind::Supplier)
            .map(|r| r.aggregate_weighted_risk)
            .sum(),

        high_confidence_count: count_conf(ConfidenceLevel::High),
        medium_confidence_count: count_conf(ConfidenceLevel::Medium),
        low_confidence_count: count_conf(ConfidenceLevel::Low),
        avg_confidence: mean(rows.iter().map(|r| r.confidence.score)).unwrap_or(0.0),

        monte_carlo: mc.cloned(),
    }
}

// ============================================================================
// Sensitivity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityAnalysis {
    pub stressed_client: String,
    pub stress_factor: f64,
    pub baseline_impact: f64,
    pub stressed_impact: f64,
    pub baseline_weighted_risk: f64,
    pub stressed_weighted_risk: f64,
    pub baseline_top_risk: String,
    pub new_top_risk: String,
    /// Whether the top location after stressing is not the stressed client.
    pub ranking_changed: bool,
    /// Rows after stressing, re-sorted.
    #[serde(skip)]
    pub stressed_rows: Vec<LocationRisk>,
}

/// Multiply one client's impact by `stress_factor` and re-rank.
///
/// The stressed client is `target` when given, else the highest-ranked
/// client in `rows` (which are expected in ranking order). `Ok(None)`
/// when there are no clients.
pub fn sensitivity_analysis(
    rows: &[LocationRisk],
    stress_factor: f64,
    target: Option<&str>,
) -> Result<Option<SensitivityAnalysis>> {
    let target_key = target.map(location_key);
    let is_target = |r: &LocationRisk| match &target_key {
        Some(key) => location_key(&r.location) == *key,
        None => true,
    };
    let Some(idx) = rows
        .iter()
        .position(|r| r.kind == LocationKind::Client && is_target(r))
    else {
        return match target {
            Some(t) => Err(RiskError::UnknownLocation(t.to_string())),
            None => Ok(None),
        };
    };

    let baseline = &rows[idx];
    let baseline_top_risk = rows
        .first()
        .map(|r| r.location.clone())
        .unwrap_or_default();

    let mut stressed_rows = rows.to_vec();
    stressed_rows[idx].set_impact(baseline.impact_percent * stress_factor);
    let stressed_impact = stressed_rows[idx].impact_score;
    let stressed_weighted_risk = stressed_rows[idx].aggregate_weighted_risk;
    sort_by_weighted_risk(&mut stressed_rows);

    let new_top_risk = stressed_rows
        .first()
        .map(|r| r.location.clone())
        .unwrap_or_default();

    Ok(Some(SensitivityAnalysis {
        stressed_client: baseline.location.clone(),
        stress_factor,
        baseline_impact: baseline.impact_score,
        stressed_impact,
        baseline_weighted_risk: baseline.aggregate_weighted_risk,
        stressed_weighted_risk,
        ranking_changed: new_top_risk != baseline.location,
        baseline_top_risk,
        new_top_risk,
        stressed_rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ClimateMeans, ClimateProjection};

    fn entry(name: &str, kind: LocationKind, impact: f64, warming: f64, flood: &str) -> CachedLocation {
        let mut e = CachedLocation::empty(&Location::new(name, kind, impact));
        e.projection = Some(ClimateProjection {
            baseline: ClimateMeans {
                tas: Some(22.0),
                tasmax: Some(28.0),
                pr: Some(1200.0),
            },
            future: ClimateMeans {
                tas: Some(22.0 + warming),
                tasmax: Some(28.0 + warming),
                pr: Some(1200.0),
            },
        });
        e.hazards.insert("FL".into(), flood.into());
        e
    }

    fn cache(entries: Vec<CachedLocation>) -> RiskDataCache {
        RiskDataCache {
            locations: entries,
            ..RiskDataCache::default()
        }
    }

    #[test]
    fn assess_location_scores_and_weights() {
        let cfg = Config::default();
        // +3 °C on both temps -> 2 + 1 = 3; FL HIG -> floor(3/15*5) = 1.
        let e = entry("Itapura/SP", LocationKind::Client, 0.08, 3.0, "HIG");
        let r = assess_location(&e, &cfg);
        assert_eq!(r.location, "ITAPURA/SP");
        assert_eq!(r.state_name.as_deref(), Some("Sao Paulo"));
        assert_eq!(r.thinkhazard_division.as_deref(), Some("3598"));
        assert_eq!(r.climate_likelihood, 3);
        assert_eq!(r.hazard_severity, 1);
        assert!((r.aggregate_risk - 2.2).abs() < 1e-12);
        assert!((r.impact_score - 8.0).abs() < 1e-12);
        assert!((r.climate_weighted_risk - 24.0).abs() < 1e-9);
        assert!((r.aggregate_weighted_risk - 17.6).abs() < 1e-9);
        assert_eq!(r.climate_category, RiskCategory::Medium);
        assert_eq!(r.hazard_category, RiskCategory::Low);
        assert_eq!(r.aggregate_category, RiskCategory::Medium);
        assert_eq!(r.agro_score, None);
        assert_eq!(r.enhanced_climate_likelihood, 3);
    }

    #[test]
    fn empty_observations_score_zero() {
        let cfg = Config::default();
        let e = CachedLocation::empty(&Location::new("X/ZZ", LocationKind::Supplier, 0.5));
        let r = assess_location(&e, &cfg);
        assert_eq!(r.climate_likelihood, 0);
        assert_eq!(r.hazard_severity, 0);
        assert_eq!(r.aggregate_weighted_risk, 0.0);
        assert_eq!(r.aggregate_category, RiskCategory::VeryLow);
        assert_eq!(r.confidence.level, ConfidenceLevel::Low);
        assert_eq!(r.thinkhazard_division, None);
    }

    #[test]
    fn assess_sorts_descending_and_stable() {
        let cfg = Config::default();
        let c = cache(vec![
            entry("A/SP", LocationKind::Client, 0.01, 3.0, "HIG"),
            entry("B/SP", LocationKind::Client, 0.05, 3.0, "HIG"),
            entry("C/SP", LocationKind::Supplier, 0.05, 3.0, "HIG"),
        ]);
        let rows = assess(&c, &cfg);
        let names: Vec<&str> = rows.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(names, ["B/SP", "C/SP", "A/SP"]);
    }

    #[test]
    fn summary_counts_and_segments() {
        let cfg = Config::default();
        let c = cache(vec![
            entry("A/SP", LocationKind::Client, 0.10, 4.0, "HIG"),
            entry("B/GO", LocationKind::Client, 0.05, 0.0, "LOW"),
            entry("C/PR", LocationKind::Supplier, 0.50, 1.0, "MED"),
        ]);
        let rows = assess(&c, &cfg);
        let s = portfolio_summary(&rows, None);
        assert_eq!(s.total_locations, 3);
        assert_eq!(s.num_clients, 2);
        assert_eq!(s.num_suppliers, 1);
        // A: 2 + 2 = 4 (high), B: 0, C: 0.
        assert_eq!(s.max_climate_likelihood, 4);
        assert_eq!(s.high_climate_risk_count, 1);
        assert_eq!(s.top_5_climate_risks[0].location, "A/SP");
        assert!(s.supplier_avg_risk.is_some());
        assert!(s.monte_carlo.is_none());
        let total: f64 = rows.iter().map(|r| r.aggregate_weighted_risk).sum();
        assert!((s.client_total_weighted_risk + s.supplier_total_weighted_risk - total).abs() < 1e-9);
    }

    #[test]
    fn summary_of_nothing() {
        let s = portfolio_summary(&[], None);
        assert_eq!(s.total_locations, 0);
        assert_eq!(s.avg_aggregate_risk, 0.0);
        assert_eq!(s.client_avg_risk, None);
        assert!(s.top_5_aggregate_risks.is_empty());
    }

    #[test]
    fn sensitivity_stresses_top_client() {
        let cfg = Config::default();
        let c = cache(vec![
            entry("SUP/SP", LocationKind::Supplier, 0.20, 3.0, "HIG"),
            entry("TOP/SP", LocationKind::Client, 0.15, 3.0, "HIG"),
            entry("LOW/SP", LocationKind::Client, 0.01, 3.0, "HIG"),
        ]);
        let rows = assess(&c, &cfg);
        assert_eq!(rows[0].location, "SUP/SP");

        let s = sensitivity_analysis(&rows, 1.5, None).unwrap().unwrap();
        assert_eq!(s.stressed_client, "TOP/SP");
        assert!((s.baseline_impact - 15.0).abs() < 1e-9);
        assert!((s.stressed_impact - 22.5).abs() < 1e-9);
        assert!((s.stressed_weighted_risk - 1.5 * s.baseline_weighted_risk).abs() < 1e-9);
        assert_eq!(s.baseline_top_risk, "SUP/SP");
        assert_eq!(s.new_top_risk, "TOP/SP");
        // The stressed client now holds the top spot.
        assert!(!s.ranking_changed);
        assert_eq!(s.stressed_rows[0].location, "TOP/SP");

        // A supplier still outranks the mildly stressed client.
        let mild = sensitivity_analysis(&rows, 1.1, None).unwrap().unwrap();
        assert_eq!(mild.new_top_risk, "SUP/SP");
        assert_eq!(mild.stressed_client, "TOP/SP");
        assert!(mild.ranking_changed);
    }

    #[test]
    fn sensitivity_named_target_and_edges() {
        let cfg = Config::default();
        let c = cache(vec![
            entry("TOP/SP", LocationKind::Client, 0.15, 3.0, "HIG"),
            entry("LOW/SP", LocationKind::Client, 0.01, 3.0, "HIG"),
        ]);
        let rows = assess(&c, &cfg);
        let s = sensitivity_analysis(&rows, 2.0, Some("low/sp")).unwrap().unwrap();
        assert_eq!(s.stressed_client, "LOW/SP");
        assert_eq!(s.new_top_risk, "TOP/SP");
        assert!(s.ranking_changed);

        let accented = cache(vec![
            entry("SERTÃOZINHO/SP", LocationKind::Client, 0.05, 3.0, "HIG"),
            entry("TOP/SP", LocationKind::Client, 0.15, 3.0, "HIG"),
        ]);
        let s = sensitivity_analysis(&assess(&accented, &cfg), 1.5, Some("Sertaozinho/sp"))
            .unwrap()
            .unwrap();
        assert_eq!(s.stressed_client, "SERTÃOZINHO/SP");

        let err = sensitivity_analysis(&rows, 2.0, Some("NOWHERE/XX")).unwrap_err();
        assert!(matches!(err, RiskError::UnknownLocation(_)));

        let suppliers = cache(vec![entry("S/SP", LocationKind::Supplier, 0.5, 1.0, "LOW")]);
        let rows = assess(&suppliers, &cfg);
        assert!(sensitivity_analysis(&rows, 1.5, None).unwrap().is_none());
    }

    #[test]
    fn simulation_input_carries_likelihood_and_impact() {
        let cfg = Config::default();
        let r = assess_location(&entry("A/SP", LocationKind::Client, 0.07, 3.0, "LOW"), &cfg);
        let i = r.simulation_input();
        assert_eq!(i.climate_likelihood, 3.0);
        assert_eq!(i.impact_percent, 0.07);
        assert_eq!(i.kind, LocationKind::Client);
    }
}
