// src/scoring.rs
//
// Pure scoring functions: climate likelihood (0-5) from projected CCKP
// changes, hazard severity (0-5) from ThinkHazard levels, agro-met
// indicators, aggregate / weighted risk, risk categories and data
// confidence. No I/O.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AgroThresholds, ClimateThresholds, ConfidenceConfig, HazardConfig, RiskWeights};

/// Upper bound of every 0-5 score in this module.
pub const MAX_SCORE: f64 = 5.0;

// ============================================================================
// Observations
// ============================================================================

/// Annual climatology means for one period / scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateMeans {
    /// Mean near-surface temperature, °C.
    pub tas: Option<f64>,
    /// Mean daily maximum temperature, °C.
    pub tasmax: Option<f64>,
    /// Precipitation, mm.
    pub pr: Option<f64>,
}

/// Baseline (1995-2014 historical) vs future (2040-2059 SSP5-8.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateProjection {
    pub baseline: ClimateMeans,
    pub future: ClimateMeans,
}

/// Agricultural meteorology indicators (NASA POWER style).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgroIndicators {
    pub t2m: Option<f64>,
    pub t2m_max: Option<f64>,
    pub precipitation_mm_day: Option<f64>,
    pub consecutive_dry_days: Option<f64>,
    pub extreme_heat_days: Option<f64>,
    pub growing_degree_days_change_pct: Option<f64>,
    pub solar_radiation_change_pct: Option<f64>,
}

impl AgroIndicators {
    fn has_scored_indicator(&self) -> bool {
        self.consecutive_dry_days.is_some()
            || self.extreme_heat_days.is_some()
            || self.growing_degree_days_change_pct.is_some()
            || self.solar_radiation_change_pct.is_some()
    }
}

// ============================================================================
// Hazards
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HazardLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl HazardLevel {
    /// Parse a ThinkHazard level mnemonic (HIG / MED / LOW / VLO).
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIG" => Some(HazardLevel::High),
            "MED" => Some(HazardLevel::Medium),
            "LOW" => Some(HazardLevel::Low),
            "VLO" => Some(HazardLevel::VeryLow),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            HazardLevel::High => "HIG",
            HazardLevel::Medium => "MED",
            HazardLevel::Low => "LOW",
            HazardLevel::VeryLow => "VLO",
        }
    }

    pub fn score(&self, cfg: &HazardConfig) -> f64 {
        match self {
            HazardLevel::High => cfg.score_high,
            HazardLevel::Medium => cfg.score_medium,
            HazardLevel::Low => cfg.score_low,
            HazardLevel::VeryLow => cfg.score_very_low,
        }
    }
}

/// Score for a raw level string; unknown or missing levels score 0.
pub fn level_score(level: &str, cfg: &HazardConfig) -> f64 {
    HazardLevel::from_mnemonic(level)
        .map(|l| l.score(cfg))
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HazardType {
    RiverFlood,
    Earthquake,
    Landslide,
    Wildfire,
    Drought,
    Cyclone,
    UrbanFlood,
    CoastalFlood,
    Tsunami,
    Volcano,
    ExtremeHeat,
}

impl HazardType {
    pub const ALL: [HazardType; 11] = [
        HazardType::RiverFlood,
        HazardType::Earthquake,
        HazardType::Landslide,
        HazardType::Wildfire,
        HazardType::Drought,
        HazardType::Cyclone,
        HazardType::UrbanFlood,
        HazardType::CoastalFlood,
        HazardType::Tsunami,
        HazardType::Volcano,
        HazardType::ExtremeHeat,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            HazardType::RiverFlood => "FL",
            HazardType::Earthquake => "EQ",
            HazardType::Landslide => "LS",
            HazardType::Wildfire => "WF",
            HazardType::Drought => "DR",
            HazardType::Cyclone => "CY",
            HazardType::UrbanFlood => "UF",
            HazardType::CoastalFlood => "CF",
            HazardType::Tsunami => "TS",
            HazardType::Volcano => "VO",
            HazardType::ExtremeHeat => "EH",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        let key = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|h| h.mnemonic() == key)
    }

    pub fn name(&self) -> &'static str {
        match self {
            HazardType::RiverFlood => "River Flood",
            HazardType::Earthquake => "Earthquake",
            HazardType::Landslide => "Landslide",
            HazardType::Wildfire => "Wildfire",
            HazardType::Drought => "Drought",
            HazardType::Cyclone => "Cyclone",
            HazardType::UrbanFlood => "Urban Flood",
            HazardType::CoastalFlood => "Coastal Flood",
            HazardType::Tsunami => "Tsunami",
            HazardType::Volcano => "Volcano",
            HazardType::ExtremeHeat => "Extreme Heat",
        }
    }
}

/// Display name for a hazard mnemonic; unknown mnemonics echo back.
pub fn hazard_name(mnemonic: &str) -> String {
    HazardType::from_mnemonic(mnemonic)
        .map(|h| h.name().to_string())
        .unwrap_or_else(|| mnemonic.to_string())
}

// ============================================================================
// Climate likelihood
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimateScore {
    /// 0..=5.
    pub score: u8,
    pub temp_change: Option<f64>,
    pub temp_max_change: Option<f64>,
    pub precip_change_pct: Option<f64>,
}

/// Climate likelihood from projected changes.
///
/// Each of tas, tasmax and pr contributes 2 points above its high
/// threshold, 1 above medium. Precipitation uses the absolute percent
/// change and is skipped when the baseline is zero. Capped at 5.
pub fn climate_likelihood(p: &ClimateProjection, cfg: &ClimateThresholds) -> ClimateScore {
    let mut out = ClimateScore::default();
    let mut points: u8 = 0;

    if let (Some(h), Some(f)) = (p.baseline.tas, p.future.tas) {
        let change = f - h;
        out.temp_change = Some(change);
        points += cfg.temp_change.points(change);
    }

    if let (Some(h), Some(f)) = (p.baseline.tasmax, p.future.tasmax) {
        let change = f - h;
        out.temp_max_change = Some(change);
        points += cfg.temp_max_change.points(change);
    }

    if let (Some(h), Some(f)) = (p.baseline.pr, p.future.pr) {
        if h != 0.0 {
            let pct = (f - h) / h * 100.0;
            out.precip_change_pct = Some(pct);
            points += cfg.precipitation_change.points(pct.abs());
        }
    }

    out.score = points.min(MAX_SCORE as u8);
    out
}

/// Agro-met score: +2 / +1 per indicator against its thresholds, capped at 5.
/// `None` when no scored indicator is present.
pub fn agro_climate_score(a: &AgroIndicators, cfg: &AgroThresholds) -> Option<u8> {
    if !a.has_scored_indicator() {
        return None;
    }
    let mut points: u8 = 0;
    if let Some(v) = a.consecutive_dry_days {
        points += cfg.consecutive_dry_days.points(v);
    }
    if let Some(v) = a.extreme_heat_days {
        points += cfg.extreme_heat_days.points(v);
    }
    if let Some(v) = a.growing_degree_days_change_pct {
        points += cfg.growing_degree_days_change.points(v.abs());
    }
    if let Some(v) = a.solar_radiation_change_pct {
        points += cfg.solar_radiation_change.points(v.abs());
    }
    Some(points.min(MAX_SCORE as u8))
}

/// Blend the CCKP likelihood with the agro-met score (70 / 30).
pub fn enhanced_climate_likelihood(base: u8, agro: Option<u8>) -> u8 {
    match agro {
        Some(a) => {
            let blended = 0.7 * base as f64 + 0.3 * a as f64;
            (blended.round() as u8).min(MAX_SCORE as u8)
        }
        None => base,
    }
}

// ============================================================================
// Hazard severity
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardScore {
    /// 0..=5.
    pub severity: u8,
    /// Per-hazard level score, keyed by mnemonic.
    pub individual: BTreeMap<String, f64>,
}

/// Sum the level scores and map `total / normaliser` onto 0-5 (truncating).
pub fn hazard_severity(hazards: &BTreeMap<String, String>, cfg: &HazardConfig) -> HazardScore {
    let mut individual = BTreeMap::new();
    let mut total = 0.0;
    for (hazard, level) in hazards {
        let s = level_score(level, cfg);
        individual.insert(hazard.clone(), s);
        total += s;
    }

    let severity = if total > 0.0 {
        ((total / cfg.severity_normaliser * MAX_SCORE).floor() as u8).min(MAX_SCORE as u8)
    } else {
        0
    };

    HazardScore {
        severity,
        individual,
    }
}

/// Relevance-weighted hazard index on 0-5.
///
/// Weighted mean of level scores over hazards with a configured weight,
/// rescaled from the HIG score to 5. Zero when nothing is weighted.
pub fn weighted_hazard_index(hazards: &BTreeMap<String, String>, cfg: &HazardConfig) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for (hazard, level) in hazards {
        let key = hazard.trim().to_ascii_uppercase();
        if let Some(w) = cfg.weights.get(&key) {
            num += w * level_score(level, cfg);
            den += w;
        }
    }
    if den <= 0.0 || cfg.score_high <= 0.0 {
        return 0.0;
    }
    (num / den / cfg.score_high * MAX_SCORE).min(MAX_SCORE)
}

// ============================================================================
// Aggregation and categories
// ============================================================================

/// `min(climate * w_c + hazard * w_h, 5)`.
pub fn aggregate_risk(climate_likelihood: f64, hazard_severity: f64, w: &RiskWeights) -> f64 {
    (climate_likelihood * w.climate + hazard_severity * w.hazard).min(MAX_SCORE)
}

/// Likelihood x impact.
pub fn weighted_risk(likelihood: f64, impact: f64) -> f64 {
    likelihood * impact
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    VeryLow,
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn from_score(score: f64, max_score: f64) -> Self {
        if max_score == 0.0 {
            return RiskCategory::VeryLow;
        }
        let normalized = score / max_score;
        if normalized >= 0.7 {
            RiskCategory::High
        } else if normalized >= 0.4 {
            RiskCategory::Medium
        } else if normalized >= 0.15 {
            RiskCategory::Low
        } else {
            RiskCategory::VeryLow
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskCategory::High => "High",
            RiskCategory::Medium => "Medium",
            RiskCategory::Low => "Low",
            RiskCategory::VeryLow => "Very Low",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RiskCategory::High => "#d62728",
            RiskCategory::Medium => "#ff7f0e",
            RiskCategory::Low => "#2ca02c",
            RiskCategory::VeryLow => "#98df8a",
        }
    }
}

// ============================================================================
// Confidence
// ============================================================================

/// Which data sources produced usable values for a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub cckp_temperature: bool,
    pub cckp_precipitation: bool,
    pub cckp_tasmax: bool,
    pub thinkhazard_flood: bool,
    pub thinkhazard_drought: bool,
    pub nasa_power_cdd: bool,
    pub nasa_power_extreme_heat: bool,
    pub firms_wildfire: bool,
}

impl DataSources {
    pub fn from_observations(
        projection: Option<&ClimateProjection>,
        hazards: &BTreeMap<String, String>,
        agro: Option<&AgroIndicators>,
        fire_detections: Option<u32>,
    ) -> Self {
        let both = |b: Option<f64>, f: Option<f64>| b.is_some() && f.is_some();
        let has_hazard = |m: &str| {
            hazards
                .iter()
                .any(|(k, v)| k.eq_ignore_ascii_case(m) && HazardLevel::from_mnemonic(v).is_some())
        };
        Self {
            cckp_temperature: projection.is_some_and(|p| both(p.baseline.tas, p.future.tas)),
            cckp_precipitation: projection.is_some_and(|p| both(p.baseline.pr, p.future.pr)),
            cckp_tasmax: projection.is_some_and(|p| both(p.baseline.tasmax, p.future.tasmax)),
            thinkhazard_flood: has_hazard("FL"),
            thinkhazard_drought: has_hazard("DR"),
            nasa_power_cdd: agro.is_some_and(|a| a.consecutive_dry_days.is_some()),
            nasa_power_extreme_heat: agro.is_some_and(|a| a.extreme_heat_days.is_some()),
            firms_wildfire: fire_detections.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// 0..=100.
    pub score: f64,
    pub level: ConfidenceLevel,
}

/// Share of the total source weight (in percent) backed by available data.
pub fn confidence(sources: &DataSources, cfg: &ConfidenceConfig) -> Confidence {
    let total = cfg.total_weight();
    let parts = [
        (sources.cckp_temperature, cfg.cckp_temperature),
        (sources.cckp_precipitation, cfg.cckp_precipitation),
        (sources.cckp_tasmax, cfg.cckp_tasmax),
        (sources.thinkhazard_flood, cfg.thinkhazard_flood),
        (sources.thinkhazard_drought, cfg.thinkhazard_drought),
        (sources.nasa_power_cdd, cfg.nasa_power_cdd),
        (sources.nasa_power_extreme_heat, cfg.nasa_power_extreme_heat),
        (sources.firms_wildfire, cfg.firms_wildfire),
    ];
    let have: f64 = parts.iter().filter(|(ok, _)| *ok).map(|(_, w)| w).sum();
    let score = if total > 0.0 {
        (have / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let level = if score >= cfg.high_threshold {
        ConfidenceLevel::High
    } else if score >= cfg.medium_threshold {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };
    Confidence { score, level }
}
