// src/cache.rs
//
// JSON risk-data cache: the raw per-location observations (CCKP climate
// projections, ThinkHazard levels, agro-met indicators) that the scoring
// and simulation stages consume. An external collector fills it; this
// crate reads, validates, templates and rewrites it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RiskError};
use crate::location::{location_key, normalize_location_name, Location, LocationKind};
use crate::scoring::{AgroIndicators, ClimateProjection};

pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLocation {
    /// "CITY/UF", normalised on load.
    pub location: String,
    pub kind: LocationKind,
    pub impact_percent: f64,
    #[serde(default)]
    pub projection: Option<ClimateProjection>,
    /// Hazard mnemonic (FL, DR, ...) -> level mnemonic (HIG, MED, LOW, VLO).
    #[serde(default)]
    pub hazards: BTreeMap<String, String>,
    #[serde(default)]
    pub agro: Option<AgroIndicators>,
    /// Active-fire detections in the surrounding area, when collected.
    #[serde(default)]
    pub fire_detections: Option<u32>,
    /// Municipality (ADM2) ThinkHazard code, when known.
    #[serde(default)]
    pub adm_code: Option<String>,
}

impl CachedLocation {
    /// Entry with no observations.
    pub fn empty(location: &Location) -> Self {
        Self {
            location: location.name.clone(),
            kind: location.kind,
            impact_percent: location.impact_percent,
            projection: None,
            hazards: BTreeMap::new(),
            agro: None,
            fire_detections: None,
            adm_code: None,
        }
    }

    pub fn to_location(&self) -> Location {
        Location::new(&self.location, self.kind, self.impact_percent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDataCache {
    pub schema_version: u32,
    #[serde(default)]
    pub generated_by: String,
    pub locations: Vec<CachedLocation>,
}

impl Default for RiskDataCache {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            generated_by: generated_by(),
            locations: Vec::new(),
        }
    }
}

fn generated_by() -> String {
    format!("canerisk {}", env!("CARGO_PKG_VERSION"))
}

impl RiskDataCache {
    /// Template cache covering `locations`, with every observation empty.
    pub fn from_locations(locations: &[Location]) -> Result<Self> {
        let cache = Self {
            locations: locations.iter().map(CachedLocation::empty).collect(),
            ..Self::default()
        };
        cache.validate()?;
        Ok(cache)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut cache: RiskDataCache = serde_json::from_str(json)?;
        cache.normalize();
        cache.validate()?;
        Ok(cache)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| RiskError::io(path, e))?;
        let cache = Self::from_json_str(&text)?;
        debug!(
            path = %path.display(),
            locations = cache.locations.len(),
            "loaded risk cache"
        );
        Ok(cache)
    }

    /// Pretty JSON, written atomically (temp file in the same directory,
    /// then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        atomic_write(path, json.as_bytes())
    }

    /// First entry with this name (clients precede suppliers in templates).
    /// Names match by `location_key`, so accents are optional.
    pub fn get(&self, name: &str) -> Option<&CachedLocation> {
        let key = location_key(name);
        self.locations.iter().find(|l| location_key(&l.location) == key)
    }

    pub fn get_kind(&self, name: &str, kind: LocationKind) -> Option<&CachedLocation> {
        let key = location_key(name);
        self.locations
            .iter()
            .find(|l| l.kind == kind && location_key(&l.location) == key)
    }

    /// Replace the entry with the same key and kind, or append. A replaced
    /// entry keeps its stored spelling.
    pub fn upsert(&mut self, mut entry: CachedLocation) {
        entry.location = normalize_location_name(&entry.location);
        let key = location_key(&entry.location);
        match self
            .locations
            .iter_mut()
            .find(|l| l.kind == entry.kind && location_key(&l.location) == key)
        {
            Some(slot) => {
                entry.location = std::mem::take(&mut slot.location);
                *slot = entry;
            }
            None => self.locations.push(entry),
        }
    }

    fn normalize(&mut self) {
        for l in &mut self.locations {
            l.location = normalize_location_name(&l.location);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CACHE_SCHEMA_VERSION {
            return Err(RiskError::validation(
                "schema_version",
                format!(
                    "unsupported cache schema {} (expected {CACHE_SCHEMA_VERSION})",
                    self.schema_version
                ),
            ));
        }
        let mut seen = BTreeSet::new();
        for l in &self.locations {
            if l.location.is_empty() {
                return Err(RiskError::validation("location", "empty location name"));
            }
            if !seen.insert((location_key(&l.location), l.kind)) {
                return Err(RiskError::validation(
                    "location",
                    format!("duplicate location {}", l.location),
                ));
            }
            if !l.impact_percent.is_finite() || l.impact_percent < 0.0 {
                return Err(RiskError::validation(
                    "impact_percent",
                    format!("{}: must be finite and >= 0", l.location),
                ));
            }
        }
        Ok(())
    }
}

/// Write via a temp file and rename so readers never see a partial file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let temp_name = format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(temp_name);

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        RiskError::io(path, e)
    })
}
