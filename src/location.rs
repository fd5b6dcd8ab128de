// src/location.rs
//
// Named supply-chain locations ("CITY/UF" strings), their parsing and
// normalisation, and the built-in client / supplier registry.
//
// Impacts are fractions: a client's share of total royalties, a
// supplier's share of seedling supply.

use rand::Rng;
use rand_distr::{Dirichlet, Distribution};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Royalty-paying client.
    Client,
    /// Seedling supplier.
    Supplier,
}

impl LocationKind {
    pub fn label(&self) -> &'static str {
        match self {
            LocationKind::Client => "Client (Royalty)",
            LocationKind::Supplier => "Supplier (Seedling)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Normalised "CITY/UF" name.
    pub name: String,
    pub city: String,
    pub state: Option<String>,
    pub kind: LocationKind,
    pub impact_percent: f64,
}

impl Location {
    pub fn new(raw_name: &str, kind: LocationKind, impact_percent: f64) -> Self {
        let name = normalize_location_name(raw_name);
        let (city, state) = parse_city_and_state(&name);
        Self {
            city: city.to_string(),
            state: state.map(str::to_string),
            name,
            kind,
            impact_percent,
        }
    }

    pub fn state_name(&self) -> Option<&'static str> {
        self.state.as_deref().and_then(state_name)
    }
}

/// Collapse runs of whitespace and uppercase.
pub fn normalize_location_name(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Strip Portuguese diacritics ("SÃO JOAQUIM" -> "SAO JOAQUIM").
///
/// Only precomposed Latin vowels plus ç and ñ are mapped. Other marks,
/// including decomposed combining accents, pass through unchanged.
pub fn remove_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Matching key for user-supplied names: normalized, then accent-stripped,
/// so "Quirinopolis/go" and "QUIRINÓPOLIS/GO" compare equal.
pub fn location_key(location: &str) -> String {
    remove_accents(&normalize_location_name(location))
}

/// Split "PIRACICABA/SP" into ("PIRACICABA", Some("SP")).
///
/// Only the first slash separates; without a slash the state is `None`.
pub fn parse_city_and_state(location: &str) -> (&str, Option<&str>) {
    match location.split_once('/') {
        Some((city, state)) => (city.trim(), Some(state.trim())),
        None => (location.trim(), None),
    }
}

const STATES: [(&str, &str); 27] = [
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapa"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceara"),
    ("DF", "Distrito Federal"),
    ("ES", "Espirito Santo"),
    ("GO", "Goias"),
    ("MA", "Maranhao"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso Do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Para"),
    ("PB", "Paraiba"),
    ("PR", "Parana"),
    ("PE", "Pernambuco"),
    ("PI", "Piaui"),
    ("RJ", "Rio De Janeiro"),
    ("RN", "Rio Grande Do Norte"),
    ("RS", "Rio Grande Do Sul"),
    ("RO", "Rondonia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "Sao Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// State-level ThinkHazard division codes, used when no municipality
/// (ADM2) code is known.
const STATE_DIVISIONS: [(&str, &str); 8] = [
    ("SP", "3598"),
    ("GO", "3571"),
    ("MS", "3583"),
    ("PR", "3594"),
    ("MG", "3582"),
    ("MT", "3584"),
    ("AL", "3559"),
    ("PB", "3591"),
];

/// Full state name for a two-letter abbreviation (case-insensitive).
pub fn state_name(abbrev: &str) -> Option<&'static str> {
    let key = abbrev.trim().to_ascii_uppercase();
    STATES.iter().find(|(a, _)| *a == key).map(|(_, n)| *n)
}

pub fn state_division_code(abbrev: &str) -> Option<&'static str> {
    let key = abbrev.trim().to_ascii_uppercase();
    STATE_DIVISIONS
        .iter()
        .find(|(a, _)| *a == key)
        .map(|(_, c)| *c)
}

/// ThinkHazard division for a "CITY/UF" location.
///
/// A known municipality (ADM2) code wins; otherwise the state-level code.
pub fn thinkhazard_division(location: &str, municipality_code: Option<&str>) -> Option<String> {
    if let Some(code) = municipality_code.map(str::trim).filter(|c| !c.is_empty()) {
        return Some(code.to_string());
    }
    let name = normalize_location_name(location);
    let (_, state) = parse_city_and_state(&name);
    state.and_then(state_division_code).map(str::to_string)
}

/// Seedling suppliers, equal 1/6 share each.
pub fn default_suppliers() -> Vec<Location> {
    [
        "PIRACICABA/SP",
        "BARRINHA/SP",
        "VALPARAÍSO/SP",
        "QUIRINÓPOLIS/GO",
        "MANDAGUAÇU/PR",
        "SANTA RITA/PB",
    ]
    .iter()
    .map(|n| Location::new(n, LocationKind::Supplier, 1.0 / 6.0))
    .collect()
}

/// Royalty clients with their baseline share of total royalties.
pub fn default_clients() -> Vec<Location> {
    [
        ("NOVO HORIZONTE/SP", 0.07),
        ("SERRA AZUL/SP", 0.03),
        ("SÃO JOAQUIM DA BARRA/SP", 0.02),
        ("CHAVANTES/SP", 0.01),
        ("CESÁRIO LANGE/SP", 0.01),
        ("SERTÃOZINHO/SP", 0.03),
        ("ITAPURA/SP", 0.08),
        ("PENÁPOLIS/SP", 0.04),
        ("GUARAÇAÍ/SP", 0.005),
        ("OLÍMPIA/SP", 0.015),
        ("RANCHARIA/SP", 0.01),
        ("QUIRINÓPOLIS/GO", 0.06),
        ("VILA PROPÍCIO/GO", 0.04),
        ("JATAÍ/GO", 0.02),
        ("MINEIROS/GO", 0.08),
        ("CAARAPÓ/MS", 0.035),
        ("COLORADO/PR", 0.045),
        ("ITURAMA/MG", 0.01),
        ("BARRA DO BUGRES/MT", 0.02),
        ("CORURIPE/AL", 0.01),
        ("Pompeu/MG", 0.02),
    ]
    .iter()
    .map(|(n, i)| Location::new(n, LocationKind::Client, *i))
    .collect()
}

/// Clients first, then suppliers.
pub fn default_locations() -> Vec<Location> {
    let mut out = default_clients();
    out.extend(default_suppliers());
    out
}

/// Replace client impacts with Dirichlet(1, ..., 1) weights summing to 1.
///
/// Suppliers are left untouched. No clients is a no-op; a single client
/// gets the whole book.
pub fn randomize_client_impacts<R: Rng + ?Sized>(
    locations: &mut [Location],
    rng: &mut R,
) -> Result<()> {
    let idx: Vec<usize> = locations
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == LocationKind::Client)
        .map(|(i, _)| i)
        .collect();

    match idx.len() {
        0 => return Ok(()),
        1 => {
            locations[idx[0]].impact_percent = 1.0;
            return Ok(());
        }
        _ => {}
    }

    let alpha = vec![1.0_f64; idx.len()];
    let dirichlet = Dirichlet::new(&alpha)
        .map_err(|e| RiskError::validation("impact_percent", format!("dirichlet: {e}")))?;
    let weights = dirichlet.sample(rng);

    for (i, w) in idx.into_iter().zip(weights) {
        locations[i].impact_percent = w;
    }
    Ok(())
}
