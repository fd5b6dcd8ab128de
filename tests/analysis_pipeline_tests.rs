// tests/analysis_pipeline_tests.rs
//
// End-to-end library pipeline: cache template -> observations ->
// run_analysis -> analysis_summary.json.

use std::fs;

use canerisk::cache::RiskDataCache;
use canerisk::config::{Config, Overrides};
use canerisk::location::{default_locations, LocationKind};
use canerisk::logging::NoopSink;
use canerisk::report::{run_analysis, SUMMARY_FILE};
use canerisk::scoring::{AgroIndicators, ClimateMeans, ClimateProjection};
use canerisk::RiskError;
use tempfile::tempdir;

fn small_config(seed: u64) -> Config {
    let mut cfg = Config::default();
    cfg.apply_overrides(&Overrides {
        n_simulations: Some(400),
        seed: Some(seed),
        ..Overrides::default()
    });
    cfg
}

fn projection(warming: f64, precip_change: f64) -> ClimateProjection {
    ClimateProjection {
        baseline: ClimateMeans {
            tas: Some(23.0),
            tasmax: Some(29.5),
            pr: Some(1300.0),
        },
        future: ClimateMeans {
            tas: Some(23.0 + warming),
            tasmax: Some(29.5 + warming),
            pr: Some(1300.0 * (1.0 + precip_change)),
        },
    }
}

/// Default registry with observations filled in for two clients.
fn populated_cache() -> RiskDataCache {
    let mut cache = RiskDataCache::from_locations(&default_locations()).unwrap();

    let mut mineiros = cache
        .get_kind("MINEIROS/GO", LocationKind::Client)
        .cloned()
        .unwrap();
    mineiros.projection = Some(projection(3.2, -0.25));
    mineiros.hazards.insert("DR".into(), "HIG".into());
    mineiros.hazards.insert("WF".into(), "HIG".into());
    mineiros.hazards.insert("FL".into(), "MED".into());
    mineiros.agro = Some(AgroIndicators {
        consecutive_dry_days: Some(70.0),
        extreme_heat_days: Some(45.0),
        ..AgroIndicators::default()
    });
    mineiros.fire_detections = Some(12);
    cache.upsert(mineiros);

    let mut itapura = cache
        .get_kind("ITAPURA/SP", LocationKind::Client)
        .cloned()
        .unwrap();
    itapura.projection = Some(projection(1.2, 0.05));
    itapura.hazards.insert("FL".into(), "LOW".into());
    cache.upsert(itapura);

    cache
}

#[test]
fn cache_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("risk_cache.json");
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let cache = populated_cache();
    cache.save(&path).unwrap();
    let loaded = RiskDataCache::load(&path).unwrap();
    assert_eq!(loaded, cache);
    assert_eq!(loaded.locations.len(), 27);

    // Both QUIRINÓPOLIS/GO roles survive.
    assert!(loaded
        .get_kind("QUIRINÓPOLIS/GO", LocationKind::Client)
        .is_some());
    assert!(loaded
        .get_kind("QUIRINÓPOLIS/GO", LocationKind::Supplier)
        .is_some());
}

#[test]
fn analysis_ranks_observed_hotspot_first() {
    let report = run_analysis(&populated_cache(), &small_config(42), None, &mut NoopSink).unwrap();

    assert_eq!(report.locations.len(), 27);
    assert_eq!(report.simulations.len(), 27);
    assert_eq!(report.portfolio.num_clients, 21);
    assert_eq!(report.portfolio.num_suppliers, 6);

    let top = &report.locations[0];
    assert_eq!(top.location, "MINEIROS/GO");
    // tas +3.2 (2) + tasmax +3.2 (1) + |pr| 25% (2) = 5.
    assert_eq!(top.climate_likelihood, 5);
    assert!(top.agro_score.is_some());
    assert!(top.hazard_severity >= 1);
    assert!(top.aggregate_weighted_risk > report.locations[1].aggregate_weighted_risk);

    // Sorted descending.
    for w in report.locations.windows(2) {
        assert!(w[0].aggregate_weighted_risk >= w[1].aggregate_weighted_risk);
    }

    // Default sensitivity target is the top client.
    let s = report.sensitivity.as_ref().unwrap();
    assert_eq!(s.stressed_client, "MINEIROS/GO");
    assert!((s.stressed_impact - s.baseline_impact * 1.5).abs() < 1e-9);
    assert!(!s.ranking_changed);

    assert_eq!(report.correlated.n_locations, 27);
    assert_eq!(report.correlated.n_simulations, 400);
}

#[test]
fn checksum_is_stable_per_seed() {
    let cache = populated_cache();
    let a = run_analysis(&cache, &small_config(7), None, &mut NoopSink).unwrap();
    let b = run_analysis(&cache, &small_config(7), None, &mut NoopSink).unwrap();
    let c = run_analysis(&cache, &small_config(8), None, &mut NoopSink).unwrap();

    assert_eq!(a.determinism.checksum, b.determinism.checksum);
    assert_eq!(a.determinism.checksum.len(), 64);
    assert_ne!(a.determinism.checksum, c.determinism.checksum);
}

#[test]
fn explicit_stress_target_and_unknown_target() {
    let cache = populated_cache();
    let cfg = small_config(1);

    let report = run_analysis(&cache, &cfg, Some("itapura/sp"), &mut NoopSink).unwrap();
    let s = report.sensitivity.unwrap();
    assert_eq!(s.stressed_client, "ITAPURA/SP");
    assert_eq!(s.baseline_top_risk, "MINEIROS/GO");
    // Stressed ITAPURA still sits below MINEIROS, so the top is someone else.
    assert_eq!(s.new_top_risk, "MINEIROS/GO");
    assert!(s.ranking_changed);

    match run_analysis(&cache, &cfg, Some("ATLANTIS/ZZ"), &mut NoopSink) {
        Err(RiskError::UnknownLocation(name)) => assert_eq!(name, "ATLANTIS/ZZ"),
        other => panic!("expected UnknownLocation, got {:?}", other.map(|r| r.run)),
    }
}

#[test]
fn stressing_a_dual_role_location_leaves_its_supplier_row() {
    let cache = populated_cache();
    let cfg = small_config(2);
    let report = run_analysis(&cache, &cfg, Some("Quirinopolis/GO"), &mut NoopSink).unwrap();
    let s = report.sensitivity.unwrap();
    assert_eq!(s.stressed_client, "QUIRINÓPOLIS/GO");

    let row = |rows: &[canerisk::LocationRisk], kind: LocationKind| {
        rows.iter()
            .find(|r| r.location == "QUIRINÓPOLIS/GO" && r.kind == kind)
            .map(|r| r.impact_percent)
            .unwrap()
    };
    let client_before = row(&report.locations, LocationKind::Client);
    assert!((row(&s.stressed_rows, LocationKind::Client) - client_before * 1.5).abs() < 1e-12);
    assert_eq!(
        row(&s.stressed_rows, LocationKind::Supplier),
        row(&report.locations, LocationKind::Supplier)
    );
}

#[test]
fn summary_json_omits_raw_draws() {
    let dir = tempdir().unwrap();
    let report = run_analysis(&populated_cache(), &small_config(3), None, &mut NoopSink).unwrap();
    let path = report.write_json(dir.path().join("out")).unwrap();
    assert!(path.ends_with(SUMMARY_FILE));

    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(v["schema_version"], 1);
    assert_eq!(v["run"]["seed"], 3);
    assert_eq!(v["locations"].as_array().unwrap().len(), 27);
    let first = &v["simulations"][0];
    assert!(first.get("var_95").is_some());
    assert!(first.get("losses").is_none());
    assert_eq!(
        v["determinism"]["checksum"].as_str().unwrap(),
        report.determinism.checksum
    );
}

#[test]
fn non_positive_definite_correlation_fails_the_run() {
    let mut cfg = small_config(1);
    cfg.apply_overrides(&Overrides {
        correlation: Some(-0.5),
        ..Overrides::default()
    });
    assert!(matches!(
        run_analysis(&populated_cache(), &cfg, None, &mut NoopSink),
        Err(RiskError::NotPositiveDefinite { .. })
    ));
}
