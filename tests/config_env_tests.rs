// tests/config_env_tests.rs
//
// Config layering: defaults < YAML file < CANERISK_* env < CLI overrides.
// Env-mutating tests serialise on ENV_MUTEX.

use std::fs;
use std::sync::Mutex;

use canerisk::config::{
    Config, Overrides, ENV_CORRELATION, ENV_MEAN_LOSS_FACTOR, ENV_N_SIMULATIONS, ENV_SEED,
    ENV_STD_DEV_YIELD_LOSS, ENV_STRESS_FACTOR,
};
use canerisk::RiskError;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        ENV_N_SIMULATIONS,
        ENV_STD_DEV_YIELD_LOSS,
        ENV_MEAN_LOSS_FACTOR,
        ENV_CORRELATION,
        ENV_STRESS_FACTOR,
        ENV_SEED,
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn load_without_file_or_env_gives_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = Config::load(None).unwrap();
    assert_eq!(cfg.monte_carlo.n_simulations, 10_000);
    assert_eq!(cfg.monte_carlo.seed, 42);
    assert!((cfg.monte_carlo.correlation - 0.3).abs() < 1e-12);
    assert!((cfg.monte_carlo.stress_factor - 1.5).abs() < 1e-12);
    cfg.validate().unwrap();
}

#[test]
fn env_overrides_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var(ENV_N_SIMULATIONS, "2500");
    std::env::set_var(ENV_SEED, " 7 ");
    std::env::set_var(ENV_CORRELATION, "0.55");

    let cfg = Config::load(None).unwrap();
    clear_env();

    assert_eq!(cfg.monte_carlo.n_simulations, 2500);
    assert_eq!(cfg.monte_carlo.seed, 7);
    assert!((cfg.monte_carlo.correlation - 0.55).abs() < 1e-12);
    // Untouched fields keep defaults.
    assert!((cfg.monte_carlo.std_dev_yield_loss - 15.0).abs() < 1e-12);
}

#[test]
fn unparseable_env_value_is_ignored() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    std::env::set_var(ENV_N_SIMULATIONS, "lots");
    std::env::set_var(ENV_STRESS_FACTOR, "");

    let cfg = Config::load(None).unwrap();
    clear_env();

    assert_eq!(cfg.monte_carlo.n_simulations, 10_000);
    assert!((cfg.monte_carlo.stress_factor - 1.5).abs() < 1e-12);
}

#[test]
fn precedence_file_then_env_then_cli() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let dir = tempdir().unwrap();
    let path = dir.path().join("canerisk.yaml");
    fs::write(
        &path,
        "monte_carlo:\n  n_simulations: 300\n  seed: 11\n  stress_factor: 2.0\nrisk_weights:\n  climate: 0.5\n  hazard: 0.5\n",
    )
    .unwrap();

    std::env::set_var(ENV_SEED, "12");
    let mut cfg = Config::load(Some(&path)).unwrap();
    clear_env();

    // File beats defaults, env beats file.
    assert_eq!(cfg.monte_carlo.n_simulations, 300);
    assert_eq!(cfg.monte_carlo.seed, 12);
    assert!((cfg.monte_carlo.stress_factor - 2.0).abs() < 1e-12);
    assert!((cfg.risk_weights.climate - 0.5).abs() < 1e-12);
    // Sections absent from the file keep defaults.
    assert!((cfg.hazard.severity_normaliser - 15.0).abs() < 1e-12);

    cfg.apply_overrides(&Overrides {
        seed: Some(13),
        n_simulations: Some(50),
        ..Overrides::default()
    });
    assert_eq!(cfg.monte_carlo.seed, 13);
    assert_eq!(cfg.monte_carlo.n_simulations, 50);
    assert!((cfg.monte_carlo.stress_factor - 2.0).abs() < 1e-12);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.yaml");
    match Config::load(Some(&path)) {
        Err(RiskError::Io { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn out_of_range_override_fails_validation() {
    let mut cfg = Config::default();
    cfg.apply_overrides(&Overrides {
        correlation: Some(1.5),
        ..Overrides::default()
    });
    match cfg.validate() {
        Err(RiskError::Validation { field, .. }) => assert_eq!(field, "monte_carlo.correlation"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn fingerprint_tracks_resolved_values() {
    let a = Config::default();
    let mut b = Config::default();
    assert_eq!(a.fingerprint(), b.fingerprint());
    b.apply_overrides(&Overrides {
        seed: Some(43),
        ..Overrides::default()
    });
    assert_ne!(a.fingerprint(), b.fingerprint());
}
