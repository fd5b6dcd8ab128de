// tests/monte_carlo_tests.rs
//
// Per-location simulation: seeding, tail ordering, stress behaviour.

use canerisk::config::MonteCarloConfig;
use canerisk::location::LocationKind;
use canerisk::logging::{EventSink, NoopSink, SimulationEvent};
use canerisk::monte_carlo::{
    run_stress_test, simulate_location, simulate_portfolio, SimulationInput, SimulationParams,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn mc(n: usize, seed: u64) -> MonteCarloConfig {
    MonteCarloConfig {
        n_simulations: n,
        seed,
        ..MonteCarloConfig::default()
    }
}

fn inputs() -> Vec<SimulationInput> {
    [
        ("ITAPURA/SP", LocationKind::Client, 4.0, 0.08),
        ("MINEIROS/GO", LocationKind::Client, 2.0, 0.08),
        ("PIRACICABA/SP", LocationKind::Supplier, 1.0, 1.0 / 6.0),
    ]
    .into_iter()
    .map(|(name, kind, l, impact)| SimulationInput {
        location: name.to_string(),
        kind,
        climate_likelihood: l,
        impact_percent: impact,
    })
    .collect()
}

#[derive(Default)]
struct Recorder {
    seen: Vec<(usize, usize, String)>,
    finished: bool,
}

impl EventSink for Recorder {
    fn on_location(&mut self, e: &SimulationEvent<'_>) {
        self.seen.push((e.index, e.total, e.location.to_string()));
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

#[test]
fn portfolio_is_deterministic_for_fixed_seed() {
    let a = simulate_portfolio(&inputs(), &mc(2000, 42), &mut NoopSink);
    let b = simulate_portfolio(&inputs(), &mc(2000, 42), &mut NoopSink);
    assert_eq!(a.len(), 3);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.losses, y.losses);
        assert_eq!(x.var_95, y.var_95);
    }

    let c = simulate_portfolio(&inputs(), &mc(2000, 43), &mut NoopSink);
    assert_ne!(a[0].losses, c[0].losses);
}

#[test]
fn location_i_uses_stream_seed_plus_i() {
    let cfg = mc(500, 100);
    let sims = simulate_portfolio(&inputs(), &cfg, &mut NoopSink);
    let params = SimulationParams::from(&cfg);

    for (i, input) in inputs().iter().enumerate() {
        let mut rng = ChaCha8Rng::seed_from_u64(100 + i as u64);
        let solo = simulate_location(
            &input.location,
            input.climate_likelihood,
            input.impact_percent,
            &params,
            &mut rng,
        );
        assert_eq!(solo.losses, sims[i].losses, "stream mismatch at {i}");
    }
}

#[test]
fn sink_sees_every_location_in_order_then_finish() {
    let mut rec = Recorder::default();
    simulate_portfolio(&inputs(), &mc(100, 1), &mut rec);
    assert!(rec.finished);
    let idx: Vec<usize> = rec.seen.iter().map(|s| s.0).collect();
    assert_eq!(idx, vec![1, 2, 3]);
    assert!(rec.seen.iter().all(|s| s.1 == 3));
    assert_eq!(rec.seen[2].2, "PIRACICABA/SP");
}

#[test]
fn statistics_are_ordered_and_bounded() {
    let sims = simulate_portfolio(&inputs(), &mc(5000, 42), &mut NoopSink);
    for s in &sims {
        assert_eq!(s.losses.len(), 5000);
        assert!(s.min_loss >= 0.0);
        assert!(s.max_loss <= s.impact_percent * 100.0 + 1e-9);
        assert!(s.min_loss <= s.median_loss && s.median_loss <= s.max_loss);
        assert!(s.var_90 <= s.var_95 && s.var_95 <= s.var_99);
        assert!(s.var_99 <= s.max_loss);
        assert!(s.es_95 >= s.var_95);
    }
}

#[test]
fn mean_loss_tracks_likelihood() {
    // L=4: mean yield loss 40%, sd 15 -> royalty mean ~ 0.40 * 8 = 3.2%.
    let sims = simulate_portfolio(&inputs(), &mc(20_000, 42), &mut NoopSink);
    assert!((sims[0].mean_yield_loss - 40.0).abs() < 1e-12);
    assert!((sims[0].mean_loss - 3.2).abs() < 0.05, "got {}", sims[0].mean_loss);
    assert!(sims[0].mean_loss > sims[1].mean_loss);
}

#[test]
fn stress_scales_losses_on_the_same_draws() {
    let params = SimulationParams::from(&mc(4000, 9));
    let st = run_stress_test("ITAPURA/SP", 3.0, 0.08, 1.5, &params, 9);

    assert!((st.stressed.impact_percent - 0.12).abs() < 1e-12);
    for (b, s) in st.baseline.losses.iter().zip(&st.stressed.losses) {
        assert!((s - b * 1.5).abs() < 1e-9);
    }
    assert!((st.mean_loss_increase() - 0.5 * st.baseline.mean_loss).abs() < 1e-9);
    assert!(st.var_95_increase() > 0.0);
}

#[test]
fn zero_spread_is_a_point_mass() {
    let params = SimulationParams {
        n_simulations: 200,
        std_dev_yield_loss: 0.0,
        mean_loss_factor: 50.0,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let sim = simulate_location("X/SP", 5.0, 0.1, &params, &mut rng);
    // 50% yield loss on a 10% share -> 5% royalty loss everywhere.
    assert!((sim.mean_loss - 5.0).abs() < 1e-12);
    assert!(sim.std_dev.abs() < 1e-12);
    assert!((sim.var_99 - 5.0).abs() < 1e-12);
}
