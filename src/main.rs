// src/main.rs
//
// CLI entrypoint for canerisk.
//
// Subcommands:
//   init-cache  write a risk-data cache template for the built-in registry
//   analyze     cache -> scores -> simulations -> analysis_summary.json
//   simulate    one ad-hoc location from --likelihood / --impact
//   stress      baseline vs stressed impact for one ad-hoc location
//
// Config precedence: CLI flags > CANERISK_* env > --config YAML > defaults.
// Diagnostics go to stderr (CANERISK_LOG filter); results go to stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use canerisk::config::{Config, Overrides, CONFIG_VERSION};
use canerisk::location::{default_locations, normalize_location_name, randomize_client_impacts};
use canerisk::logging::{EventSink, JsonlSink, NoopSink, ProgressLog};
use canerisk::monte_carlo::{
    run_stress_test, simulate_location, summary_table, SimulationParams,
};
use canerisk::report::{format_simulation_table, print_summary, run_analysis};
use canerisk::RiskDataCache;

const LOG_ENV: &str = "CANERISK_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "canerisk",
    about = "Climate and hazard risk engine for a sugarcane supply chain",
    version
)]
struct Cli {
    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a cache template covering the built-in clients and suppliers.
    InitCache {
        /// Output path.
        #[arg(long, default_value = "risk_cache.json")]
        output: PathBuf,

        /// Replace client impacts with Dirichlet(1, ..., 1) weights.
        #[arg(long)]
        randomize_impacts: bool,

        /// Seed for --randomize-impacts.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Score and simulate every cached location.
    Analyze {
        /// Risk-data cache (JSON).
        #[arg(long, default_value = "risk_cache.json")]
        cache: PathBuf,

        /// Directory for analysis_summary.json.
        #[arg(long, default_value = "canerisk_out")]
        output_dir: PathBuf,

        /// Client to stress in the sensitivity analysis (default: top client).
        #[arg(long)]
        stress_target: Option<String>,

        /// Write one JSON line per simulated location to PATH.
        #[arg(long)]
        events: Option<PathBuf>,

        /// Print the per-location simulation table.
        #[arg(long)]
        table: bool,

        /// Suppress progress lines and the console summary.
        #[arg(long)]
        quiet: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Simulate one location.
    Simulate {
        #[command(flatten)]
        single: SingleArgs,

        /// Print the simulation as JSON instead of a table.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Stress one location's impact and compare with the baseline.
    Stress {
        #[command(flatten)]
        single: SingleArgs,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// YAML config file (every field optional).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Draws per location.
    #[arg(long)]
    simulations: Option<usize>,

    /// Base seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Std dev of yield loss, percentage points.
    #[arg(long)]
    std_dev: Option<f64>,

    /// Pairwise correlation for the correlated portfolio run.
    #[arg(long, allow_hyphen_values = true)]
    correlation: Option<f64>,

    /// Impact multiplier for stress / sensitivity.
    #[arg(long)]
    stress_factor: Option<f64>,
}

impl CommonArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            n_simulations: self.simulations,
            std_dev_yield_loss: self.std_dev,
            seed: self.seed,
            correlation: self.correlation,
            stress_factor: self.stress_factor,
        }
    }

    fn resolve(&self) -> Result<Config> {
        let mut cfg = Config::load(self.config.as_deref()).context("loading config")?;
        cfg.apply_overrides(&self.overrides());
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

#[derive(Debug, Args)]
struct SingleArgs {
    /// Location label, e.g. "PIRACICABA/SP".
    #[arg(long, default_value = "CUSTOM")]
    location: String,

    /// Climate likelihood score, 0-5.
    #[arg(long)]
    likelihood: f64,

    /// Impact as a fraction of total royalties, e.g. 0.08.
    #[arg(long)]
    impact: f64,
}

impl SingleArgs {
    fn check(&self) -> Result<()> {
        if !(0.0..=5.0).contains(&self.likelihood) {
            bail!("--likelihood must be within [0, 5], got {}", self.likelihood);
        }
        if !(self.impact.is_finite() && self.impact >= 0.0) {
            bail!("--impact must be >= 0, got {}", self.impact);
        }
        Ok(())
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_header(cfg: &Config) {
    println!(
        "canerisk {} | cfg={} | cfg_hash=0x{:016x} | seed={} | simulations={}",
        env!("CARGO_PKG_VERSION"),
        CONFIG_VERSION,
        cfg.fingerprint(),
        cfg.monte_carlo.seed,
        cfg.monte_carlo.n_simulations,
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet = matches!(cli.command, Command::Analyze { quiet: true, .. });
    init_tracing(cli.verbose, quiet);

    match cli.command {
        Command::InitCache {
            output,
            randomize_impacts,
            seed,
            force,
        } => init_cache(&output, randomize_impacts, seed, force),
        Command::Analyze {
            cache,
            output_dir,
            stress_target,
            events,
            table,
            quiet,
            common,
        } => analyze(
            &cache,
            &output_dir,
            stress_target.as_deref(),
            events.as_deref(),
            table,
            quiet,
            &common,
        ),
        Command::Simulate {
            single,
            json,
            common,
        } => simulate(&single, json, &common),
        Command::Stress { single, common } => stress(&single, &common),
    }
}

fn init_cache(output: &Path, randomize: bool, seed: u64, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }
    let mut locations = default_locations();
    if randomize {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        randomize_client_impacts(&mut locations, &mut rng)?;
        info!(seed, "randomized client impacts");
    }
    let cache = RiskDataCache::from_locations(&locations)?;
    cache
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Wrote: {} ({} locations)",
        output.display(),
        cache.locations.len()
    );
    Ok(())
}

fn analyze(
    cache_path: &Path,
    output_dir: &Path,
    stress_target: Option<&str>,
    events: Option<&Path>,
    table: bool,
    quiet: bool,
    common: &CommonArgs,
) -> Result<()> {
    let cfg = common.resolve()?;
    print_header(&cfg);

    let cache = RiskDataCache::load(cache_path)
        .with_context(|| format!("loading cache {}", cache_path.display()))?;
    if cache.locations.is_empty() {
        bail!("cache {} has no locations", cache_path.display());
    }

    let mut sink: Box<dyn EventSink> = match (events, quiet) {
        (Some(path), true) => Box::new(JsonlSink::create(path)?),
        (Some(path), false) => Box::new((JsonlSink::create(path)?, ProgressLog)),
        (None, true) => Box::new(NoopSink),
        (None, false) => Box::new(ProgressLog),
    };

    let report = run_analysis(&cache, &cfg, stress_target, sink.as_mut())?;
    let path = report
        .write_json(output_dir)
        .with_context(|| format!("writing report to {}", output_dir.display()))?;

    if table {
        println!();
        print!("{}", format_simulation_table(&report.simulations));
    }
    if !quiet {
        print_summary(&report);
    }
    println!();
    println!("Wrote: {}", path.display());
    Ok(())
}

fn simulate(single: &SingleArgs, json: bool, common: &CommonArgs) -> Result<()> {
    single.check()?;
    let cfg = common.resolve()?;
    let params = SimulationParams::from(&cfg.monte_carlo);
    let name = normalize_location_name(&single.location);

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.monte_carlo.seed);
    let sim = simulate_location(&name, single.likelihood, single.impact, &params, &mut rng);

    if json {
        println!("{}", serde_json::to_string_pretty(&sim)?);
        return Ok(());
    }

    print_header(&cfg);
    println!();
    println!("{name}  likelihood={}  impact={}", sim.climate_likelihood, sim.impact_percent);
    for (label, value) in summary_table(&sim) {
        println!("  {label:<14} {value:>10}");
    }
    println!("  {:<14} {:>9.2}%", "ES 95%", sim.es_95);
    Ok(())
}

fn stress(single: &SingleArgs, common: &CommonArgs) -> Result<()> {
    single.check()?;
    let cfg = common.resolve()?;
    let mc = &cfg.monte_carlo;
    let name = normalize_location_name(&single.location);

    let st = run_stress_test(
        &name,
        single.likelihood,
        single.impact,
        mc.stress_factor,
        &SimulationParams::from(mc),
        mc.seed,
    );

    print_header(&cfg);
    println!();
    println!(
        "{name}  stress_factor={:.2} (+{:.0}%)",
        st.stress_factor,
        (st.stress_factor - 1.0) * 100.0
    );
    println!("  {:<14} {:>10} {:>10}", "", "baseline", "stressed");
    for ((label, base), (_, stressed)) in summary_table(&st.baseline)
        .into_iter()
        .zip(summary_table(&st.stressed))
    {
        println!("  {label:<14} {base:>10} {stressed:>10}");
    }
    println!(
        "  mean +{:.2}pp  var95 +{:.2}pp",
        st.mean_loss_increase(),
        st.var_95_increase()
    );
    Ok(())
}
