//! canerisk core library.
//!
//! Climate and natural-hazard risk engine for a sugarcane supply chain:
//! location registry, scoring, per-location Monte Carlo of royalty loss,
//! and portfolio aggregation. The binary (`src/main.rs`) is a thin CLI
//! around these components.

pub mod assessment;
pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod logging;
pub mod monte_carlo;
pub mod portfolio;
pub mod report;
pub mod scoring;
pub mod stats;
pub mod tail_risk;

// --- Re-exports for ergonomic external use ---------------------------------

pub use assessment::{
    assess, portfolio_summary, sensitivity_analysis, LocationRisk, PortfolioSummary,
    SensitivityAnalysis,
};

pub use cache::{CachedLocation, RiskDataCache};

pub use config::{Config, Overrides};

pub use error::{Result, RiskError};

pub use location::{Location, LocationKind};

pub use logging::{EventSink, JsonlSink, NoopSink, ProgressLog};

pub use monte_carlo::{
    run_stress_test, simulate_location, simulate_portfolio, LocationSimulation, SimulationInput,
    SimulationParams, StressTest,
};

pub use portfolio::{
    cholesky, correlation_matrix, portfolio_metrics, simulate_correlated_losses,
    CorrelatedPortfolio, LossMatrix, PortfolioMetrics,
};

pub use report::{run_analysis, AnalysisReport};

pub use scoring::RiskCategory;
