// src/logging.rs
//
// Progress sinks for the per-location simulation loop.
// - EventSink:   trait called once per simulated location
// - NoopSink:    discards all events
// - ProgressLog: one tracing line per location
// - JsonlSink:   one JSON object per line, for downstream tooling

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, RiskError};

/// One finished location simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationEvent<'a> {
    /// 1-based position in the run.
    pub index: usize,
    pub total: usize,
    pub location: &'a str,
    pub mean_loss: f64,
    pub var_95: f64,
}

pub trait EventSink {
    fn on_location(&mut self, event: &SimulationEvent<'_>);

    /// Called once after the last location.
    fn finish(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn on_location(&mut self, _event: &SimulationEvent<'_>) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressLog;

impl EventSink for ProgressLog {
    fn on_location(&mut self, e: &SimulationEvent<'_>) {
        info!(
            "[{}/{}] simulated {}  mean={:.3}%  var95={:.3}%",
            e.index, e.total, e.location, e.mean_loss, e.var_95
        );
    }
}

/// JSONL file sink. Write failures are logged once and then ignored so a
/// full disk never aborts a simulation.
pub struct JsonlSink {
    writer: BufWriter<File>,
    failed: bool,
}

impl JsonlSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| RiskError::io(path, e))?;
        Ok(Self {
            writer: BufWriter::new(file),
            failed: false,
        })
    }

    fn write_line(&mut self, e: &SimulationEvent<'_>) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, e)?;
        self.writer.write_all(b"\n")
    }
}

impl EventSink for JsonlSink {
    fn on_location(&mut self, e: &SimulationEvent<'_>) {
        if self.failed {
            return;
        }
        if let Err(err) = self.write_line(e) {
            warn!("event sink write failed, disabling: {err}");
            self.failed = true;
        }
    }

    fn finish(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!("event sink flush failed: {err}");
        }
    }
}

/// Fan out to several sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn on_location(&mut self, e: &SimulationEvent<'_>) {
        self.0.on_location(e);
        self.1.on_location(e);
    }

    fn finish(&mut self) {
        self.0.finish();
        self.1.finish();
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn on_location(&mut self, e: &SimulationEvent<'_>) {
        (**self).on_location(e);
    }

    fn finish(&mut self) {
        (**self).finish();
    }
}
