//! Statistics collection and export.
//!
//! Executors export their counters as `serde_json::Value`; this module folds
//! those exports into a serializable [`SimulationStats`] summary that can be
//! rendered as JSON, CSV or plain text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::types::{ExecutorId, SimTime};

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub metadata: SimulationMetadata,
    pub simulator: SimulatorSummary,
    pub executors: BTreeMap<ExecutorId, ExecutorSummary>,
    pub timing: TimingStats,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub name: String,
    /// Wall clock start, seconds since the epoch
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub version: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulatorSummary {
    pub final_time: SimTime,
    pub steps: u64,
    pub activations: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub executor_count: usize,
    pub diagnostics: usize,
}

/// Statistics of one cluster executor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub id: ExecutorId,
    pub name: String,
    /// `tdf` or `network`
    pub kind: String,
    pub final_time: SimTime,

    /// TDF: completed cluster periods
    pub periods: Option<u64>,
    /// TDF: module firings
    pub firings: Option<u64>,
    /// TDF: run-time reschedules
    pub reschedules: Option<u64>,
    /// Network: solver steps
    pub steps: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    pub total_wall_time_ms: f64,
    /// Simulated seconds per wall-clock second
    pub sim_time_per_second: f64,
    pub activations_per_second: f64,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(epoch_now());
    }

    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(epoch_now());
    }

    /// Updates timing statistics from the elapsed wall-clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;
        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_time_per_second = self.simulator.final_time.as_secs_f64() / seconds;
            self.timing.activations_per_second = self.simulator.activations as f64 / seconds;
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Summary metrics as `metric,value` lines.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("metric,value\n");
        csv.push_str(&format!("final_time_fs,{}\n", self.simulator.final_time.ticks()));
        csv.push_str(&format!("steps,{}\n", self.simulator.steps));
        csv.push_str(&format!("activations,{}\n", self.simulator.activations));
        csv.push_str(&format!("events_delivered,{}\n", self.simulator.events_delivered));
        csv.push_str(&format!("events_dropped,{}\n", self.simulator.events_dropped));
        csv.push_str(&format!("executor_count,{}\n", self.simulator.executor_count));
        csv.push_str(&format!("diagnostics,{}\n", self.simulator.diagnostics));
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("sim_time_per_second,{:.6e}\n", self.timing.sim_time_per_second));
        csv
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Per-executor statistics as CSV.
    pub fn executors_to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("id,name,kind,final_time_fs,periods,firings,reschedules,steps\n");
        let opt = |v: Option<u64>| v.map(|v| v.to_string()).unwrap_or_default();
        for (id, s) in &self.executors {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                id,
                s.name,
                s.kind,
                s.final_time.ticks(),
                opt(s.periods),
                opt(s.firings),
                opt(s.reschedules),
                opt(s.steps),
            ));
        }
        csv
    }

    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Simulator ---")?;
        writeln!(w, "Final time: {}", self.simulator.final_time)?;
        writeln!(w, "Steps: {}", self.simulator.steps)?;
        writeln!(w, "Activations: {}", self.simulator.activations)?;
        writeln!(w, "Events delivered: {}", self.simulator.events_delivered)?;
        writeln!(w, "Events dropped: {}", self.simulator.events_dropped)?;
        writeln!(w, "Diagnostics: {}", self.simulator.diagnostics)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w)?;

        writeln!(w, "--- Executors ---")?;
        for (id, s) in &self.executors {
            writeln!(w, "{} `{}` ({}), final time {}", id, s.name, s.kind, s.final_time)?;
            if let Some(periods) = s.periods {
                writeln!(w, "  Periods: {}, firings: {}", periods, s.firings.unwrap_or(0))?;
            }
            if let Some(steps) = s.steps {
                writeln!(w, "  Steps: {}", steps)?;
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        if let Err(err) = self.write_summary(&mut buf) {
            tracing::warn!(error = %err, "could not render statistics summary");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Wall-clock timer.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn epoch_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

fn time_field(value: &serde_json::Value) -> SimTime {
    SimTime::from_fs(value.as_u64().unwrap_or(0))
}

/// Builds [`SimulationStats`] from the simulator's JSON export.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            stats: SimulationStats::new(),
            timer: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.stats.metadata.name = name.into();
    }

    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.record_start();
    }

    pub fn stop(&mut self) {
        self.stats.record_end();
        if let Some(timer) = &self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    pub fn update_from_json(&mut self, json: &serde_json::Value) {
        if let Some(sim) = json.get("simulator") {
            let s = &mut self.stats.simulator;
            s.final_time = time_field(&sim["current_time"]);
            s.steps = sim["steps"].as_u64().unwrap_or(0);
            s.activations = sim["activations"].as_u64().unwrap_or(0);
            s.events_delivered = sim["events_delivered"].as_u64().unwrap_or(0);
            s.events_dropped = sim["events_dropped"].as_u64().unwrap_or(0);
            s.executor_count = sim["executor_count"].as_u64().unwrap_or(0) as usize;
            s.diagnostics = sim["diagnostics"].as_u64().unwrap_or(0) as usize;
        }

        let Some(executors) = json.get("executors").and_then(|e| e.as_object()) else {
            return;
        };
        for (id, exec) in executors {
            let Ok(id) = id.parse::<ExecutorId>() else {
                continue;
            };
            let mut summary = ExecutorSummary {
                id,
                name: exec["name"].as_str().unwrap_or_default().to_string(),
                kind: exec["kind"].as_str().unwrap_or("unknown").to_string(),
                final_time: time_field(&exec["current_time"]),
                ..Default::default()
            };
            match summary.kind.as_str() {
                "tdf" => {
                    summary.periods = exec["stats"]["periods"].as_u64();
                    summary.firings = exec["stats"]["firings"].as_u64();
                    summary.reschedules = exec["stats"]["reschedules"].as_u64();
                }
                "network" => summary.steps = exec["steps"].as_u64(),
                _ => {}
            }
            self.stats.executors.insert(id, summary);
        }
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_creation() {
        let stats = SimulationStats::new().with_name("rc");
        assert_eq!(stats.metadata.name, "rc");
        assert_eq!(stats.metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_csv_export() {
        let mut stats = SimulationStats::new();
        stats.simulator.final_time = SimTime::from_ps(2);
        stats.simulator.activations = 500;
        let csv = stats.to_csv();
        assert!(csv.contains("final_time_fs,2000"));
        assert!(csv.contains("activations,500"));
    }

    #[test]
    fn test_collector_from_json() {
        let mut collector = StatsCollector::new();
        let json = serde_json::json!({
            "simulator": {
                "current_time": 1_000_000_000u64,
                "steps": 100,
                "activations": 150,
                "events_delivered": 12,
                "events_dropped": 0,
                "executor_count": 2,
                "diagnostics": 1
            },
            "executors": {
                "0": {
                    "kind": "tdf",
                    "name": "ctrl",
                    "current_time": 1_000_000_000u64,
                    "stats": { "periods": 10, "firings": 30, "reschedules": 1 }
                },
                "1": {
                    "kind": "network",
                    "name": "rc",
                    "current_time": 1_000_000_000u64,
                    "steps": 100
                }
            }
        });
        collector.update_from_json(&json);

        let stats = collector.stats();
        assert_eq!(stats.simulator.final_time, SimTime::from_us(1));
        assert_eq!(stats.executors.len(), 2);
        assert_eq!(stats.executors[&0].firings, Some(30));
        assert_eq!(stats.executors[&1].steps, Some(100));
        assert!(stats.executors_to_csv().contains("1,rc,network,1000000000,,,,100"));
    }

    #[test]
    fn test_summary_output() {
        let mut stats = SimulationStats::new().with_name("summary");
        stats.simulator.steps = 42;
        let summary = stats.summary();
        assert!(summary.contains("summary"));
        assert!(summary.contains("Steps: 42"));
    }

    #[test]
    fn test_collector_timing() {
        let mut collector = StatsCollector::new();
        collector.start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        collector.stop();
        assert!(collector.stats().timing.total_wall_time_ms >= 5.0);
    }
}
