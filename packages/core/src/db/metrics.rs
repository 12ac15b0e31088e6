//! Latency Metrics for Backend Parity Runs
//!
//! Collects per-operation latencies of the document and relational adapters
//! while the parity runner replays the same operation against both.
//!
//! # Usage
//!
//! ```rust
//! use recordspace_core::db::metrics::LatencyCollector;
//! use std::time::Duration;
//!
//! let mut collector = LatencyCollector::new();
//! collector.record("create", Duration::from_millis(3), Duration::from_millis(2));
//! collector.record("find_many", Duration::from_millis(8), Duration::from_millis(5));
//!
//! println!("{}", collector.report());
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// One operation timed on both back-ends
#[derive(Debug, Clone, Serialize)]
pub struct LatencySample {
    pub operation: String,
    pub document: Duration,
    pub relational: Duration,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregates for one operation
#[derive(Debug, Clone, Serialize)]
pub struct LatencyStats {
    pub operation: String,
    pub samples: usize,
    pub document: Percentiles,
    pub relational: Percentiles,
    /// Relational average relative to document average; positive = relational slower
    pub delta_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub avg: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl Percentiles {
    fn from_samples(mut durations: Vec<Duration>) -> Self {
        durations.sort();
        let total: Duration = durations.iter().sum();
        let avg = if durations.is_empty() {
            Duration::ZERO
        } else {
            total / durations.len() as u32
        };

        Self {
            avg,
            p50: percentile(&durations, 50.0),
            p95: percentile(&durations, 95.0),
            p99: percentile(&durations, 99.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LatencyCollector {
    samples: Vec<LatencySample>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation: &str, document: Duration, relational: Duration) {
        self.samples.push(LatencySample {
            operation: operation.to_string(),
            document,
            relational,
            recorded_at: Utc::now(),
        });
    }

    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    /// Distinct operation names, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut operations: Vec<&str> = self.samples.iter().map(|s| s.operation.as_str()).collect();
        operations.sort_unstable();
        operations.dedup();
        operations
    }

    /// `None` when nothing was recorded for `operation`
    pub fn stats_for(&self, operation: &str) -> Option<LatencyStats> {
        let matching: Vec<&LatencySample> = self
            .samples
            .iter()
            .filter(|s| s.operation == operation)
            .collect();
        if matching.is_empty() {
            return None;
        }

        let document = Percentiles::from_samples(matching.iter().map(|s| s.document).collect());
        let relational =
            Percentiles::from_samples(matching.iter().map(|s| s.relational).collect());

        Some(LatencyStats {
            operation: operation.to_string(),
            samples: matching.len(),
            delta_percent: delta_percent(document.avg, relational.avg),
            document,
            relational,
        })
    }

    pub fn report(&self) -> String {
        let mut report = String::from("=== Backend Parity Latency ===\n");
        report.push_str(&format!("Samples recorded: {}\n\n", self.samples.len()));

        for operation in self.operations() {
            let Some(stats) = self.stats_for(operation) else {
                continue;
            };
            report.push_str(&format!("{} ({} samples)\n", stats.operation, stats.samples));
            for (label, p) in [("document", stats.document), ("relational", stats.relational)] {
                report.push_str(&format!(
                    "  {:<10} avg {:.2}ms | p50 {:.2}ms | p95 {:.2}ms | p99 {:.2}ms\n",
                    label,
                    millis(p.avg),
                    millis(p.p50),
                    millis(p.p95),
                    millis(p.p99)
                ));
            }
            report.push_str(&format!("  Δ {:+.2}%\n\n", stats.delta_percent));
        }
        report
    }

    /// Write every sample plus per-operation stats as pretty JSON
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let stats: Vec<LatencyStats> = self
            .operations()
            .into_iter()
            .filter_map(|op| self.stats_for(op))
            .collect();
        let body = serde_json::json!({
            "samples": self.samples,
            "stats": stats,
        });
        std::fs::write(path, serde_json::to_vec_pretty(&body)?)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// `(b - a) / a` as a percentage; 0 when `a` is zero
pub(crate) fn delta_percent(a: Duration, b: Duration) -> f64 {
    if a.is_zero() {
        return 0.0;
    }
    let a = a.as_nanos() as f64;
    (b.as_nanos() as f64 - a) / a * 100.0
}

/// Nearest-rank percentile over sorted durations
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = ((pct / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}
