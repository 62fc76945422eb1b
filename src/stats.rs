//! Serving statistics
//!
//! This module collects per-operation timing series and system memory
//! readings for the stats route and startup logging.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::utils::format_bytes;

/// Timing series name for full prediction runs
pub const PREDICT_TIMER: &str = "run_predictor_total";

/// Collects named duration series
pub struct StatsCollector {
    timings: RwLock<HashMap<String, Vec<f64>>>,
    start_time: Instant,
}

/// Aggregated view of one timing series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl StatsCollector {
    /// Create a new stats collector
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record the duration of an operation
    pub fn record_duration(&self, name: &str, duration: Duration) {
        let mut timings = self.timings.write();
        timings
            .entry(name.to_string())
            .or_insert_with(Vec::new)
            .push(duration.as_secs_f64() * 1000.0);
    }

    /// Aggregate every series recorded so far
    pub fn time_info(&self) -> HashMap<String, TimingStats> {
        let timings = self.timings.read();
        timings
            .iter()
            .map(|(name, values)| (name.clone(), calculate_timing_stats(values)))
            .collect()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn calculate_timing_stats(values: &[f64]) -> TimingStats {
    if values.is_empty() {
        return TimingStats {
            count: 0,
            avg_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        };
    }

    let count = values.len();
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    TimingStats {
        count,
        avg_ms: sum / count as f64,
        min_ms: min,
        max_ms: max,
    }
}

/// System and process memory information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    /// Resident set size of this process
    pub rss_bytes: u64,
}

impl MemoryInfo {
    /// Get memory usage as a percentage
    pub fn usage_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.used_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Format memory info as a string
    pub fn format(&self) -> String {
        format!(
            "Memory: {} used / {} total ({:.1}%), rss {}",
            format_bytes(self.used_bytes as usize),
            format_bytes(self.total_bytes as usize),
            self.usage_percentage(),
            format_bytes(self.rss_bytes as usize)
        )
    }
}

/// Get system memory information
pub fn memory_info() -> Result<MemoryInfo> {
    #[cfg(target_os = "linux")]
    {
        let meminfo = std::fs::read_to_string("/proc/meminfo")?;
        let (total, available) = parse_meminfo(&meminfo).ok_or_else(|| {
            crate::error::RunnerError::internal("Failed to parse memory information")
        })?;

        let rss = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss(&status))
            .unwrap_or(0);

        Ok(MemoryInfo {
            total_bytes: total,
            available_bytes: available,
            used_bytes: total.saturating_sub(available),
            rss_bytes: rss,
        })
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("Memory information not available on this platform");
        Ok(MemoryInfo {
            total_bytes: 0,
            available_bytes: 0,
            used_bytes: 0,
            rss_bytes: 0,
        })
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(meminfo: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;

    for line in meminfo.lines() {
        if line.starts_with("MemTotal:") {
            total = second_field_kb(line);
        } else if line.starts_with("MemAvailable:") {
            available = second_field_kb(line);
        }
    }

    Some((total?, available?))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(second_field_kb)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn second_field_kb(line: &str) -> Option<u64> {
    line.split_whitespace()
        .nth(1)
        .and_then(|value| value.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_aggregation() {
        let stats = StatsCollector::new();
        stats.record_duration(PREDICT_TIMER, Duration::from_millis(10));
        stats.record_duration(PREDICT_TIMER, Duration::from_millis(20));
        stats.record_duration(PREDICT_TIMER, Duration::from_millis(30));
        stats.record_duration("load", Duration::from_millis(500));

        let time_info = stats.time_info();
        let predict = time_info.get(PREDICT_TIMER).unwrap();
        assert_eq!(predict.count, 3);
        assert!((predict.avg_ms - 20.0).abs() < 1.0);
        assert!(predict.min_ms <= predict.avg_ms);
        assert!(predict.max_ms >= predict.avg_ms);

        assert_eq!(time_info.get("load").unwrap().count, 1);
    }

    #[test]
    fn test_empty_series_aggregates_to_zeros() {
        let stats = calculate_timing_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_ms, 0.0);
    }

    #[test]
    fn test_meminfo_parsing() {
        let text = "MemTotal:       16384000 kB\nMemFree:         1024000 kB\nMemAvailable:    8192000 kB\n";
        let (total, available) = parse_meminfo(text).unwrap();
        assert_eq!(total, 16384000 * 1024);
        assert_eq!(available, 8192000 * 1024);

        assert!(parse_meminfo("MemTotal: 123 kB\n").is_none());
    }

    #[test]
    fn test_vm_rss_parsing() {
        let text = "Name:   plinth\nVmPeak:   102400 kB\nVmRSS:     51200 kB\n";
        assert_eq!(parse_vm_rss(text), Some(51200 * 1024));
        assert_eq!(parse_vm_rss("Name: x\n"), None);
    }

    #[test]
    fn test_memory_info_percentage() {
        let memory = MemoryInfo {
            total_bytes: 1000,
            available_bytes: 300,
            used_bytes: 700,
            rss_bytes: 100,
        };

        assert_eq!(memory.usage_percentage(), 70.0);
    }
}
