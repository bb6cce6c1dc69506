//! Point-in-time resource sampling for import sessions.
//!
//! Host introspection sits behind [`ResourceProbe`] so the engine has no
//! platform dependency. Probes are best-effort: a reading that cannot be
//! taken is reported as zero, never as an error.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

const KB_PER_MB: f64 = 1024.0;

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Source of resource readings. Every method defaults to "unavailable".
pub trait ResourceProbe: Send + Sync {
    /// Resident memory of this process, in megabytes.
    fn memory_usage_mb(&self) -> f64 {
        0.0
    }

    /// Share of the connection pool in use, as a percentage.
    fn connection_pool_usage(&self) -> f64 {
        0.0
    }

    /// Connections currently checked out of the pool.
    fn active_connections(&self) -> u32 {
        0
    }

    fn cpu_load(&self) -> Option<f64> {
        None
    }
}

/// Probe that reports nothing. Used when the host offers no introspection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl ResourceProbe for NoopProbe {}

/// Reads the resident set size of the current process from
/// `/proc/self/status`. Reports zero on platforms without procfs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemoryProbe;

impl ProcessMemoryProbe {
    /// Parse the `VmRSS:` line of a `/proc/<pid>/status` document.
    pub fn parse_vm_rss_mb(status: &str) -> Option<f64> {
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        let kb: f64 = line
            .trim_start_matches("VmRSS:")
            .split_whitespace()
            .next()?
            .parse()
            .ok()?;
        Some(kb / KB_PER_MB)
    }
}

impl ResourceProbe for ProcessMemoryProbe {
    fn memory_usage_mb(&self) -> f64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| Self::parse_vm_rss_mb(&status))
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One reading taken during an import session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_usage_mb: f64,
    pub connection_pool_usage: f64,
    pub active_connections: u32,
    pub cpu_load: Option<f64>,
    pub timestamp: Timestamp,
}

impl ResourceSnapshot {
    /// Read every metric from `probe` once.
    pub fn capture(probe: &dyn ResourceProbe) -> Self {
        Self {
            memory_usage_mb: sanitize_reading(probe.memory_usage_mb()),
            connection_pool_usage: sanitize_reading(probe.connection_pool_usage()),
            active_connections: probe.active_connections(),
            cpu_load: probe.cpu_load().filter(|v| v.is_finite()),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// NaN or negative readings are treated as unavailable.
fn sanitize_reading(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// ResourceSampler
// ---------------------------------------------------------------------------

/// Bounded ring buffer of snapshots plus a running memory peak.
///
/// The peak survives eviction, so it is the maximum over every snapshot
/// taken since the last [`clear`](Self::clear).
#[derive(Debug)]
pub struct ResourceSampler {
    capacity: usize,
    snapshots: VecDeque<ResourceSnapshot>,
    peak_memory_mb: f64,
}

impl ResourceSampler {
    /// Create a sampler retaining at most `capacity` snapshots (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity),
            peak_memory_mb: 0.0,
        }
    }

    /// Take a snapshot from `probe` and retain it.
    pub fn sample(&mut self, probe: &dyn ResourceProbe) -> ResourceSnapshot {
        let snapshot = ResourceSnapshot::capture(probe);
        self.push(snapshot.clone());
        snapshot
    }

    /// Retain an externally captured snapshot, evicting the oldest if full.
    pub fn push(&mut self, snapshot: ResourceSnapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.peak_memory_mb = self.peak_memory_mb.max(snapshot.memory_usage_mb);
        self.snapshots.push_back(snapshot);
    }

    /// Highest memory reading seen, or 0 if nothing was sampled.
    pub fn peak(&self) -> f64 {
        self.peak_memory_mb
    }

    /// Retained snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &ResourceSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.peak_memory_mb = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Reports an increasing memory reading on every call.
    struct CountingProbe {
        calls: AtomicU32,
    }

    impl ResourceProbe for CountingProbe {
        fn memory_usage_mb(&self) -> f64 {
            f64::from(self.calls.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn active_connections(&self) -> u32 {
            4
        }
    }

    struct BrokenProbe;

    impl ResourceProbe for BrokenProbe {
        fn memory_usage_mb(&self) -> f64 {
            f64::NAN
        }

        fn connection_pool_usage(&self) -> f64 {
            -3.0
        }

        fn cpu_load(&self) -> Option<f64> {
            Some(f64::INFINITY)
        }
    }

    #[test]
    fn noop_probe_reports_zero() {
        let snapshot = ResourceSnapshot::capture(&NoopProbe);
        assert_eq!(snapshot.memory_usage_mb, 0.0);
        assert_eq!(snapshot.connection_pool_usage, 0.0);
        assert_eq!(snapshot.active_connections, 0);
        assert!(snapshot.cpu_load.is_none());
    }

    #[test]
    fn invalid_readings_become_zero() {
        let snapshot = ResourceSnapshot::capture(&BrokenProbe);
        assert_eq!(snapshot.memory_usage_mb, 0.0);
        assert_eq!(snapshot.connection_pool_usage, 0.0);
        assert!(snapshot.cpu_load.is_none());
    }

    #[test]
    fn ring_buffer_keeps_most_recent_in_order() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
        };
        let mut sampler = ResourceSampler::new(100);
        for _ in 0..150 {
            sampler.sample(&probe);
        }
        assert_eq!(sampler.len(), 100);
        let readings: Vec<f64> = sampler.snapshots().map(|s| s.memory_usage_mb).collect();
        let expected: Vec<f64> = (51..=150).map(f64::from).collect();
        assert_eq!(readings, expected);
    }

    #[test]
    fn peak_survives_eviction() {
        let mut sampler = ResourceSampler::new(2);
        for mb in [900.0, 10.0, 20.0, 30.0] {
            sampler.push(ResourceSnapshot {
                memory_usage_mb: mb,
                connection_pool_usage: 0.0,
                active_connections: 0,
                cpu_load: None,
                timestamp: chrono::Utc::now(),
            });
        }
        assert_eq!(sampler.len(), 2);
        assert_eq!(sampler.peak(), 900.0);
    }

    #[test]
    fn peak_is_zero_without_samples() {
        assert_eq!(ResourceSampler::new(100).peak(), 0.0);
    }

    #[test]
    fn clear_resets_buffer_and_peak() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
        };
        let mut sampler = ResourceSampler::new(5);
        sampler.sample(&probe);
        sampler.clear();
        assert!(sampler.is_empty());
        assert_eq!(sampler.peak(), 0.0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut sampler = ResourceSampler::new(0);
        sampler.sample(&NoopProbe);
        sampler.sample(&NoopProbe);
        assert_eq!(sampler.capacity(), 1);
        assert_eq!(sampler.len(), 1);
    }

    #[test]
    fn parses_vm_rss_line() {
        let status = "Name:\tsalesdesk\nVmPeak:\t  300000 kB\nVmRSS:\t  204800 kB\nThreads:\t8\n";
        assert_eq!(ProcessMemoryProbe::parse_vm_rss_mb(status), Some(200.0));
    }

    #[test]
    fn missing_vm_rss_line_is_none() {
        assert_eq!(ProcessMemoryProbe::parse_vm_rss_mb("Name:\tx\n"), None);
        assert_eq!(ProcessMemoryProbe::parse_vm_rss_mb("VmRSS:\tgarbage kB\n"), None);
    }

    #[test]
    fn process_probe_never_panics() {
        let mb = ProcessMemoryProbe.memory_usage_mb();
        assert!(mb >= 0.0);
    }
}
