//! Tunables for the import diagnostics engine.

use crate::error::CoreError;

/// Default ring-buffer capacity for resource snapshots.
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 100;

/// Hard cap on failure records embedded in a session report.
pub const MAX_REPORTED_FAILURES: usize = 20;

/// Default consecutive-failure count at which timeouts flag contention.
pub const DEFAULT_CONTENTION_THRESHOLD: u32 = 3;

/// Timeout failures must exceed this count before clusters are reported.
pub const DEFAULT_TIMEOUT_CLUSTER_MIN: usize = 5;

/// Constraint failures must exceed this count before hotspots are reported.
pub const DEFAULT_CONSTRAINT_HOTSPOT_MIN: usize = 3;

/// Memory reading above which a failure counts as a pressure point.
pub const DEFAULT_MEMORY_PRESSURE_MB: f64 = 500.0;

/// Thresholds consumed by the pattern analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternThresholds {
    pub timeout_cluster_min: usize,
    pub constraint_hotspot_min: usize,
    pub memory_pressure_mb: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            timeout_cluster_min: DEFAULT_TIMEOUT_CLUSTER_MIN,
            constraint_hotspot_min: DEFAULT_CONSTRAINT_HOTSPOT_MIN,
            memory_pressure_mb: DEFAULT_MEMORY_PRESSURE_MB,
        }
    }
}

/// Engine configuration. All fields have defaults; override via
/// [`DiagnosticsConfig::from_env`] in deployed processes.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub snapshot_capacity: usize,
    /// Clamped to [`MAX_REPORTED_FAILURES`].
    pub max_reported_failures: usize,
    pub contention_threshold: u32,
    pub patterns: PatternThresholds,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
            max_reported_failures: MAX_REPORTED_FAILURES,
            contention_threshold: DEFAULT_CONTENTION_THRESHOLD,
            patterns: PatternThresholds::default(),
        }
    }
}

impl DiagnosticsConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default |
    /// |--------------------------------------|---------|
    /// | `IMPORT_DIAG_SNAPSHOT_CAPACITY`      | `100`   |
    /// | `IMPORT_DIAG_MAX_REPORTED_FAILURES`  | `20`    |
    /// | `IMPORT_DIAG_CONTENTION_THRESHOLD`   | `3`     |
    /// | `IMPORT_DIAG_TIMEOUT_CLUSTER_MIN`    | `5`     |
    /// | `IMPORT_DIAG_CONSTRAINT_HOTSPOT_MIN` | `3`     |
    /// | `IMPORT_DIAG_MEMORY_PRESSURE_MB`     | `500`   |
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let max_reported_failures: usize = parse_or(
            &lookup,
            "IMPORT_DIAG_MAX_REPORTED_FAILURES",
            defaults.max_reported_failures,
        );
        Self {
            snapshot_capacity: parse_or(
                &lookup,
                "IMPORT_DIAG_SNAPSHOT_CAPACITY",
                defaults.snapshot_capacity,
            ),
            max_reported_failures: max_reported_failures.min(MAX_REPORTED_FAILURES),
            contention_threshold: parse_or(
                &lookup,
                "IMPORT_DIAG_CONTENTION_THRESHOLD",
                defaults.contention_threshold,
            ),
            patterns: PatternThresholds {
                timeout_cluster_min: parse_or(
                    &lookup,
                    "IMPORT_DIAG_TIMEOUT_CLUSTER_MIN",
                    defaults.patterns.timeout_cluster_min,
                ),
                constraint_hotspot_min: parse_or(
                    &lookup,
                    "IMPORT_DIAG_CONSTRAINT_HOTSPOT_MIN",
                    defaults.patterns.constraint_hotspot_min,
                ),
                memory_pressure_mb: parse_or(
                    &lookup,
                    "IMPORT_DIAG_MEMORY_PRESSURE_MB",
                    defaults.patterns.memory_pressure_mb,
                ),
            },
        }
    }

    /// Reject configurations the engine cannot operate with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.snapshot_capacity == 0 {
            return Err(CoreError::Validation(
                "snapshot_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_reported_failures == 0 || self.max_reported_failures > MAX_REPORTED_FAILURES {
            return Err(CoreError::Validation(format!(
                "max_reported_failures must be between 1 and {MAX_REPORTED_FAILURES}"
            )));
        }
        if self.contention_threshold == 0 {
            return Err(CoreError::Validation(
                "contention_threshold must be at least 1".to_string(),
            ));
        }
        if !self.patterns.memory_pressure_mb.is_finite() || self.patterns.memory_pressure_mb < 0.0 {
            return Err(CoreError::Validation(
                "memory_pressure_mb must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
