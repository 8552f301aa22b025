//! sluice.toml configuration parser.
//!
//! Every section and every field is optional; missing values fall back to
//! the defaults below. Durations are written as strings (`"500ms"`, `"1s"`,
//! `"5m"`) and parsed on access.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Severity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    pub queue: QueueConfig,
    pub pool: PoolConfig,
    pub autoscale: AutoscaleConfig,
    pub alert: AlertConfig,
    pub generator: GeneratorConfig,
    pub report: ReportConfig,
    pub store: StoreConfig,
}

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The producer waits for a free slot.
    #[default]
    Block,
    /// The record is discarded and the drop is logged.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            overflow: OverflowPolicy::Block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Records at or above this severity are persisted.
    pub persist_severity: Severity,
    /// Upper bound on a single persist call.
    pub persist_timeout: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 20,
            persist_severity: Severity::Error,
            persist_timeout: "5s".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn persist_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.persist_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub interval: String,
    /// Grow when queue depth is strictly above this.
    pub high_watermark: usize,
    /// Shrink when queue depth is strictly below this.
    pub low_watermark: usize,
    pub grow_step: usize,
    pub shrink_step: usize,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            interval: "1s".to_string(),
            high_watermark: 50,
            low_watermark: 20,
            grow_step: 2,
            shrink_step: 1,
        }
    }
}

impl AutoscaleConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub period: String,
    /// An alert fires when the window count is strictly greater than this.
    pub threshold: u64,
    /// Records at or above this severity count toward the window.
    pub severity: Severity,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            period: "20s".to_string(),
            threshold: 5,
            severity: Severity::Error,
        }
    }
}

impl AlertConfig {
    pub fn period(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub enabled: bool,
    /// Records produced per tick.
    pub batch: usize,
    pub interval: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch: 100,
            interval: "1s".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// `"0s"` disables the report loop.
    pub interval: String,
    pub limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval: "15s".to_string(),
            limit: 5,
        }
    }
}

impl ReportConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// On-disk database file. `None` keeps persisted records in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl SluiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SluiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints and that every duration parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be positive".into()));
        }
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid("pool.max_workers must be positive".into()));
        }
        if self.pool.min_workers > self.pool.max_workers {
            return Err(ConfigError::Invalid(format!(
                "pool.min_workers ({}) exceeds pool.max_workers ({})",
                self.pool.min_workers, self.pool.max_workers
            )));
        }
        if self.autoscale.low_watermark > self.autoscale.high_watermark {
            return Err(ConfigError::Invalid(format!(
                "autoscale.low_watermark ({}) exceeds autoscale.high_watermark ({})",
                self.autoscale.low_watermark, self.autoscale.high_watermark
            )));
        }
        if self.autoscale.grow_step == 0 || self.autoscale.shrink_step == 0 {
            return Err(ConfigError::Invalid("autoscale steps must be positive".into()));
        }

        self.report.interval()?;
        for (name, duration) in [
            ("pool.persist_timeout", self.pool.persist_timeout()?),
            ("autoscale.interval", self.autoscale.interval()?),
            ("alert.period", self.alert.period()?),
            ("generator.interval", self.generator.interval()?),
        ] {
            if duration.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Parse a duration string like `"250ms"`, `"30s"`, `"5m"`, `"1h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    let (digits, scale_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    let millis = value.checked_mul(scale_ms).ok_or_else(invalid)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SluiceConfig::default();
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.queue.overflow, OverflowPolicy::Block);
        assert_eq!(config.pool.min_workers, 2);
        assert_eq!(config.pool.max_workers, 20);
        assert_eq!(config.autoscale.high_watermark, 50);
        assert_eq!(config.autoscale.low_watermark, 20);
        assert_eq!(config.autoscale.grow_step, 2);
        assert_eq!(config.autoscale.shrink_step, 1);
        assert_eq!(config.autoscale.interval().unwrap(), Duration::from_secs(1));
        assert_eq!(config.alert.period().unwrap(), Duration::from_secs(20));
        assert_eq!(config.alert.threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_empty_document_uses_defaults() {
        let config = SluiceConfig::parse("").unwrap();
        assert_eq!(config, SluiceConfig::default());
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[queue]
capacity = 500
overflow = "drop"

[autoscale]
high_watermark = 200
interval = "250ms"

[alert]
severity = "critical"
"#;
        let config = SluiceConfig::parse(toml_str).unwrap();
        assert_eq!(config.queue.capacity, 500);
        assert_eq!(config.queue.overflow, OverflowPolicy::Drop);
        assert_eq!(config.autoscale.high_watermark, 200);
        assert_eq!(config.autoscale.low_watermark, 20);
        assert_eq!(config.autoscale.interval().unwrap(), Duration::from_millis(250));
        assert_eq!(config.alert.severity, Severity::Critical);
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let toml_str = r#"
[autoscale]
high_watermark = 10
low_watermark = 30
"#;
        assert!(matches!(
            SluiceConfig::parse(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_min_above_max() {
        let mut config = SluiceConfig::default();
        config.pool.min_workers = 8;
        config.pool.max_workers = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_alert_period() {
        let mut config = SluiceConfig::default();
        config.alert.period = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_persist_timeout() {
        let toml_str = r#"
[pool]
persist_timeout = "0s"
"#;
        match SluiceConfig::parse(toml_str) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("pool.persist_timeout")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let config = SluiceConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("high_watermark = 50"));
        assert_eq!(SluiceConfig::parse(&rendered).unwrap(), config);
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("soon").is_err());
    }
}
