//! # Configuration Management Module
//!
//! TOML configuration for the serial link, the monitor, the value-up counter and
//! logging. Every section has defaults, so a partial file is enough.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nodewatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("nodewatch.toml").await?;
//!     config.validate()?;
//!     println!("Serial Port: {}", config.serial.port);
//!
//!     Config::create_default("nodewatch.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! data_bits = 8
//! parity = "none"
//! stop_bits = 1
//!
//! [monitor]
//! registry_capacity = 256
//! sweep_interval_ms = 3000
//! desync_threshold = 4
//! framing = "fixed"
//!
//! [counter]
//! enabled = false
//! interval_ms = 1000
//! ```
//!
//! CLI flags take precedence over file values.

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::link::{FramingMode, DEFAULT_DESYNC_THRESHOLD};
use crate::monitor::{MonitorOptions, MonitorTaskConfig, TickInterval, DEFAULT_QUEUE_DEPTH};
use crate::nodes::DEFAULT_CAPACITY;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// 5, 6, 7 or 8
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2
    pub stop_bits: u8,
    pub read_timeout_ms: u64,
    /// Assert DTR after opening.
    pub dtr: bool,
    /// Assert RTS after opening.
    pub rts: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            read_timeout_ms: 100,
            dtr: false,
            rts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub registry_capacity: usize,
    /// Sweep period; must be > 0. Absent means sweeps only run on demand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval_ms: Option<i64>,
    /// Consecutive malformed frames that raise a desync warning (0 disables).
    pub desync_threshold: u32,
    pub framing: FramingMode,
    /// Bound on queued link chunks / commands before producers wait.
    pub queue_depth: usize,
    /// Hex-dump every received chunk at debug level.
    pub log_traffic: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            registry_capacity: DEFAULT_CAPACITY,
            sweep_interval_ms: Some(3000),
            desync_threshold: DEFAULT_DESYNC_THRESHOLD,
            framing: FramingMode::Fixed,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            log_traffic: true,
        }
    }
}

impl MonitorConfig {
    /// Build the task configuration, validating the sweep interval.
    pub fn task_config(&self) -> Result<MonitorTaskConfig> {
        let sweep_interval = self
            .sweep_interval_ms
            .map(TickInterval::from_millis)
            .transpose()?;
        Ok(MonitorTaskConfig {
            options: MonitorOptions {
                registry_capacity: self.registry_capacity,
                framing: self.framing,
                desync_threshold: self.desync_threshold,
                log_traffic: self.log_traffic,
            },
            sweep_interval,
            queue_depth: self.queue_depth,
        })
    }
}

/// Periodic "value up" transmitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub enabled: bool,
    /// Must be > 0.
    pub interval_ms: i64,
    /// First value written.
    pub start: u32,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 1000,
            start: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("nodewatch.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults. A file that exists
    /// and cannot be read or parsed is still an error.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        match fs::metadata(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {}, using defaults", path);
                Ok(Config::default())
            }
            _ => Self::load(path).await,
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(ms) = self.monitor.sweep_interval_ms {
            TickInterval::from_millis(ms)
                .map_err(|e| anyhow!("[monitor] sweep_interval_ms: {}", e))?;
        }
        if self.counter.enabled {
            TickInterval::from_millis(self.counter.interval_ms)
                .map_err(|e| anyhow!("[counter] interval_ms: {}", e))?;
        }
        if self.monitor.registry_capacity == 0 {
            return Err(anyhow!("[monitor] registry_capacity must be at least 1"));
        }
        if self.monitor.queue_depth == 0 {
            return Err(anyhow!("[monitor] queue_depth must be at least 1"));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(anyhow!(
                "[serial] data_bits must be 5-8, got {}",
                self.serial.data_bits
            ));
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(anyhow!(
                "[serial] stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.registry_capacity, 256);
        assert_eq!(config.monitor.framing, FramingMode::Fixed);
        assert!(!config.counter.enabled);
    }

    #[test]
    fn non_positive_sweep_interval_is_rejected() {
        for ms in [0, -1, -3000] {
            let mut config = Config::default();
            config.monitor.sweep_interval_ms = Some(ms);
            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains("sweep_interval_ms"), "unexpected error: {err}");
            assert!(config.monitor.task_config().is_err());
        }
    }

    #[test]
    fn counter_interval_only_checked_when_enabled() {
        let mut config = Config::default();
        config.counter.interval_ms = 0;
        assert!(config.validate().is_ok());
        config.counter.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "COM3"

            [monitor]
            framing = "resync"
            sweep_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.monitor.framing, FramingMode::Resync);
        assert_eq!(config.monitor.desync_threshold, DEFAULT_DESYNC_THRESHOLD);

        let task = config.monitor.task_config().unwrap();
        assert_eq!(
            task.sweep_interval.map(|i| i.as_duration().as_millis()),
            Some(500)
        );
    }

    #[test]
    fn serial_field_ranges() {
        let mut config = Config::default();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());
        config.serial.stop_bits = 2;
        config.serial.data_bits = 9;
        assert!(config.validate().is_err());
    }
}
