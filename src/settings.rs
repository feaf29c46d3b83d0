//! Harness settings.
//!
//! Settings come from an optional TOML file layered under environment
//! variables prefixed with `POWERWATCH`, using `__` to separate sections:
//!
//! ```toml
//! [device]
//! serial_number = "001050123456"
//!
//! [power]
//! threshold_ua = 10.0
//! window = "3s"
//! poll_interval = "10ms"
//! timeout = "5m"
//!
//! [badge]
//! path = "power_badge.json"
//! ```
//!
//! ```bash
//! POWERWATCH_DEVICE__SERIAL_NUMBER=001050123456 powerwatch power-test --connect localhost:5555
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use powerwatch_types::ColorThresholds;
use serde::Deserialize;

use crate::badge::DEFAULT_BADGE_PATH;
use crate::device::DEFAULT_PROGRAM;
use crate::monitor::MonitorConfig;
use crate::retry::RetryPolicy;
use crate::uart::{DEFAULT_BAUD_RATE, DEFAULT_BY_ID_DIR};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "POWERWATCH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: DeviceSettings,
    pub uart: UartSettings,
    pub power: PowerSettings,
    pub badge: BadgeSettings,
}

/// The device under test and the tools that drive it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Debugger serial number passed to the programmer.
    pub serial_number: Option<String>,
    /// Programmer executable.
    pub programmer: String,
    /// Extra arguments for `device program`.
    pub program_args: Vec<String>,
    /// Wait after a reset before talking to the device.
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub boot_delay: Duration,
    /// Command (argv) that turns DUT power on.
    pub power_on_command: Vec<String>,
    /// Command (argv) that turns DUT power off.
    pub power_off_command: Vec<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            serial_number: None,
            programmer: DEFAULT_PROGRAM.to_string(),
            program_args: Vec::new(),
            boot_delay: Duration::from_secs(5),
            power_on_command: Vec::new(),
            power_off_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UartSettings {
    /// Substring identifying the log UART; defaults to the serial number.
    pub id: Option<String>,
    pub by_id_dir: PathBuf,
    pub baud_rate: u32,
    /// Discovery attempts; the DUT is power cycled between attempts.
    pub discovery_attempts: u32,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub discovery_delay: Duration,
    /// Lines expected after flashing.
    pub expected_lines: Vec<String>,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub expected_timeout: Duration,
    /// Lines to wait for after the measurement reset; empty to skip.
    pub boot_markers: Vec<String>,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub boot_timeout: Duration,
    /// Shell commands sent before measuring (e.g. a factory reset).
    pub pre_measure_commands: Vec<String>,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            id: None,
            by_id_dir: PathBuf::from(DEFAULT_BY_ID_DIR),
            baud_rate: DEFAULT_BAUD_RATE,
            discovery_attempts: 10,
            discovery_delay: Duration::from_secs(2),
            expected_lines: vec![
                "Network connectivity established".to_string(),
                "Connected to Cloud".to_string(),
            ],
            expected_timeout: Duration::from_secs(60),
            boot_markers: Vec::new(),
            boot_timeout: Duration::from_secs(120),
            pre_measure_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    pub threshold_ua: f64,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub window: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub log_interval: Duration,
}

impl Default for PowerSettings {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            threshold_ua: monitor.threshold,
            window: monitor.window_duration,
            poll_interval: monitor.poll_interval,
            timeout: monitor.overall_timeout,
            log_interval: monitor.log_interval,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BadgeSettings {
    pub path: PathBuf,
    pub green_max_ua: f64,
    pub yellow_max_ua: f64,
}

impl Default for BadgeSettings {
    fn default() -> Self {
        let thresholds = ColorThresholds::default();
        Self {
            path: PathBuf::from(DEFAULT_BADGE_PATH),
            green_max_ua: thresholds.green_max,
            yellow_max_ua: thresholds.yellow_max,
        }
    }
}

impl BadgeSettings {
    pub fn thresholds(&self) -> ColorThresholds {
        ColorThresholds {
            green_max: self.green_max_ua,
            yellow_max: self.yellow_max_ua,
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// The configured debugger serial number.
    pub fn serial_number(&self) -> Result<&str, ConfigError> {
        self.device
            .serial_number
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::NotFound("device.serial_number".to_string()))
    }

    /// Identifier used to pick the log UART.
    pub fn uart_id(&self) -> Result<&str, ConfigError> {
        match self.uart.id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => self.serial_number(),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            threshold: self.power.threshold_ua,
            window_duration: self.power.window,
            poll_interval: self.power.poll_interval,
            overall_timeout: self.power.timeout,
            log_interval: self.power.log_interval,
        }
    }

    pub fn uart_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.uart.discovery_attempts, self.uart.discovery_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn toml_file() -> NamedTempFile {
        Builder::new().suffix(".toml").tempfile().unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.device.programmer, "nrfutil");
        assert_eq!(settings.power.threshold_ua, 10.0);
        assert_eq!(settings.monitor_config(), MonitorConfig::default());
        assert_eq!(settings.badge.thresholds(), ColorThresholds::default());
        assert_eq!(settings.uart.expected_lines.len(), 2);
        assert!(settings.serial_number().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = toml_file();
        writeln!(
            file,
            r#"
[device]
serial_number = "001050123456"
boot_delay = "500ms"

[uart]
boot_markers = ["Disabling UARTs"]

[power]
threshold_ua = 8.5
window = "2s"
timeout = "5m"

[badge]
path = "out/badge.json"
yellow_max_ua = 40.0
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.serial_number().unwrap(), "001050123456");
        assert_eq!(settings.uart_id().unwrap(), "001050123456");
        assert_eq!(settings.device.boot_delay, Duration::from_millis(500));
        assert_eq!(settings.uart.boot_markers, vec!["Disabling UARTs"]);

        let monitor = settings.monitor_config();
        assert_eq!(monitor.threshold, 8.5);
        assert_eq!(monitor.window_duration, Duration::from_secs(2));
        assert_eq!(monitor.overall_timeout, Duration::from_secs(300));
        // Untouched fields keep their defaults
        assert_eq!(monitor.poll_interval, Duration::from_millis(10));

        assert_eq!(settings.badge.path, PathBuf::from("out/badge.json"));
        assert_eq!(settings.badge.thresholds().yellow_max, 40.0);
        assert_eq!(settings.badge.thresholds().green_max, 10.0);
    }

    #[test]
    fn test_uart_id_overrides_serial() {
        let mut settings = Settings::default();
        settings.device.serial_number = Some("1234".into());
        settings.uart.id = Some("if02".into());
        assert_eq!(settings.uart_id().unwrap(), "if02");
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let mut file = toml_file();
        writeln!(file, "[power]\nwindow = \"three seconds\"").unwrap();

        assert!(Settings::load(Some(file.path())).is_err());
    }
}
