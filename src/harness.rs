//! Hardware-in-the-loop test flows.
//!
//! A [`Harness`] owns the device collaborators and runs the two on-target
//! tests: flashing firmware and checking its UART output, and measuring
//! whether the device settles into its low-power state.
//!
//! Every flow ends in a [`TestVerdict`], which separates a device that
//! failed the test (`Failed`) from infrastructure that could not run it
//! (`Skipped`). Anything else is returned as an error.

use std::fmt;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use powerwatch_types::{Badge, Outcome};

use crate::badge::{save_badge, BadgeError};
use crate::device::{
    CommandPowerSwitch, Core, DeviceControl, NoPowerSwitch, NrfUtil, PowerSwitch, ResetKind,
};
use crate::duration::format_duration;
use crate::monitor::{MonitorError, SettleMonitor};
use crate::settings::Settings;
use crate::source::SampleSource;
use crate::uart::{self, UartError, UartLog};

/// How long the DUT stays unpowered during a recovery power cycle.
const POWER_OFF_TIME: Duration = Duration::from_secs(2);
/// How long to wait for the DUT to boot after a recovery power cycle.
const POWER_ON_SETTLE: Duration = Duration::from_secs(5);

/// Result of an on-target test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestVerdict {
    Passed,
    /// The device did not meet the test's expectations.
    Failed(String),
    /// The test infrastructure could not produce a verdict.
    Skipped(String),
}

impl TestVerdict {
    /// Process exit status for CI: 0 pass, 1 fail, 77 skip.
    pub fn exit_code(&self) -> u8 {
        match self {
            TestVerdict::Passed => 0,
            TestVerdict::Failed(_) => 1,
            TestVerdict::Skipped(_) => 77,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestVerdict::Passed => "passed",
            TestVerdict::Failed(_) => "failed",
            TestVerdict::Skipped(_) => "skipped",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TestVerdict::Passed => None,
            TestVerdict::Failed(reason) | TestVerdict::Skipped(reason) => Some(reason),
        }
    }
}

impl fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.label().to_uppercase(), reason),
            None => f.write_str("PASSED"),
        }
    }
}

/// Everything a power test produced.
#[derive(Debug, Clone)]
pub struct PowerReport {
    pub verdict: TestVerdict,
    /// Present when the monitor reached a terminal state.
    pub outcome: Option<Outcome>,
    /// Present when a badge file was written.
    pub badge: Option<Badge>,
}

impl PowerReport {
    fn without_measurement(verdict: TestVerdict) -> Self {
        Self {
            verdict,
            outcome: None,
            badge: None,
        }
    }

    /// Render the report as JSON for CI artifacts.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "verdict": self.verdict.label(),
            "reason": self.verdict.reason(),
            "outcome": self.outcome.map(|o| serde_json::json!({
                "state": o.verdict(),
                "min_rolling_average_ua": o.has_measurement().then_some(o.min_rolling_average),
                "polls": o.polls,
                "elapsed": format_duration(o.elapsed),
            })),
            "badge": self.badge,
        })
    }
}

/// Runs on-target tests against one device.
#[derive(Debug, Clone)]
pub struct Harness {
    settings: Settings,
    device: Arc<dyn DeviceControl>,
    power: Arc<dyn PowerSwitch>,
}

impl Harness {
    pub fn new(
        settings: Settings,
        device: Arc<dyn DeviceControl>,
        power: Arc<dyn PowerSwitch>,
    ) -> Self {
        Self {
            settings,
            device,
            power,
        }
    }

    /// Build the production collaborators (`nrfutil`, command power switch)
    /// from settings.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let device = NrfUtil::new(settings.serial_number()?)
            .with_program(settings.device.programmer.clone())
            .with_program_args(settings.device.program_args.clone());

        let on = &settings.device.power_on_command;
        let off = &settings.device.power_off_command;
        let power: Arc<dyn PowerSwitch> = if on.is_empty() && off.is_empty() {
            Arc::new(NoPowerSwitch)
        } else {
            Arc::new(CommandPowerSwitch::new(on.clone(), off.clone())?)
        };

        Ok(Self::new(settings, Arc::new(device), power))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn flash(&self, firmware: &Path) -> Result<()> {
        let device = self.device.clone();
        let firmware = firmware.to_path_buf();
        blocking(move || device.flash(&firmware))
            .await
            .context("Flashing failed")
    }

    pub async fn reset(&self, kind: ResetKind) -> Result<()> {
        let device = self.device.clone();
        blocking(move || device.reset(kind)).await.context("Reset failed")
    }

    pub async fn recover(&self, core: Core) -> Result<()> {
        let device = self.device.clone();
        blocking(move || device.recover(core)).await.context("Recover failed")
    }

    /// Find and open the log UART.
    ///
    /// Discovery is retried per the UART settings, power cycling the DUT
    /// before each retry.
    pub async fn open_uart(&self) -> Result<UartLog> {
        let dir = self.settings.uart.by_id_dir.clone();
        let id = self.settings.uart_id()?.to_string();
        let policy = self.settings.uart_retry();
        let power = self.power.clone();

        let path = blocking(move || {
            policy.run("UART discovery", |attempt| {
                if attempt > 1 {
                    if let Err(e) = power.cycle(POWER_OFF_TIME, POWER_ON_SETTLE) {
                        tracing::warn!("DUT power cycle failed: {}", e);
                    }
                }
                uart::discover_first(&dir, &id)
            })
        })
        .await
        .context("No UART after retries")?;

        Ok(uart::open(&path, self.settings.uart.baud_rate)?)
    }

    /// Flash `firmware` and wait for the expected UART lines.
    ///
    /// Lines logged before flashing come from the previous firmware and are
    /// discarded.
    pub async fn run_uart_test(&self, firmware: &Path, uart: &mut UartLog) -> Result<TestVerdict> {
        let stale = uart.flush();
        if stale > 0 {
            tracing::debug!("Discarded {} UART lines from before flashing", stale);
        }
        self.flash(firmware).await?;

        let expected = &self.settings.uart.expected_lines;
        tracing::info!("Waiting for expected lines on UART");
        match uart.wait_for_all(expected.as_slice(), self.settings.uart.expected_timeout).await {
            Ok(()) => {
                tracing::info!("Expected lines found");
                Ok(TestVerdict::Passed)
            }
            Err(e @ UartError::Timeout { .. }) => Ok(TestVerdict::Failed(e.to_string())),
            Err(e @ UartError::Closed { .. }) => Ok(TestVerdict::Skipped(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Reset the device and measure whether it settles into low power.
    ///
    /// The caller owns the probe: it must already be streaming into
    /// `source`. When a UART is given, pre-measure commands are sent and
    /// boot markers awaited. A badge is written for settled and timed-out
    /// runs.
    pub async fn run_power_test<S>(
        &self,
        mut source: S,
        mut uart: Option<&mut UartLog>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<PowerReport>
    where
        S: SampleSource + 'static,
    {
        let mut monitor = SettleMonitor::new(self.settings.monitor_config())?;
        if let Some(flag) = cancel {
            monitor = monitor.with_cancel(flag);
        }

        self.reset(ResetKind::System).await?;
        tokio::time::sleep(self.settings.device.boot_delay).await;

        if let Some(uart) = uart.as_deref_mut() {
            for command in &self.settings.uart.pre_measure_commands {
                uart.send_line(command)?;
            }
            uart.flush();
        }

        // Boot
        self.reset(ResetKind::System).await?;

        if let Some(uart) = uart.as_deref_mut() {
            let markers = &self.settings.uart.boot_markers;
            if !markers.is_empty() {
                match uart.wait_for_all(markers.as_slice(), self.settings.uart.boot_timeout).await {
                    Ok(()) => {}
                    Err(e @ UartError::Timeout { .. }) => {
                        return Ok(PowerReport::without_measurement(TestVerdict::Failed(
                            format!("Device did not boot: {}", e),
                        )));
                    }
                    Err(e) => {
                        return Ok(PowerReport::without_measurement(TestVerdict::Skipped(
                            format!("UART unavailable: {}", e),
                        )));
                    }
                }
            }
        }

        let result = tokio::task::spawn_blocking(move || monitor.run(&mut source))
            .await
            .context("Settle monitor panicked")?;
        self.judge(result)
    }

    /// Turn a monitor result into a report, writing the badge when there
    /// is a measurement to record.
    fn judge(&self, result: Result<Outcome, MonitorError>) -> Result<PowerReport> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_inconclusive() => {
                tracing::error!("Catching exception: {}", e);
                return Ok(PowerReport::without_measurement(TestVerdict::Skipped(format!(
                    "Something went wrong, unable to perform power measurements: {}",
                    e
                ))));
            }
            Err(e) => return Err(e.into()),
        };

        let badge_settings = &self.settings.badge;
        let badge = match save_badge(
            &badge_settings.path,
            outcome.min_rolling_average,
            &badge_settings.thresholds(),
        ) {
            Ok(badge) => badge,
            Err(e @ BadgeError::InvalidMeasurement(_)) => {
                return Ok(PowerReport {
                    verdict: TestVerdict::Failed(e.to_string()),
                    outcome: Some(outcome),
                    badge: None,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let verdict = if outcome.settled {
            TestVerdict::Passed
        } else {
            TestVerdict::Failed(format!(
                "PSM target not reached after {}, only reached {} uA",
                format_duration(self.settings.power.timeout),
                outcome.min_rolling_average
            ))
        };

        Ok(PowerReport {
            verdict,
            outcome: Some(outcome),
            badge: Some(badge),
        })
    }
}

/// Run a blocking collaborator call off the async worker threads.
async fn blocking<T, E, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(TestVerdict::Passed.exit_code(), 0);
        assert_eq!(TestVerdict::Failed("x".into()).exit_code(), 1);
        assert_eq!(TestVerdict::Skipped("x".into()).exit_code(), 77);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(TestVerdict::Passed.to_string(), "PASSED");
        assert_eq!(
            TestVerdict::Skipped("probe unplugged".into()).to_string(),
            "SKIPPED: probe unplugged"
        );
    }

    #[test]
    fn test_report_json_hides_infinite_minimum() {
        let report = PowerReport {
            verdict: TestVerdict::Failed("timeout".into()),
            outcome: Some(Outcome {
                settled: false,
                min_rolling_average: f64::INFINITY,
                polls: 3,
                elapsed: Duration::from_secs(1),
            }),
            badge: None,
        };

        let json = report.to_json();
        assert_eq!(json["verdict"], "failed");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["outcome"]["state"], "timed_out");
        assert!(json["outcome"]["min_rolling_average_ua"].is_null());
        assert_eq!(json["outcome"]["polls"], 3);
        assert!(json["badge"].is_null());
    }

    #[test]
    fn test_from_settings_requires_serial_number() {
        assert!(Harness::from_settings(Settings::default()).is_err());

        let mut settings = Settings::default();
        settings.device.serial_number = Some("001050123456".into());
        let harness = Harness::from_settings(settings).unwrap();
        assert_eq!(harness.settings().serial_number().unwrap(), "001050123456");
    }

    #[test]
    fn test_from_settings_rejects_half_power_switch() {
        let mut settings = Settings::default();
        settings.device.serial_number = Some("1".into());
        settings.device.power_on_command = vec!["true".into()];
        let err = Harness::from_settings(settings).unwrap_err();
        assert!(err.downcast_ref::<DeviceError>().is_some());
    }
}
