//! Power settle monitor.
//!
//! Polls a [`SampleSource`], keeps a rolling average of per-poll averages
//! over a sliding window, and reports whether the device settled below a
//! current threshold before the overall timeout.
//!
//! ```text
//!            ┌──────────┐  rolling < threshold   ┌─────────┐
//!   start ──▶│ POLLING  │───────────────────────▶│ SETTLED │
//!            └────┬─────┘                        └─────────┘
//!                 │ timeout elapsed              ┌───────────┐
//!                 ├─────────────────────────────▶│ TIMED_OUT │
//!                 │                              └───────────┘
//!                 │ fetch() failed / cancelled   ┌────────────────────┐
//!                 └─────────────────────────────▶│ ACQUISITION_FAILED │
//!                                                └────────────────────┘
//! ```
//!
//! Settlement is declared on the first rolling average below the threshold;
//! the window is not required to stay below it for a full window duration.

mod clock;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use window::{capacity_for, RollingWindow};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use powerwatch_types::Outcome;
use thiserror::Error;

use crate::duration::format_duration;
use crate::source::{AcquisitionError, SampleSource};

/// Parameters of a settle measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Rolling average (µA) below which the device counts as settled.
    pub threshold: f64,
    /// Span covered by the rolling window.
    pub window_duration: Duration,
    /// Sleep between polls.
    pub poll_interval: Duration,
    /// Give up after this long.
    pub overall_timeout: Duration,
    /// Cadence of progress log lines.
    pub log_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            window_duration: Duration::from_secs(3),
            poll_interval: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(300),
            log_interval: Duration::from_secs(5),
        }
    }
}

impl MonitorConfig {
    /// Check that the configuration can drive a polling loop.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.threshold.is_finite() {
            return Err(MonitorError::InvalidConfig(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(MonitorError::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.window_duration.is_zero() {
            return Err(MonitorError::InvalidConfig("window duration must be non-zero".into()));
        }
        if self.overall_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Number of poll averages held by the rolling window.
    pub fn window_capacity(&self) -> usize {
        capacity_for(self.window_duration, self.poll_interval)
    }
}

/// Reasons a measurement run ends without a verdict.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),

    /// The sample source failed; the run is inconclusive.
    #[error("Sample acquisition failed after {polls} polls: {source}")]
    Acquisition {
        #[source]
        source: AcquisitionError,
        polls: u64,
        min_rolling_average: f64,
    },

    /// The cancellation flag was raised; the run is inconclusive.
    #[error("Measurement cancelled after {polls} polls")]
    Cancelled { polls: u64, min_rolling_average: f64 },
}

impl MonitorError {
    /// True when the run could not be completed because of the test
    /// infrastructure, as opposed to a bad configuration.
    pub fn is_inconclusive(&self) -> bool {
        matches!(self, MonitorError::Acquisition { .. } | MonitorError::Cancelled { .. })
    }
}

/// Mutable state owned by a single polling run.
#[derive(Debug)]
pub(crate) struct MonitorState {
    start: Instant,
    min_rolling_average: f64,
    rolling_average: Option<f64>,
    window: RollingWindow,
    last_log: Instant,
    polls: u64,
}

impl MonitorState {
    pub(crate) fn new(start: Instant, capacity: usize) -> Self {
        Self {
            start,
            min_rolling_average: f64::INFINITY,
            rolling_average: None,
            window: RollingWindow::new(capacity),
            last_log: start,
            polls: 0,
        }
    }

    /// Fold one poll's batch into the window.
    ///
    /// Returns the new rolling average, or `None` for an empty batch (the
    /// previous rolling average is kept).
    pub(crate) fn ingest(&mut self, batch: &[f64]) -> Option<f64> {
        self.polls += 1;
        if batch.is_empty() {
            return None;
        }

        let poll_average = batch.iter().sum::<f64>() / batch.len() as f64;
        self.window.push(poll_average);

        let rolling = self.window.mean()?;
        self.rolling_average = Some(rolling);
        if rolling < self.min_rolling_average {
            self.min_rolling_average = rolling;
        }
        Some(rolling)
    }

    pub(crate) fn min_rolling_average(&self) -> f64 {
        self.min_rolling_average
    }

    fn finish(&self, settled: bool, now: Instant) -> Outcome {
        Outcome {
            settled,
            min_rolling_average: self.min_rolling_average,
            polls: self.polls,
            elapsed: now.saturating_duration_since(self.start),
        }
    }
}

/// Runs the settle measurement loop.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use powerwatch::{ChannelSource, ManualClock, MonitorConfig, SettleMonitor};
///
/// let config = MonitorConfig {
///     threshold: 10.0,
///     window_duration: Duration::from_millis(30),
///     poll_interval: Duration::from_millis(10),
///     overall_timeout: Duration::from_secs(1),
///     ..MonitorConfig::default()
/// };
/// let monitor = SettleMonitor::with_clock(config, ManualClock::new()).unwrap();
///
/// let (tx, mut source) = ChannelSource::create("example");
/// tx.send(vec![4.0, 6.0]).unwrap();
///
/// let outcome = monitor.run(&mut source).unwrap();
/// assert!(outcome.settled);
/// assert_eq!(outcome.min_rolling_average, 5.0);
/// ```
#[derive(Debug)]
pub struct SettleMonitor<C: Clock = SystemClock> {
    config: MonitorConfig,
    clock: C,
    cancel: Option<Arc<AtomicBool>>,
}

impl SettleMonitor<SystemClock> {
    /// Create a monitor driven by the wall clock.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SettleMonitor<C> {
    /// Create a monitor driven by the given clock.
    pub fn with_clock(config: MonitorConfig, clock: C) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            cancel: None,
        })
    }

    /// Abort the run when `flag` becomes true.
    ///
    /// The flag is checked once per poll, before fetching.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Poll `source` until the device settles or the timeout elapses.
    pub fn run<S>(&self, source: &mut S) -> Result<Outcome, MonitorError>
    where
        S: SampleSource + ?Sized,
    {
        let config = &self.config;
        let mut state = MonitorState::new(self.clock.now(), config.window_capacity());

        tracing::info!(
            "Measuring {} (threshold {} uA, window {}, timeout {})",
            source.description(),
            config.threshold,
            format_duration(config.window_duration),
            format_duration(config.overall_timeout)
        );

        loop {
            let now = self.clock.now();
            if now.saturating_duration_since(state.start) >= config.overall_timeout {
                let outcome = state.finish(false, now);
                tracing::warn!(
                    "Threshold not reached after {}, minimum rolling average {} uA",
                    format_duration(config.overall_timeout),
                    outcome.min_rolling_average
                );
                return Ok(outcome);
            }

            if self.is_cancelled() {
                return Err(MonitorError::Cancelled {
                    polls: state.polls,
                    min_rolling_average: state.min_rolling_average(),
                });
            }

            let batch = match source.fetch() {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("Sample acquisition failed: {}", e);
                    return Err(MonitorError::Acquisition {
                        source: e,
                        polls: state.polls,
                        min_rolling_average: state.min_rolling_average(),
                    });
                }
            };
            state.ingest(&batch);

            if let Some(rolling) = state.rolling_average {
                if now.saturating_duration_since(state.last_log) >= config.log_interval {
                    tracing::info!(
                        "Average current over last {}: {} uA",
                        format_duration(config.window_duration),
                        rolling
                    );
                    state.last_log = now;
                }

                if rolling < config.threshold {
                    tracing::info!(
                        rolling_average = rolling,
                        polls = state.polls,
                        "Settled below {} uA",
                        config.threshold
                    );
                    return Ok(state.finish(true, self.clock.now()));
                }
            }

            self.clock.sleep(config.poll_interval);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
