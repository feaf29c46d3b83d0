//! # powerwatch
//!
//! A hardware-in-the-loop harness for checking that an embedded IoT device
//! settles into its low-power state after boot.
//!
//! The harness flashes and resets the device under test, watches its log
//! UART, and measures current drawn through an external probe. A device
//! passes when the rolling average of its current falls below a threshold
//! before a timeout. The lowest rolling average seen is written as a
//! shields.io badge for CI dashboards.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           harness                            │
//! │  ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐  │
//! │  │ device  │   │  uart   │   │ monitor  │──▶│    badge    │  │
//! │  │(nrfutil)│   │ (logs)  │   │ (settle) │   │   (JSON)    │  │
//! │  └─────────┘   └─────────┘   └────┬─────┘   └─────────────┘  │
//! │                                   │                          │
//! │                                   ▼                          │
//! │                              ┌─────────┐                     │
//! │                              │ source  │◀── Stream | File    │
//! │                              │ (input) │    | Channel        │
//! │                              └─────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Sample source abstraction ([`SampleSource`] trait) with
//!   implementations for probe streams, capture files, and channels
//! - **[`monitor`]**: The settle monitor - rolling window, thresholds, and
//!   timeout handling
//! - **[`badge`]**: Writes the measurement badge artifact
//! - **[`device`]**: Flash, reset, recover, and power control through
//!   external tools
//! - **[`uart`]**: Log UART discovery and marker-line matching
//! - **[`harness`]**: The on-target test flows and their verdicts
//! - **[`settings`]**: Layered TOML and environment configuration
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Measure from a probe bridge streaming samples over TCP
//! powerwatch --serial-number 001050123456 power-test --connect localhost:5555
//!
//! # Replay a recorded capture without a UART
//! powerwatch --serial-number 001050123456 power-test --file capture.txt --no-uart
//! ```
//!
//! ### As a library with a channel source
//!
//! ```
//! use std::time::Duration;
//! use powerwatch::{ChannelSource, ManualClock, MonitorConfig, SettleMonitor};
//!
//! let (tx, mut source) = ChannelSource::create("probe");
//! tx.send(vec![30.0]).unwrap();
//! tx.send(vec![2.0]).unwrap();
//! drop(tx);
//!
//! let config = MonitorConfig {
//!     window_duration: Duration::from_millis(20),
//!     ..MonitorConfig::default()
//! };
//! let monitor = SettleMonitor::with_clock(config, ManualClock::new()).unwrap();
//!
//! // Both batches arrive in the first poll with a mean of 16 uA, above the
//! // threshold. The next poll finds the producer gone: the run is inconclusive.
//! assert!(monitor.run(&mut source).unwrap_err().is_inconclusive());
//! ```
//!
//! ### As a library with a stream source
//!
//! ```no_run
//! use powerwatch::{MonitorConfig, SettleMonitor, StreamSource};
//!
//! # tokio_test::block_on(async {
//! let stream = tokio::net::TcpStream::connect("localhost:5555").await.unwrap();
//! let mut source = StreamSource::spawn(stream, "localhost:5555");
//!
//! let monitor = SettleMonitor::new(MonitorConfig::default()).unwrap();
//! let outcome = tokio::task::spawn_blocking(move || monitor.run(&mut source))
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod badge;
pub mod device;
pub mod duration;
pub mod harness;
pub mod monitor;
pub mod retry;
pub mod settings;
pub mod source;
pub mod uart;

// Re-export main types for convenience
pub use badge::{build_badge, save_badge, BadgeError};
pub use device::{DeviceControl, DeviceError, NrfUtil, PowerSwitch};
pub use harness::{Harness, PowerReport, TestVerdict};
pub use monitor::{
    Clock, ManualClock, MonitorConfig, MonitorError, RollingWindow, SettleMonitor, SystemClock,
};
pub use powerwatch_types::{Badge, BadgeColor, ColorThresholds, Outcome, Verdict};
pub use settings::Settings;
pub use source::{AcquisitionError, ChannelSource, FileSource, SampleSource, StreamSource};
pub use uart::UartLog;
