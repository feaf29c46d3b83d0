//! DUT power switching.

use std::fmt;
use std::time::Duration;

use super::{run_command, DeviceError};

/// Switches supply power to the device under test.
///
/// Used to recover a device whose UART does not enumerate after boot.
pub trait PowerSwitch: Send + Sync + fmt::Debug {
    fn set(&self, on: bool) -> Result<(), DeviceError>;

    /// Turn power off, wait `off_for`, turn it back on, wait `settle`.
    fn cycle(&self, off_for: Duration, settle: Duration) -> Result<(), DeviceError> {
        self.set(false)?;
        std::thread::sleep(off_for);
        self.set(true)?;
        std::thread::sleep(settle);
        Ok(())
    }
}

/// Used when no power control is available; every call succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPowerSwitch;

impl PowerSwitch for NoPowerSwitch {
    fn set(&self, on: bool) -> Result<(), DeviceError> {
        let state = if on { "on" } else { "off" };
        tracing::debug!("No power switch configured, ignoring power {}", state);
        Ok(())
    }
}

/// Runs a configured command line for each power state.
///
/// Each command is an argv list; the first element is the executable.
#[derive(Debug, Clone)]
pub struct CommandPowerSwitch {
    on: Vec<String>,
    off: Vec<String>,
}

impl CommandPowerSwitch {
    pub fn new(on: Vec<String>, off: Vec<String>) -> Result<Self, DeviceError> {
        if on.is_empty() || off.is_empty() {
            return Err(DeviceError::InvalidParameter(
                "power switch needs both an on and an off command".into(),
            ));
        }
        Ok(Self { on, off })
    }
}

impl PowerSwitch for CommandPowerSwitch {
    fn set(&self, on: bool) -> Result<(), DeviceError> {
        let (action, argv) = if on {
            ("DUT power on", &self.on)
        } else {
            ("DUT power off", &self.off)
        };
        // Checked non-empty in `new`
        let (program, args) = argv.split_first().ok_or_else(|| {
            DeviceError::InvalidParameter(format!("empty command for {}", action))
        })?;
        run_command(action, program, args).map(|_| ())
    }
}
