//! Device control through external command-line tools.
//!
//! Flashing, resetting and recovering the device under test is delegated to
//! the vendor programmer CLI; DUT power is switched through user-configured
//! commands. Both sit behind traits so test flows can run against fakes.

mod nrfutil;
mod power;

pub use nrfutil::{NrfUtil, DEFAULT_PROGRAM};
pub use power::{CommandPowerSwitch, NoPowerSwitch, PowerSwitch};

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors from device control commands.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Firmware not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{action} failed ({status}): {stderr}")]
    CommandFailed {
        action: String,
        status: String,
        stderr: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// How the device is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetKind {
    #[default]
    System,
    Soft,
}

impl ResetKind {
    /// The programmer CLI's spelling.
    pub fn as_arg(&self) -> &'static str {
        match self {
            ResetKind::System => "RESET_SYSTEM",
            ResetKind::Soft => "RESET_SOFT",
        }
    }
}

impl std::str::FromStr for ResetKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" | "reset_system" => Ok(ResetKind::System),
            "soft" | "reset_soft" => Ok(ResetKind::Soft),
            other => Err(DeviceError::InvalidParameter(format!("unknown reset kind '{}'", other))),
        }
    }
}

/// Core targeted by a recover operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Core {
    #[default]
    Application,
    Network,
}

impl Core {
    pub fn as_arg(&self) -> &'static str {
        match self {
            Core::Application => "Application",
            Core::Network => "Network",
        }
    }
}

impl std::str::FromStr for Core {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "application" | "app" => Ok(Core::Application),
            "network" | "net" => Ok(Core::Network),
            other => Err(DeviceError::InvalidParameter(format!("unknown core '{}'", other))),
        }
    }
}

/// Operations on the device under test.
pub trait DeviceControl: Send + Sync + fmt::Debug {
    /// Program `firmware` (hex or zip) and reset the device.
    fn flash(&self, firmware: &Path) -> Result<(), DeviceError>;

    fn reset(&self, kind: ResetKind) -> Result<(), DeviceError>;

    /// Erase and unlock the given core.
    fn recover(&self, core: Core) -> Result<(), DeviceError>;
}

/// Run `program args...` to completion, mapping a non-zero exit to an error.
///
/// Returns captured stdout on success.
pub(crate) fn run_command(
    action: &str,
    program: &str,
    args: &[String],
) -> Result<String, DeviceError> {
    tracing::debug!("Running {} {}", program, args.join(" "));

    let output =
        Command::new(program).args(args).output().map_err(|source| DeviceError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::error!("An error occurred while running {}: {}", action, stderr);
        return Err(DeviceError::CommandFailed {
            action: action.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    tracing::info!("{} completed successfully", action);
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
