//! UART discovery and log observation.
//!
//! The device's log UART is found by filtering the stable `/dev/serial/by-id`
//! symlinks for the debugger's identifier; its output is then watched for
//! expected marker lines with [`UartLog`].

mod watcher;

pub use watcher::UartLog;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Where udev publishes stable serial device names.
pub const DEFAULT_BY_ID_DIR: &str = "/dev/serial/by-id";

/// Default UART line rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout on the serial port; bounds how long a stop request waits.
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum UartError {
    #[error("Cannot list {}: {source}", .dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No UART matching '{id}' in {}", .dir.display())]
    NotFound { id: String, dir: PathBuf },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Some expected lines never appeared.
    #[error("Timed out after {timeout:?} waiting for {missing:?}")]
    Timeout {
        timeout: Duration,
        missing: Vec<String>,
    },

    /// The port closed before all expected lines appeared.
    #[error("UART closed while waiting for {missing:?}")]
    Closed { missing: Vec<String> },

    #[error("UART is read-only")]
    ReadOnly,
}

/// List serial devices in `dir` whose path contains `id`, sorted.
///
/// An empty `id` matches every device.
pub fn discover(dir: &Path, id: &str) -> Result<Vec<PathBuf>, UartError> {
    let entries = fs::read_dir(dir).map_err(|source| UartError::Discovery {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut uarts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.to_string_lossy().contains(id))
        .collect();
    uarts.sort();

    tracing::debug!("Found {} UART(s) matching '{}': {:?}", uarts.len(), id, uarts);
    Ok(uarts)
}

/// Return the first (lowest sorted) UART matching `id`.
///
/// Debuggers expose several UARTs; the log port sorts first.
pub fn discover_first(dir: &Path, id: &str) -> Result<PathBuf, UartError> {
    discover(dir, id)?.into_iter().next().ok_or_else(|| UartError::NotFound {
        id: id.to_string(),
        dir: dir.to_path_buf(),
    })
}

/// Open a serial port (8N1, no flow control) and start watching it.
///
/// Must be called from within a tokio runtime.
pub fn open(path: &Path, baud_rate: u32) -> Result<UartLog, UartError> {
    let path_str = path.to_string_lossy();
    let port = serialport::new(path_str.as_ref(), baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(PORT_READ_TIMEOUT)
        .open()?;
    let writer: Box<dyn Write + Send> = Box::new(port.try_clone()?);

    tracing::info!("Opened UART {} at {} baud", path.display(), baud_rate);
    Ok(UartLog::spawn(port, Some(writer), &path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in [
            "usb-SEGGER_J-Link_001050999999-if02",
            "usb-SEGGER_J-Link_001050123456-if02",
            "usb-SEGGER_J-Link_001050123456-if00",
            "usb-FTDI_cable-if00",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let uarts = discover(dir.path(), "001050123456").unwrap();
        let names: Vec<_> =
            uarts.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();

        assert_eq!(
            names,
            vec!["usb-SEGGER_J-Link_001050123456-if00", "usb-SEGGER_J-Link_001050123456-if02"]
        );

        let first = discover_first(dir.path(), "001050123456").unwrap();
        assert!(first.ends_with("usb-SEGGER_J-Link_001050123456-if00"));
    }

    #[test]
    fn test_discover_missing_dir() {
        let err = discover(Path::new("/nonexistent/serial/by-id"), "x").unwrap_err();
        assert!(matches!(err, UartError::Discovery { .. }));
    }

    #[test]
    fn test_discover_first_not_found() {
        let dir = tempdir().unwrap();
        let err = discover_first(dir.path(), "001050123456").unwrap_err();
        assert!(matches!(err, UartError::NotFound { .. }));
    }
}
