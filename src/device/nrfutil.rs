//! `nrfutil device` backed device control.

use std::path::Path;

use super::{run_command, Core, DeviceControl, DeviceError, ResetKind};

/// Default programmer executable.
pub const DEFAULT_PROGRAM: &str = "nrfutil";

/// Controls a device through `nrfutil device <subcommand>`.
#[derive(Debug, Clone)]
pub struct NrfUtil {
    program: String,
    serial_number: String,
    extra_program_args: Vec<String>,
}

impl NrfUtil {
    /// Target the debugger with the given serial number.
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            serial_number: serial_number.into(),
            extra_program_args: Vec::new(),
        }
    }

    /// Use a different executable (e.g. an absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Extra arguments passed to `device program` before `--firmware`.
    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.extra_program_args = args;
        self
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub(crate) fn program_args(&self, firmware: &Path) -> Vec<String> {
        let mut args = vec!["device".to_string(), "program".to_string()];
        args.extend(self.extra_program_args.iter().cloned());
        args.extend([
            "--firmware".to_string(),
            firmware.display().to_string(),
            "--serial-number".to_string(),
            self.serial_number.clone(),
        ]);
        args
    }

    pub(crate) fn reset_args(&self, kind: ResetKind) -> Vec<String> {
        vec![
            "device".to_string(),
            "reset".to_string(),
            "--serial-number".to_string(),
            self.serial_number.clone(),
            "--reset-kind".to_string(),
            kind.as_arg().to_string(),
        ]
    }

    pub(crate) fn recover_args(&self, core: Core) -> Vec<String> {
        vec![
            "device".to_string(),
            "recover".to_string(),
            "--serial-number".to_string(),
            self.serial_number.clone(),
            "--core".to_string(),
            core.as_arg().to_string(),
        ]
    }
}

impl DeviceControl for NrfUtil {
    fn flash(&self, firmware: &Path) -> Result<(), DeviceError> {
        if !firmware.is_file() {
            return Err(DeviceError::FirmwareNotFound(firmware.to_path_buf()));
        }
        tracing::info!(
            "Flashing device, segger: {}, firmware: {}",
            self.serial_number,
            firmware.display()
        );
        run_command("flash", &self.program, &self.program_args(firmware))?;
        self.reset(ResetKind::System)
    }

    fn reset(&self, kind: ResetKind) -> Result<(), DeviceError> {
        tracing::info!("Resetting device, segger: {}", self.serial_number);
        run_command("reset", &self.program, &self.reset_args(kind)).map(|_| ())
    }

    fn recover(&self, core: Core) -> Result<(), DeviceError> {
        tracing::info!("Recovering device, segger: {}", self.serial_number);
        run_command("recover", &self.program, &self.recover_args(core)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_program_args() {
        let nrf = NrfUtil::new("001050123456")
            .with_program_args(vec!["--options".into(), "chip_erase_mode=ERASE_ALL".into()]);
        let args = nrf.program_args(Path::new("/fw/app.hex"));
        assert_eq!(
            args,
            vec![
                "device",
                "program",
                "--options",
                "chip_erase_mode=ERASE_ALL",
                "--firmware",
                "/fw/app.hex",
                "--serial-number",
                "001050123456"
            ]
        );
    }

    #[test]
    fn test_reset_and_recover_args() {
        let nrf = NrfUtil::new("42");
        assert_eq!(
            nrf.reset_args(ResetKind::Soft),
            vec!["device", "reset", "--serial-number", "42", "--reset-kind", "RESET_SOFT"]
        );
        assert_eq!(
            nrf.recover_args(Core::Network),
            vec!["device", "recover", "--serial-number", "42", "--core", "Network"]
        );
    }

    #[test]
    fn test_flash_missing_firmware() {
        let nrf = NrfUtil::new("42").with_program("definitely-not-a-real-program-x9");
        let err = nrf.flash(&PathBuf::from("/nonexistent/app.hex")).unwrap_err();
        assert!(matches!(err, DeviceError::FirmwareNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_reset_reports_programmer_failure() {
        // `false` ignores its arguments and exits non-zero
        let nrf = NrfUtil::new("42").with_program("false");
        let err = nrf.reset(ResetKind::System).unwrap_err();
        assert!(matches!(err, DeviceError::CommandFailed { .. }));
    }
}
