use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use powerwatch::device::{Core, ResetKind};
use powerwatch::duration::parse_duration;
use powerwatch::{
    save_badge, BadgeError, FileSource, Harness, PowerReport, SampleSource, Settings, StreamSource,
    TestVerdict,
};

/// Exit status when the harness itself could not run.
const EXIT_HARNESS_ERROR: u8 = 2;

/// How long background tasks get to finish once a command has its result.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "powerwatch")]
#[command(about = "Hardware-in-the-loop power and UART tests for embedded IoT devices")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debugger serial number of the device under test
    #[arg(short, long, global = true)]
    serial_number: Option<String>,

    /// Identifier of the log UART (defaults to the serial number)
    #[arg(long, global = true)]
    uart_id: Option<String>,

    /// Where to write the badge JSON
    #[arg(long, global = true)]
    badge: Option<PathBuf>,

    /// Settle threshold in uA
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Overall measurement timeout (e.g., "300s", "5m")
    #[arg(long, global = true)]
    timeout: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Program firmware and reset the device
    Flash { firmware: PathBuf },

    /// Reset the device
    Reset {
        /// Reset kind: system or soft
        #[arg(long, default_value = "system")]
        kind: ResetKind,
    },

    /// Erase and unlock a core
    Recover {
        /// Core: application or network
        #[arg(long, default_value = "application")]
        core: Core,
    },

    /// Flash firmware and wait for the expected UART lines
    UartTest { firmware: PathBuf },

    /// Measure whether the device settles into low power
    PowerTest(PowerTestArgs),

    /// Write a badge for a known minimum average and exit
    Badge {
        /// Minimum rolling average in uA
        #[arg(allow_negative_numbers = true)]
        min_average: f64,
    },
}

#[derive(ClapArgs, Debug)]
struct PowerTestArgs {
    #[command(flatten)]
    input: SampleInput,

    /// Skip UART discovery, boot markers and pre-measure commands
    #[arg(long)]
    no_uart: bool,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

/// Where current samples come from. The probe must already be streaming.
#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct SampleInput {
    /// Connect to a probe bridge over TCP (host:port)
    #[arg(long)]
    connect: Option<String>,

    /// Replay samples from a capture file, one batch per line
    #[arg(long)]
    file: Option<PathBuf>,

    /// Read samples from standard input, one batch per line
    #[arg(long)]
    stdin: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run(args) {
        Ok(verdict) => {
            println!("{}", verdict);
            ExitCode::from(verdict.exit_code())
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_HARNESS_ERROR)
        }
    }
}

fn run(args: Args) -> Result<TestVerdict> {
    let settings = load_settings(&args)?;
    let harness = || Harness::from_settings(settings.clone());

    // Build a tokio runtime for device calls, UART and stream sources
    let rt = tokio::runtime::Runtime::new()?;

    run_to_completion(rt, async {
        match args.command {
            Command::Badge { min_average } => write_badge(&settings, min_average),
            Command::Flash { firmware } => {
                harness()?.flash(&firmware).await?;
                Ok(TestVerdict::Passed)
            }
            Command::Reset { kind } => {
                harness()?.reset(kind).await?;
                Ok(TestVerdict::Passed)
            }
            Command::Recover { core } => {
                harness()?.recover(core).await?;
                Ok(TestVerdict::Passed)
            }
            Command::UartTest { firmware } => {
                let harness = harness()?;
                let mut uart = harness.open_uart().await?;
                harness.run_uart_test(&firmware, &mut uart).await
            }
            Command::PowerTest(power) => run_power_test(&harness()?, power).await,
        }
    })
}

/// Drive `future` to completion, then shut the runtime down without
/// waiting on readers still blocked in the background (stdin, UART).
fn run_to_completion<F>(rt: tokio::runtime::Runtime, future: F) -> F::Output
where
    F: std::future::Future,
{
    let output = rt.block_on(future);
    rt.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

/// Badge writing needs no device.
fn write_badge(settings: &Settings, min_average: f64) -> Result<TestVerdict> {
    let path = &settings.badge.path;
    match save_badge(path, min_average, &settings.badge.thresholds()) {
        Ok(badge) => {
            println!("Wrote {} badge to {}", badge.color, path.display());
            Ok(TestVerdict::Passed)
        }
        Err(e @ BadgeError::InvalidMeasurement(_)) => Ok(TestVerdict::Failed(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Layer CLI overrides on top of the file and environment settings.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    if let Some(serial) = &args.serial_number {
        settings.device.serial_number = Some(serial.clone());
    }
    if let Some(id) = &args.uart_id {
        settings.uart.id = Some(id.clone());
    }
    if let Some(path) = &args.badge {
        settings.badge.path = path.clone();
    }
    if let Some(threshold) = args.threshold {
        settings.power.threshold_ua = threshold;
    }
    if let Some(timeout) = &args.timeout {
        settings.power.timeout = parse_duration(timeout)?;
    }

    Ok(settings)
}

async fn run_power_test(harness: &Harness, args: PowerTestArgs) -> Result<TestVerdict> {
    let source = open_source(&args.input).await?;

    let mut uart = if args.no_uart {
        None
    } else {
        Some(harness.open_uart().await?)
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping measurement");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let report = harness.run_power_test(source, uart.as_mut(), Some(cancel)).await?;

    if let Some(badge) = &report.badge {
        tracing::info!(
            "Badge '{} {}' written to {}",
            badge.label,
            badge.message,
            harness.settings().badge.path.display()
        );
    }
    if let Some(path) = &args.report {
        export_report(&report, path)?;
    }

    Ok(report.verdict)
}

async fn open_source(input: &SampleInput) -> Result<Box<dyn SampleSource>> {
    if let Some(addr) = &input.connect {
        use tokio::net::TcpStream;

        tracing::info!("Connecting to {}...", addr);
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        tracing::info!("Connected");
        return Ok(Box::new(StreamSource::spawn(stream, addr)));
    }

    if let Some(path) = &input.file {
        return Ok(Box::new(FileSource::new(path)));
    }

    Ok(Box::new(StreamSource::spawn(tokio::io::stdin(), "stdin")))
}

/// Write the power report to a JSON file
fn export_report(report: &PowerReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.to_json())?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    println!("Exported power report to: {}", path.display());
    Ok(())
}
