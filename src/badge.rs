//! Badge artifact for CI dashboards.
//!
//! The badge records the lowest rolling average seen during a power
//! measurement, bucketed into a color. It is written for both passing and
//! timed-out runs so partial data survives a failure, but never for an
//! invalid (negative) measurement.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use powerwatch_types::{Badge, BadgeColor, ColorThresholds};
use thiserror::Error;

/// Default artifact path, relative to the working directory.
pub const DEFAULT_BADGE_PATH: &str = "power_badge.json";

#[derive(Debug, Error)]
pub enum BadgeError {
    /// The measured current cannot be physically valid.
    #[error("Invalid measurement: current can't be negative, current average: {0} uA")]
    InvalidMeasurement(f64),

    #[error("Failed to write badge to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize badge: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Build the PSM current badge for a minimum rolling average.
///
/// Negative and NaN averages are rejected. `+inf` (nothing measured) is
/// accepted and lands in the red bucket.
pub fn build_badge(min_average: f64, thresholds: &ColorThresholds) -> Result<Badge, BadgeError> {
    if min_average.is_nan() || min_average < 0.0 {
        return Err(BadgeError::InvalidMeasurement(min_average));
    }
    let color = BadgeColor::classify(min_average, thresholds);
    Ok(Badge::psm_current(min_average, color))
}

/// Build the badge and write it to `path` as JSON.
///
/// Nothing is written if the measurement is invalid.
pub fn save_badge(
    path: &Path,
    min_average: f64,
    thresholds: &ColorThresholds,
) -> Result<Badge, BadgeError> {
    tracing::info!("Minimum average current measured: {}uA", min_average);
    let badge = build_badge(min_average, thresholds)?;

    let json = serde_json::to_string(&badge)?;
    fs::write(path, json).map_err(|source| BadgeError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Minimum average current saved to '{}'", path.display());
    Ok(badge)
}
