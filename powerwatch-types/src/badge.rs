//! Badge - the status artifact written after a power measurement.

use core::fmt;

use crate::SCHEMA_VERSION;

/// Label used for the PSM floor current badge.
pub const PSM_CURRENT_LABEL: &str = "psm_current uA";

/// Badge color, bucketed from the measured current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BadgeColor {
    Green,
    Yellow,
    Red,
}

impl BadgeColor {
    /// Bucket a current reading (µA) into a color.
    ///
    /// Bounds are inclusive: a reading equal to `green_max` is still green.
    /// Anything that is not at or below `yellow_max` (including `+inf`) is red.
    pub fn classify(current: f64, thresholds: &ColorThresholds) -> Self {
        if current <= thresholds.green_max {
            BadgeColor::Green
        } else if current <= thresholds.yellow_max {
            BadgeColor::Yellow
        } else {
            BadgeColor::Red
        }
    }

    /// Returns the color name as written in the badge.
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeColor::Green => "green",
            BadgeColor::Yellow => "yellow",
            BadgeColor::Red => "red",
        }
    }
}

impl fmt::Display for BadgeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bounds (inclusive, µA) for the green and yellow buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ColorThresholds {
    pub green_max: f64,
    pub yellow_max: f64,
}

impl Default for ColorThresholds {
    fn default() -> Self {
        Self {
            green_max: 10.0,
            yellow_max: 50.0,
        }
    }
}

/// A shields.io endpoint badge.
///
/// Serializes as:
///
/// ```json
/// {"label": "psm_current uA", "message": "8.2", "schemaVersion": 1, "color": "green"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Badge {
    pub label: String,
    pub message: String,
    #[cfg_attr(feature = "serde", serde(rename = "schemaVersion"))]
    pub schema_version: u32,
    pub color: BadgeColor,
}

impl Badge {
    /// Create a badge with the given label, message and color.
    pub fn new(label: impl Into<String>, message: impl Into<String>, color: BadgeColor) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
            schema_version: SCHEMA_VERSION,
            color,
        }
    }

    /// Create the PSM floor current badge for a measured average.
    pub fn psm_current(average: f64, color: BadgeColor) -> Self {
        Self::new(PSM_CURRENT_LABEL, format!("{}", average), color)
    }
}
