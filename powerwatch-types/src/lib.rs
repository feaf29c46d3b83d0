//! # powerwatch-types
//!
//! Schema types shared between the powerwatch harness and the CI layer that
//! consumes its artifacts. The badge format follows the shields.io endpoint
//! schema so dashboards can render it directly.
//!
//! ## Features
//!
//! - `serde`: JSON serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use powerwatch_types::{Badge, BadgeColor, ColorThresholds};
//!
//! let color = BadgeColor::classify(7.5, &ColorThresholds::default());
//! let badge = Badge::psm_current(7.5, color);
//!
//! assert_eq!(badge.color, BadgeColor::Green);
//! assert_eq!(badge.message, "7.5");
//! ```

mod badge;
mod outcome;

pub use badge::*;
pub use outcome::*;

/// Current badge schema version.
///
/// This is the `schemaVersion` field expected by shields.io endpoint badges.
pub const SCHEMA_VERSION: u32 = 1;
