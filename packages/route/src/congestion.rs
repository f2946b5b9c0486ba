//! Speed estimation and congestion color bands.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::Maneuver;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Discrete congestion label derived from estimated segment speed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ColorBand {
    /// 45 mph and up
    Clear,
    /// 30-45 mph
    Light,
    /// 18-30 mph
    Moderate,
    /// 10-18 mph
    Heavy,
    /// Below 10 mph
    Severe,
    /// No usable timing; drawn neutrally
    Unknown,
}

impl ColorBand {
    /// Classifies a speed. `NaN` is [`ColorBand::Unknown`], never
    /// [`ColorBand::Severe`].
    #[must_use]
    pub fn from_speed(speed_mph: f64) -> Self {
        if speed_mph.is_nan() {
            Self::Unknown
        } else if speed_mph >= 45.0 {
            Self::Clear
        } else if speed_mph >= 30.0 {
            Self::Light
        } else if speed_mph >= 18.0 {
            Self::Moderate
        } else if speed_mph >= 10.0 {
            Self::Heavy
        } else {
            Self::Severe
        }
    }

    /// Map stroke color for this band.
    #[must_use]
    pub const fn hex_color(self) -> &'static str {
        match self {
            Self::Clear => "#2e7d32",
            Self::Light => "#9ccc65",
            Self::Moderate => "#fbc02d",
            Self::Heavy => "#ef6c00",
            Self::Severe => "#c62828",
            Self::Unknown => "#9e9e9e",
        }
    }
}

/// Average speed over a distance/time pair, `NaN` when the time is not
/// positive.
#[must_use]
pub fn speed_mph(distance_miles: f64, time_seconds: f64) -> f64 {
    if time_seconds > 0.0 {
        distance_miles / (time_seconds / SECONDS_PER_HOUR)
    } else {
        f64::NAN
    }
}

/// Assigns a band to every maneuver. Adjacent equal bands are not merged.
#[must_use]
pub fn colorize(segments: &[Maneuver]) -> Vec<ColorBand> {
    segments
        .iter()
        .map(|m| ColorBand::from_speed(speed_mph(m.distance_miles, m.time_seconds)))
        .collect()
}
