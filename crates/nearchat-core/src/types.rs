//! Core value types shared across NearChat crates

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{NearchatError, NearchatResult};

// ----------------------------------------------------------------------------
// Coordinates
// ----------------------------------------------------------------------------

/// A position on the routing plane.
///
/// Values are raw latitude/longitude numbers; no range is enforced beyond
/// being finite, because proximity is measured on the plane rather than on
/// the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Create coordinates, rejecting NaN and infinities
    pub fn new(lat: f64, lon: f64) -> NearchatResult<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(NearchatError::InvalidCoordinates { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// The origin, handy for tests and defaults
    pub const fn origin() -> Self {
        Self { lat: 0.0, lon: 0.0 }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
