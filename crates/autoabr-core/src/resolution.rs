//! Output resolutions and per-resolution bitrate windows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An output frame size. Identity is `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::Resolution(s.to_string()))?;
        let width = w.parse::<u32>().map_err(|_| Error::Resolution(s.to_string()))?;
        let height = h.parse::<u32>().map_err(|_| Error::Resolution(s.to_string()))?;
        if width == 0 || height == 0 {
            return Err(Error::Resolution(s.to_string()));
        }
        Ok(Self { width, height })
    }
}

/// Inclusive bitrate window, either end optional. Units: bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BitrateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

impl BitrateRange {
    pub fn contains(&self, bitrate: u64) -> bool {
        self.min.map_or(true, |min| bitrate >= min) && self.max.map_or(true, |max| bitrate <= max)
    }
}

/// A resolution in the search space, optionally restricted to a bitrate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTarget {
    #[serde(flatten)]
    pub resolution: Resolution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<BitrateRange>,
}

impl ResolutionTarget {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: Resolution::new(width, height),
            range: None,
        }
    }

    pub fn with_range(mut self, range: BitrateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn allows(&self, bitrate: u64) -> bool {
        self.range.map_or(true, |r| r.contains(bitrate))
    }
}

impl From<Resolution> for ResolutionTarget {
    fn from(resolution: Resolution) -> Self {
        Self { resolution, range: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let r: Resolution = "1280x720".parse().unwrap();
        assert_eq!(r, Resolution::new(1280, 720));
        assert_eq!(r.to_string(), "1280x720");
        assert_eq!(r.pixels(), 921_600);
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x720".parse::<Resolution>().is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = BitrateRange { min: Some(500_000), max: Some(1_000_000) };
        assert!(range.contains(500_000));
        assert!(range.contains(1_000_000));
        assert!(!range.contains(499_999));
        assert!(!range.contains(1_000_001));
        assert!(BitrateRange::default().contains(1));
    }

    #[test]
    fn target_deserializes_flat() {
        let t: ResolutionTarget =
            serde_json::from_str(r#"{"width":640,"height":360,"range":{"max":800000}}"#).unwrap();
        assert_eq!(t.resolution, Resolution::new(640, 360));
        assert!(t.allows(800_000));
        assert!(!t.allows(900_000));
    }
}
