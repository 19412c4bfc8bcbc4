//! Perceptual quality models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A perceptual model variant. Results are produced and selected per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityModel {
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "PhoneHD")]
    PhoneHd,
    #[serde(rename = "UHD")]
    Uhd,
}

impl QualityModel {
    pub const ALL: [QualityModel; 3] = [QualityModel::Hd, QualityModel::PhoneHd, QualityModel::Uhd];

    /// Directory name used for this model's quality artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityModel::Hd => "HD",
            QualityModel::PhoneHd => "PhoneHD",
            QualityModel::Uhd => "UHD",
        }
    }

    /// Base model identifier passed to the measurement tool.
    pub fn tool_model(&self) -> &'static str {
        match self {
            QualityModel::Hd | QualityModel::PhoneHd => "HD",
            QualityModel::Uhd => "4K",
        }
    }

    /// Whether the phone viewing condition flag is set.
    pub fn phone(&self) -> bool {
        matches!(self, QualityModel::PhoneHd)
    }
}

impl fmt::Display for QualityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HD" => Ok(QualityModel::Hd),
            "PhoneHD" => Ok(QualityModel::PhoneHd),
            "UHD" => Ok(QualityModel::Uhd),
            other => Err(Error::UnknownModel(other.to_string())),
        }
    }
}
