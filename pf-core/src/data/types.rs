//! Core data types for platfand
//!
//! The closed, ordered fan speed level set, fan status severities, and
//! airflow directions, with their canonical wire names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fan speed demand level.
///
/// The five levels form a total order; both the thermal-zone aggregation and
/// the speed policy take maximums over it. "No override configured" is
/// represented as `Option<FanSpeed>` (`None`), never as a sixth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Slow,
    Normal,
    Medium,
    Fast,
    Max,
}

impl FanSpeed {
    /// Canonical name as published to the configuration store
    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Slow => "slow",
            FanSpeed::Normal => "normal",
            FanSpeed::Medium => "medium",
            FanSpeed::Fast => "fast",
            FanSpeed::Max => "max",
        }
    }

    /// Parse a level name. Unknown names (including "none" and the empty
    /// string) yield `None`, which doubles as the no-override sentinel.
    pub fn from_name(name: &str) -> Option<FanSpeed> {
        match name {
            "slow" => Some(FanSpeed::Slow),
            "normal" => Some(FanSpeed::Normal),
            "medium" => Some(FanSpeed::Medium),
            "fast" => Some(FanSpeed::Fast),
            "max" => Some(FanSpeed::Max),
            _ => None,
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fan health as derived from the fault register and presence detection.
///
/// Declaration order is the LED severity order: `Uninitialized < Ok < Fault`.
/// LED aggregation takes maximums over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanStatus {
    Uninitialized,
    Ok,
    Fault,
}

impl FanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanStatus::Uninitialized => "uninitialized",
            FanStatus::Ok => "ok",
            FanStatus::Fault => "fault",
        }
    }
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for FanStatus {
    fn default() -> Self {
        FanStatus::Uninitialized
    }
}

/// Airflow direction of a fan FRU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FanDirection {
    /// Front-to-back airflow
    #[serde(rename = "f2b")]
    FrontToBack,
    /// Back-to-front airflow
    #[serde(rename = "b2f")]
    BackToFront,
}

impl FanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanDirection::FrontToBack => "f2b",
            FanDirection::BackToFront => "b2f",
        }
    }
}

impl fmt::Display for FanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for FanDirection {
    fn default() -> Self {
        FanDirection::FrontToBack
    }
}
