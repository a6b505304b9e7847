//! Hardware catalog model
//!
//! Read-only descriptors for one subsystem's fan hardware: which devices and
//! registers control speed, report tachometer counts, detect presence and
//! airflow direction, and drive status LEDs. The catalog is loaded once per
//! subsystem when the reconciliation engine first sees it and never mutated.
//!
//! Parsing the hardware-description files themselves is a collaborator's job
//! (see [`CatalogSource`]); the types here are serde-derived so that a
//! JSON-backed source is a plain `serde_json::from_str`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::FanSpeed;
use crate::error::Result;

/// One addressable bit field inside a device register.
///
/// `mask` selects the field's bits; `negative_polarity` declares that a
/// zero field value means "active" for single-bit boolean fields. Polarity
/// is interpreted by the readback layer, never by the register primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterField {
    /// Name of the device holding the register, resolved by the bus transport
    pub device: String,
    /// Register address within the device
    pub address: u32,
    /// Register width in bytes: 1, 2, or 4
    pub width: u8,
    /// Bit mask selecting the field; 0 selects the whole register
    #[serde(default)]
    pub mask: u32,
    /// Single-bit fields only: zero means "active"
    #[serde(default)]
    pub negative_polarity: bool,
}

/// Raw register codes for the five speed levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedCodes {
    pub slow: u32,
    pub normal: u32,
    pub medium: u32,
    pub fast: u32,
    pub max: u32,
}

impl SpeedCodes {
    /// Translate a speed level to its hardware code
    pub fn code_for(&self, speed: FanSpeed) -> u32 {
        match speed {
            FanSpeed::Slow => self.slow,
            FanSpeed::Normal => self.normal,
            FanSpeed::Medium => self.medium,
            FanSpeed::Fast => self.fast,
            FanSpeed::Max => self.max,
        }
    }
}

/// Per-subsystem direction-bit convention.
///
/// The detection register yields a single bit; which bit value means
/// front-to-back is declared here, per subsystem. The source data carries no
/// absolute direction value, only this convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionCodes {
    pub f2b: u32,
    pub b2f: u32,
}

/// LED codes for the three indication states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCodes {
    pub off: u32,
    pub good: u32,
    pub fault: u32,
}

/// RPM derivation convention.
///
/// Tachometers either report a rate (scaled by a linear multiplier) or a
/// period (converted through a numerator). Exactly one convention applies
/// per subsystem; the tagged enum makes a both-present configuration
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpmScale {
    /// `rpm = raw * multiplier`
    Multiplier(u32),
    /// `rpm = numerator / raw` (0 when raw is 0)
    Numerator(u32),
}

/// How speed-control registers are laid out for a subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTopology {
    /// One control register for the whole subsystem
    Single,
    /// One control register per fan FRU
    PerFru,
    /// One control register per individual fan
    PerFan,
}

impl FromStr for ControlTopology {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single" => Ok(ControlTopology::Single),
            "per-fru" => Ok(ControlTopology::PerFru),
            "per-fan" => Ok(ControlTopology::PerFan),
            _ => Err(()),
        }
    }
}

/// One physical fan within a FRU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanDescriptor {
    /// Name unique within the subsystem (namespaced by the engine)
    pub name: String,
    /// Tachometer register (low byte when `rpm_high` is present)
    pub rpm: RegisterField,
    /// Optional high-byte tachometer register for devices without wide reads
    #[serde(default)]
    pub rpm_high: Option<RegisterField>,
    /// Fault status register
    pub fault: RegisterField,
    /// Per-fan speed control point (per-fan topology only)
    #[serde(default)]
    pub speed_control: Option<RegisterField>,
}

/// A fan replaceable unit: one or more fans sharing detection hardware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruDescriptor {
    /// FRU number as printed on the chassis
    pub number: u32,
    /// Presence detection; a FRU without one is always considered present
    #[serde(default)]
    pub presence: Option<RegisterField>,
    /// Airflow direction detection; absent means front-to-back
    #[serde(default)]
    pub direction_detect: Option<RegisterField>,
    /// Per-FRU speed control point (per-fru topology only)
    #[serde(default)]
    pub speed_control: Option<RegisterField>,
    /// Per-FRU status LED
    #[serde(default)]
    pub led: Option<RegisterField>,
    pub fans: Vec<FanDescriptor>,
}

impl FruDescriptor {
    /// Whether this FRU contains a fan with the given (local) name
    pub fn contains_fan(&self, local_name: &str) -> bool {
        self.fans.iter().any(|f| f.name == local_name)
    }
}

/// Subsystem-wide fan control information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanInfo {
    /// Control topology as declared by the catalog; parsed at application
    /// time so an unrecognized value is a loggable defect, not a load error
    pub control_topology: String,
    /// Level-to-code translation table
    pub speed_codes: SpeedCodes,
    /// Whole-subsystem control point (single topology only)
    #[serde(default)]
    pub speed_control: Option<RegisterField>,
    /// RPM derivation; absent means publish raw tachometer counts
    #[serde(default)]
    pub rpm_scale: Option<RpmScale>,
    pub direction_codes: DirectionCodes,
    /// LED output codes; absent disables all LED writes for the subsystem
    #[serde(default)]
    pub led_codes: Option<LedCodes>,
    /// Subsystem aggregate status LED
    #[serde(default)]
    pub led: Option<RegisterField>,
}

/// The complete loaded hardware description for one subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemCatalog {
    pub name: String,
    pub info: FanInfo,
    pub frus: Vec<FruDescriptor>,
}

impl SubsystemCatalog {
    /// Iterate every fan together with the index of its owning FRU
    pub fn fans(&self) -> impl Iterator<Item = (usize, &FanDescriptor)> {
        self.frus
            .iter()
            .enumerate()
            .flat_map(|(idx, fru)| fru.fans.iter().map(move |fan| (idx, fan)))
    }

    /// Total fan count across all FRUs
    pub fn fan_count(&self) -> usize {
        self.frus.iter().map(|fru| fru.fans.len()).sum()
    }

    /// Find the FRU containing the named fan
    pub fn fru_for_fan(&self, local_name: &str) -> Option<&FruDescriptor> {
        self.frus.iter().find(|fru| fru.contains_fan(local_name))
    }
}

/// Collaborator that resolves a subsystem's hardware description.
///
/// Load failures mark the subsystem unusable for the current pass; the
/// engine retries on every later pass that still reports the subsystem.
pub trait CatalogSource {
    fn load(&self, subsystem: &str, hw_desc_dir: &str) -> Result<SubsystemCatalog>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(device: &str, address: u32) -> RegisterField {
        RegisterField {
            device: device.to_string(),
            address,
            width: 1,
            mask: 0xff,
            negative_polarity: false,
        }
    }

    fn catalog_with_two_frus() -> SubsystemCatalog {
        SubsystemCatalog {
            name: "base".to_string(),
            info: FanInfo {
                control_topology: "single".to_string(),
                speed_codes: SpeedCodes {
                    slow: 1,
                    normal: 2,
                    medium: 3,
                    fast: 4,
                    max: 5,
                },
                speed_control: Some(field("cpld", 0x10)),
                rpm_scale: Some(RpmScale::Multiplier(100)),
                direction_codes: DirectionCodes { f2b: 1, b2f: 0 },
                led_codes: None,
                led: None,
            },
            frus: vec![
                FruDescriptor {
                    number: 1,
                    presence: None,
                    direction_detect: None,
                    speed_control: None,
                    led: None,
                    fans: vec![FanDescriptor {
                        name: "1-1".to_string(),
                        rpm: field("cpld", 0x20),
                        rpm_high: None,
                        fault: field("cpld", 0x30),
                        speed_control: None,
                    }],
                },
                FruDescriptor {
                    number: 2,
                    presence: None,
                    direction_detect: None,
                    speed_control: None,
                    led: None,
                    fans: vec![
                        FanDescriptor {
                            name: "2-1".to_string(),
                            rpm: field("cpld", 0x21),
                            rpm_high: None,
                            fault: field("cpld", 0x31),
                            speed_control: None,
                        },
                        FanDescriptor {
                            name: "2-2".to_string(),
                            rpm: field("cpld", 0x22),
                            rpm_high: None,
                            fault: field("cpld", 0x32),
                            speed_control: None,
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn fan_iteration_spans_frus() {
        let catalog = catalog_with_two_frus();
        assert_eq!(catalog.fan_count(), 3);
        let names: Vec<_> = catalog.fans().map(|(_, f)| f.name.as_str()).collect();
        assert_eq!(names, ["1-1", "2-1", "2-2"]);
    }

    #[test]
    fn fru_lookup_by_fan_name() {
        let catalog = catalog_with_two_frus();
        assert_eq!(catalog.fru_for_fan("2-2").map(|f| f.number), Some(2));
        assert_eq!(catalog.fru_for_fan("1-1").map(|f| f.number), Some(1));
        assert!(catalog.fru_for_fan("9-9").is_none());
    }

    #[test]
    fn topology_parsing() {
        assert_eq!("single".parse(), Ok(ControlTopology::Single));
        assert_eq!("per-fru".parse(), Ok(ControlTopology::PerFru));
        assert_eq!("per-fan".parse(), Ok(ControlTopology::PerFan));
        assert!("per-chassis".parse::<ControlTopology>().is_err());
    }

    #[test]
    fn speed_code_translation() {
        let catalog = catalog_with_two_frus();
        assert_eq!(catalog.info.speed_codes.code_for(FanSpeed::Slow), 1);
        assert_eq!(catalog.info.speed_codes.code_for(FanSpeed::Max), 5);
    }

    #[test]
    fn catalog_deserializes_from_json() {
        let json = r#"{
            "name": "base",
            "info": {
                "control_topology": "per-fru",
                "speed_codes": {"slow": 16, "normal": 32, "medium": 48, "fast": 64, "max": 80},
                "rpm_scale": {"multiplier": 150},
                "direction_codes": {"f2b": 1, "b2f": 0}
            },
            "frus": [
                {
                    "number": 1,
                    "speed_control": {"device": "cpld", "address": 16, "width": 1, "mask": 240},
                    "fans": [
                        {
                            "name": "1-1",
                            "rpm": {"device": "cpld", "address": 32, "width": 1},
                            "fault": {"device": "cpld", "address": 48, "width": 1, "mask": 1}
                        }
                    ]
                }
            ]
        }"#;
        let catalog: SubsystemCatalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.info.rpm_scale, Some(RpmScale::Multiplier(150)));
        assert_eq!(catalog.frus[0].fans[0].rpm.mask, 0);
        assert!(catalog.frus[0].presence.is_none());
    }
}
