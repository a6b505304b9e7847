//! FRU and subsystem LED aggregation
//!
//! Rolls per-fan status up to each FRU's LED and to the subsystem's
//! aggregate LED. The two writes are independent; either register may be
//! absent from the catalog without affecting the other.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::{LedCodes, RegisterField, SubsystemCatalog};
use crate::data::FanStatus;
use crate::hw::register::{write_field, Bus};

fn led_code(codes: &LedCodes, status: FanStatus) -> u32 {
    match status {
        FanStatus::Uninitialized => codes.off,
        FanStatus::Ok => codes.good,
        FanStatus::Fault => codes.fault,
    }
}

/// Drive all declared LED registers from the given per-fan statuses.
///
/// `status_of` is keyed by the fan's catalog (local) name; fans with no
/// recorded status count as uninitialized, the least severe state.
pub fn apply_leds<B: Bus + ?Sized>(
    bus: &mut B,
    catalog: &SubsystemCatalog,
    status_of: &HashMap<String, FanStatus>,
) {
    let codes = match &catalog.info.led_codes {
        Some(codes) => codes,
        None => {
            debug!(subsystem = %catalog.name, "no LED codes declared, skipping LED update");
            return;
        }
    };

    let mut subsystem_status = FanStatus::Uninitialized;

    for fru in &catalog.frus {
        let fru_status = fru
            .fans
            .iter()
            .map(|fan| {
                status_of
                    .get(&fan.name)
                    .copied()
                    .unwrap_or(FanStatus::Uninitialized)
            })
            .max()
            .unwrap_or(FanStatus::Uninitialized);

        subsystem_status = subsystem_status.max(fru_status);

        if let Some(field) = &fru.led {
            write_led(bus, &catalog.name, field, led_code(codes, fru_status));
        }
    }

    if let Some(field) = &catalog.info.led {
        write_led(bus, &catalog.name, field, led_code(codes, subsystem_status));
    }
}

fn write_led<B: Bus + ?Sized>(bus: &mut B, subsystem: &str, field: &RegisterField, code: u32) {
    if let Err(e) = write_field(bus, field, code) {
        warn!(
            subsystem = %subsystem,
            device = %field.device,
            address = field.address,
            error = %e,
            "unable to set status LED register"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        DirectionCodes, FanDescriptor, FanInfo, FruDescriptor, SpeedCodes,
    };
    use crate::hw::register::MemBus;

    fn field(address: u32) -> RegisterField {
        RegisterField {
            device: "cpld".to_string(),
            address,
            width: 1,
            mask: 0x03,
            negative_polarity: false,
        }
    }

    fn fan(name: &str) -> FanDescriptor {
        FanDescriptor {
            name: name.to_string(),
            rpm: field(0x80),
            rpm_high: None,
            fault: field(0x90),
            speed_control: None,
        }
    }

    fn catalog(fru_led: [Option<RegisterField>; 2], subsystem_led: Option<RegisterField>) -> SubsystemCatalog {
        let [led_a, led_b] = fru_led;
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
                speed_control: None,
                rpm_scale: None,
                direction_codes: DirectionCodes { f2b: 1, b2f: 0 },
                led_codes: Some(LedCodes {
                    off: 0,
                    good: 1,
                    fault: 2,
                }),
                led: subsystem_led,
            },
            frus: vec![
                FruDescriptor {
                    number: 1,
                    presence: None,
                    direction_detect: None,
                    speed_control: None,
                    led: led_a,
                    fans: vec![fan("1-1"), fan("1-2")],
                },
                FruDescriptor {
                    number: 2,
                    presence: None,
                    direction_detect: None,
                    speed_control: None,
                    led: led_b,
                    fans: vec![fan("2-1")],
                },
            ],
        }
    }

    fn statuses(entries: &[(&str, FanStatus)]) -> HashMap<String, FanStatus> {
        entries
            .iter()
            .map(|(name, status)| (name.to_string(), *status))
            .collect()
    }

    #[test]
    fn fru_led_takes_worst_member_status() {
        let mut bus = MemBus::new();
        let cat = catalog([Some(field(0x60)), Some(field(0x61))], None);
        apply_leds(
            &mut bus,
            &cat,
            &statuses(&[
                ("1-1", FanStatus::Ok),
                ("1-2", FanStatus::Fault),
                ("2-1", FanStatus::Ok),
            ]),
        );
        assert_eq!(bus.register("cpld", 0x60) & 0x03, 2); // fault
        assert_eq!(bus.register("cpld", 0x61) & 0x03, 1); // good
    }

    #[test]
    fn subsystem_led_aggregates_over_frus() {
        let mut bus = MemBus::new();
        let cat = catalog([None, None], Some(field(0x62)));
        apply_leds(
            &mut bus,
            &cat,
            &statuses(&[("1-1", FanStatus::Ok), ("2-1", FanStatus::Fault)]),
        );
        // FRU LEDs absent, aggregate still written
        assert_eq!(bus.writes.len(), 1);
        assert_eq!(bus.register("cpld", 0x62) & 0x03, 2);
    }

    #[test]
    fn uninitialized_fans_map_to_off() {
        let mut bus = MemBus::new();
        let cat = catalog([Some(field(0x60)), None], None);
        apply_leds(&mut bus, &cat, &HashMap::new());
        assert_eq!(bus.register("cpld", 0x60) & 0x03, 0);
    }

    #[test]
    fn led_write_failure_does_not_block_other_leds() {
        let mut bus = MemBus::new();
        bus.fail_register("cpld", 0x60);
        let cat = catalog([Some(field(0x60)), Some(field(0x61))], Some(field(0x62)));
        apply_leds(&mut bus, &cat, &statuses(&[("1-1", FanStatus::Ok)]));
        assert_eq!(bus.register("cpld", 0x61) & 0x03, 0); // fru 2 uninitialized -> off
        assert_eq!(bus.register("cpld", 0x62) & 0x03, 1); // aggregate good
    }
}
