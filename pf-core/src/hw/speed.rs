//! Speed application
//!
//! Translates a resolved speed level into the subsystem's hardware code and
//! drives it out through whichever control topology the catalog declares.
//! Individual write failures are logged and do not stop the remaining
//! control points; partial application stands until the next pass.

use tracing::{debug, error, warn};

use crate::catalog::{ControlTopology, RegisterField, SubsystemCatalog};
use crate::data::FanSpeed;
use crate::hw::register::{write_field, Bus};

/// Apply a resolved speed to every control point the subsystem declares.
pub fn apply_speed<B: Bus + ?Sized>(bus: &mut B, catalog: &SubsystemCatalog, speed: FanSpeed) {
    let topology = match catalog.info.control_topology.parse::<ControlTopology>() {
        Ok(t) => t,
        Err(()) => {
            error!(
                subsystem = %catalog.name,
                topology = %catalog.info.control_topology,
                "unrecognized control topology, leaving fan speed unchanged"
            );
            return;
        }
    };

    let code = catalog.info.speed_codes.code_for(speed);
    debug!(
        subsystem = %catalog.name,
        %speed,
        code = format_args!("{:#x}", code),
        "applying fan speed"
    );

    match topology {
        ControlTopology::Single => match &catalog.info.speed_control {
            Some(field) => write_control(bus, &catalog.name, field, code),
            None => debug!(subsystem = %catalog.name, "subsystem has no speed control point"),
        },
        ControlTopology::PerFru => {
            for fru in &catalog.frus {
                match &fru.speed_control {
                    Some(field) => write_control(bus, &catalog.name, field, code),
                    None => debug!(
                        subsystem = %catalog.name,
                        fru = fru.number,
                        "FRU has no speed control point, skipping"
                    ),
                }
            }
        }
        ControlTopology::PerFan => {
            for (_, fan) in catalog.fans() {
                match &fan.speed_control {
                    Some(field) => write_control(bus, &catalog.name, field, code),
                    None => debug!(
                        subsystem = %catalog.name,
                        fan = %fan.name,
                        "fan has no speed control point, skipping"
                    ),
                }
            }
        }
    }
}

fn write_control<B: Bus + ?Sized>(
    bus: &mut B,
    subsystem: &str,
    field: &RegisterField,
    code: u32,
) {
    if let Err(e) = write_field(bus, field, code) {
        warn!(
            subsystem = %subsystem,
            device = %field.device,
            address = field.address,
            error = %e,
            "unable to set fan speed control register"
        );
    }
}
