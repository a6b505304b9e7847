//! Fan readback and derivation
//!
//! Reads direction, presence, RPM, and fault state for one fan per pass and
//! derives the published values. Every failure degrades toward the fail-safe
//! value: direction falls back to front-to-back, a presence read failure
//! reports the fan absent (and therefore faulted), an RPM failure reports 0,
//! and a fault-register failure leaves the status uninitialized.

use tracing::warn;

use crate::catalog::{FanDescriptor, FruDescriptor, RegisterField, RpmScale, SubsystemCatalog};
use crate::data::{FanDirection, FanStatus};
use crate::hw::register::{read_field, Bus};

/// One pass worth of readback state for a single fan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanReading {
    pub rpm: i64,
    pub direction: FanDirection,
    pub status: FanStatus,
}

/// Interpret a masked field value through its declared polarity
fn field_active(raw: u32, field: &RegisterField) -> bool {
    if field.negative_polarity {
        raw == 0
    } else {
        raw != 0
    }
}

/// Read the complete state of one fan.
pub fn read_fan<B: Bus + ?Sized>(
    bus: &mut B,
    catalog: &SubsystemCatalog,
    fan: &FanDescriptor,
) -> FanReading {
    let fru = catalog.fru_for_fan(&fan.name);

    let direction = read_direction(bus, catalog, fru);

    let present = match fru {
        Some(fru) => read_presence(bus, &catalog.name, fru),
        None => true,
    };
    if !present {
        // An absent fan cannot report meaningful tach or fault values.
        return FanReading {
            rpm: 0,
            direction,
            status: FanStatus::Fault,
        };
    }

    FanReading {
        rpm: read_rpm(bus, catalog, fan),
        direction,
        status: read_status(bus, &catalog.name, fan),
    }
}

fn read_direction<B: Bus + ?Sized>(
    bus: &mut B,
    catalog: &SubsystemCatalog,
    fru: Option<&FruDescriptor>,
) -> FanDirection {
    let field = match fru.and_then(|fru| fru.direction_detect.as_ref()) {
        Some(field) => field,
        None => return FanDirection::FrontToBack,
    };

    let value = match read_field(bus, field) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                subsystem = %catalog.name,
                device = %field.device,
                error = %e,
                "unable to read fan direction, assuming front-to-back"
            );
            return FanDirection::FrontToBack;
        }
    };

    // The register yields a single bit; which value means front-to-back is a
    // per-subsystem catalog declaration, not an absolute encoding.
    let f2b_is_set = catalog.info.direction_codes.f2b != 0;
    if (value != 0) == f2b_is_set {
        FanDirection::FrontToBack
    } else {
        FanDirection::BackToFront
    }
}

fn read_presence<B: Bus + ?Sized>(bus: &mut B, subsystem: &str, fru: &FruDescriptor) -> bool {
    let field = match &fru.presence {
        Some(field) => field,
        None => return true,
    };

    match read_field(bus, field) {
        Ok(value) => field_active(value, field),
        Err(e) => {
            // Fail safe toward reporting a fault rather than a false ok.
            warn!(
                subsystem = %subsystem,
                fru = fru.number,
                error = %e,
                "unable to read FRU presence, treating as not present"
            );
            false
        }
    }
}

fn read_rpm<B: Bus + ?Sized>(
    bus: &mut B,
    catalog: &SubsystemCatalog,
    fan: &FanDescriptor,
) -> i64 {
    let low = match read_field(bus, &fan.rpm) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                subsystem = %catalog.name,
                fan = %fan.name,
                error = %e,
                "unable to read fan rpm"
            );
            return 0;
        }
    };

    let raw = match &fan.rpm_high {
        Some(high_field) => match read_field(bus, high_field) {
            Ok(high) => (high << 8) | low,
            Err(e) => {
                warn!(
                    subsystem = %catalog.name,
                    fan = %fan.name,
                    error = %e,
                    "unable to read fan rpm high byte"
                );
                return 0;
            }
        },
        None => low,
    };

    match catalog.info.rpm_scale {
        Some(RpmScale::Multiplier(m)) => i64::from(raw) * i64::from(m),
        Some(RpmScale::Numerator(n)) => {
            if raw == 0 {
                0
            } else {
                i64::from(n) / i64::from(raw)
            }
        }
        None => {
            warn!(
                subsystem = %catalog.name,
                fan = %fan.name,
                "no rpm scale configured, publishing raw tachometer count"
            );
            i64::from(raw)
        }
    }
}

fn read_status<B: Bus + ?Sized>(
    bus: &mut B,
    subsystem: &str,
    fan: &FanDescriptor,
) -> FanStatus {
    match read_field(bus, &fan.fault) {
        Ok(value) => {
            if field_active(value, &fan.fault) {
                FanStatus::Fault
            } else {
                FanStatus::Ok
            }
        }
        Err(e) => {
            warn!(
                subsystem = %subsystem,
                fan = %fan.name,
                error = %e,
                "unable to read fan status"
            );
            FanStatus::Uninitialized
        }
    }
}
