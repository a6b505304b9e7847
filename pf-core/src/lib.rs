//! platfand core library
//!
//! The reconciliation and control layer between a declarative
//! configuration/state store and the registers that actually spin fans:
//!
//! - `data/` - speed levels, fan status, airflow direction
//! - `catalog` - read-only hardware description model and the catalog seam
//! - `hw/` - generic register protocol, speed application, readback, LEDs
//! - `engine/` - speed policy and the mark-and-sweep reconciliation engine
//! - `store` - the configuration-store seam and its row types
//!
//! Collaborators (the concrete store, catalog loader, and bus transport)
//! live in the daemon crate; everything here is testable against in-memory
//! fakes.

pub mod catalog;
pub mod data;
pub mod engine;
pub mod error;
pub mod hw;
pub mod store;

pub use catalog::{
    CatalogSource, ControlTopology, DirectionCodes, FanDescriptor, FanInfo, FruDescriptor,
    LedCodes, RegisterField, RpmScale, SpeedCodes, SubsystemCatalog,
};
pub use data::{FanDirection, FanSpeed, FanStatus};
pub use engine::{policy, Engine, Fan, Subsystem};
pub use error::{PlatfandError, Result};
pub use hw::{apply_leds, apply_speed, read_fan, read_field, write_field, Bus, FanReading, MemBus};
pub use store::{ConfigStore, FanUpdate, StatusBatch, SubsystemConfig};
