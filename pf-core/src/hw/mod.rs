//! Hardware interaction modules
//!
//! Register-level access plus the speed, readback, and LED layers built on
//! top of it. All register traffic funnels through [`register::read_field`]
//! and [`register::write_field`].

pub mod leds;
pub mod readback;
pub mod register;
pub mod speed;

pub use leds::apply_leds;
pub use readback::{read_fan, FanReading};
pub use register::{read_field, write_field, Bus, MemBus};
pub use speed::apply_speed;
