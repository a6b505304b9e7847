//! Data types for platfand
//!
//! Contains the core level/status/direction enums shared by every layer.

mod types;

pub use types::{FanDirection, FanSpeed, FanStatus};
