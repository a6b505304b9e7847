//! Configuration store collaborator
//!
//! The engine treats the external configuration/state database as an opaque
//! store with get/set/commit semantics and a monotonically increasing change
//! sequence. This module defines the seam: the rows one reconciliation pass
//! reads, the rows it publishes back, and the trait a concrete store
//! implements. Publication is batched per pass and committed atomically by
//! the store; a failed commit is simply retried next pass with freshly
//! diffed values.

use serde::{Deserialize, Serialize};

use crate::data::{FanDirection, FanSpeed, FanStatus};
use crate::error::Result;

/// What the store reports about one subsystem on a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemConfig {
    pub name: String,
    /// Directory holding the subsystem's hardware description
    pub hw_desc_dir: String,
    /// Administrative override, `None` when not configured
    pub speed_override: Option<FanSpeed>,
    /// Demand level of every thermal zone associated with the subsystem
    pub zone_states: Vec<FanSpeed>,
}

/// One fan row as registered and published to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanUpdate {
    pub name: String,
    pub rpm: i64,
    pub speed: FanSpeed,
    pub direction: FanDirection,
    pub status: FanStatus,
}

impl FanUpdate {
    /// The row written when a fan is first registered, before any readback
    pub fn initial(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpm: 0,
            speed: FanSpeed::Normal,
            direction: FanDirection::FrontToBack,
            status: FanStatus::Uninitialized,
        }
    }
}

/// All changed rows of one pass, committed together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBatch {
    pub fans: Vec<FanUpdate>,
    /// Set on the batch that completes the first successful pass
    pub hw_initialized: bool,
}

/// The opaque configuration/state store.
///
/// All methods take `&mut self`: the engine is the single writer and a file
/// or connection backed implementation may need to refresh internal state on
/// read.
pub trait ConfigStore {
    /// Monotonically increasing counter bumped on every configuration change
    fn change_seqno(&mut self) -> u64;

    /// Current set of configured subsystems
    fn subsystems(&mut self) -> Result<Vec<SubsystemConfig>>;

    /// Register newly discovered fans, one transaction
    fn register_fans(&mut self, subsystem: &str, fans: &[FanUpdate]) -> Result<()>;

    /// Commit one pass worth of status rows, all-or-nothing
    fn publish(&mut self, batch: &StatusBatch) -> Result<()>;
}
