//! Unified error handling for platfand
//!
//! This crate provides the single error type used across all platfand
//! components. It uses thiserror for ergonomic error definitions with proper
//! Display and Error trait impls.

use std::io;

/// Result type alias using PlatfandError
pub type Result<T> = std::result::Result<T, PlatfandError>;

/// Unified error type for all platfand operations
#[derive(thiserror::Error, Debug)]
pub enum PlatfandError {
    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ============================================================================
    // Register Access Errors
    // ============================================================================
    #[error("Invalid register width {width} for device {device} (must be 1, 2, or 4)")]
    InvalidWidth {
        device: String,
        width: u8,
    },

    #[error("Bus access failed for device {device} register {address:#x}: {source}")]
    Bus {
        device: String,
        address: u32,
        source: io::Error,
    },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    // ============================================================================
    // Hardware Catalog Errors
    // ============================================================================
    #[error("Catalog error for subsystem {subsystem}: {reason}")]
    Catalog {
        subsystem: String,
        reason: String,
    },

    #[error("Subsystem {0} has no fan FRUs")]
    NoFanFrus(String),

    // ============================================================================
    // Configuration Store Errors
    // ============================================================================
    #[error("Store error: {0}")]
    Store(String),

    #[error("Store commit failed: {0}")]
    StoreCommit(String),

    // ============================================================================
    // Configuration and Parse Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl PlatfandError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error from a string
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a catalog error with subsystem context
    pub fn catalog(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Catalog {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    /// Create a bus error with device/register context
    pub fn bus(device: impl Into<String>, address: u32, source: io::Error) -> Self {
        Self::Bus {
            device: device.into(),
            address,
            source,
        }
    }
}

// Allow converting from String to PlatfandError
impl From<String> for PlatfandError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to PlatfandError
impl From<&str> for PlatfandError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
