//! Error type re-exports
//!
//! All of pf-core uses the unified error type from the pf-error crate.

pub use pf_error::{PlatfandError, Result};
