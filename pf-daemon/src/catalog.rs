//! Hardware description loader
//!
//! Resolves a subsystem's hardware-description directory to its fan
//! catalog. The description is one JSON document per subsystem; anything
//! beyond deserialization belongs to the catalog model in pf-core.

use std::fs;
use std::path::Path;

use tracing::debug;

use pf_core::{CatalogSource, PlatfandError, Result, SubsystemCatalog};

/// File name of the fan description inside a hardware-description directory
const FANS_FILE: &str = "fans.json";

#[derive(Debug, Clone, Default)]
pub struct JsonCatalogSource;

impl JsonCatalogSource {
    pub fn new() -> Self {
        Self
    }
}

impl CatalogSource for JsonCatalogSource {
    fn load(&self, subsystem: &str, hw_desc_dir: &str) -> Result<SubsystemCatalog> {
        let path = Path::new(hw_desc_dir).join(FANS_FILE);
        debug!(subsystem, path = %path.display(), "loading hardware description");

        let content = fs::read_to_string(&path).map_err(|e| {
            PlatfandError::catalog(
                subsystem,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let catalog: SubsystemCatalog = serde_json::from_str(&content).map_err(|e| {
            PlatfandError::catalog(
                subsystem,
                format!("failed to parse {}: {}", path.display(), e),
            )
        })?;

        if catalog.name != subsystem {
            return Err(PlatfandError::catalog(
                subsystem,
                format!("description file names subsystem {}", catalog.name),
            ));
        }

        Ok(catalog)
    }
}
