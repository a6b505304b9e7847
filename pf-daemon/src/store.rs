//! JSON file configuration/state store
//!
//! Two documents stand in for the platform configuration database:
//!
//! - the subsystems document (read): names, hardware-description
//!   directories, the `fan_speed_override` key, and thermal-zone states;
//! - the fan state document (written): one row per fan plus the one-shot
//!   `hw_initialized` flag.
//!
//! The change sequence is derived from the subsystems document's
//! mtime+length, so any edit (including our own override writes) bumps it.
//! Publication replaces the state document through a temp file + rename;
//! the rename is the commit, so readers never observe a partial pass.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pf_core::{
    ConfigStore, FanDirection, FanSpeed, FanStatus, FanUpdate, PlatfandError, Result,
    StatusBatch, SubsystemConfig,
};

/// The key in a subsystem's `other_config` holding the override level
const OVERRIDE_KEY: &str = "fan_speed_override";

/// Used when a subsystem entry does not name a hardware-description dir
const DEFAULT_HWDESC_DIR: &str = "/usr/share/platfand/hwdesc";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneEntry {
    pub name: String,
    /// Demand level reported by the thermal daemon
    #[serde(default)]
    pub fan_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubsystemEntry {
    pub name: String,
    #[serde(default)]
    pub hw_desc_dir: String,
    #[serde(default)]
    pub other_config: BTreeMap<String, String>,
    #[serde(default)]
    pub temp_sensors: Vec<ZoneEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SubsystemsDoc {
    #[serde(default)]
    pub subsystems: Vec<SubsystemEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct FanRow {
    pub rpm: i64,
    pub speed: FanSpeed,
    pub direction: FanDirection,
    pub status: FanStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDoc {
    pub version: u32,
    #[serde(default)]
    pub hw_initialized: bool,
    #[serde(default)]
    pub fans: BTreeMap<String, FanRow>,
}

impl Default for StateDoc {
    fn default() -> Self {
        Self {
            version: 1,
            hw_initialized: false,
            fans: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    config_path: PathBuf,
    state_path: PathBuf,
    seqno: u64,
    fingerprint: Option<(SystemTime, u64)>,
    state: StateDoc,
}

/// File-backed [`ConfigStore`].
///
/// Cloneable handle over shared state: the engine owns one clone, the admin
/// server another for persisting overrides.
#[derive(Debug, Clone)]
pub struct JsonStore {
    inner: Arc<Mutex<Inner>>,
}

impl JsonStore {
    pub fn new(config_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = load_state(&state_path);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                config_path: config_path.into(),
                state_path,
                seqno: 0,
                fingerprint: None,
                state,
            })),
        }
    }

    /// Persist an administrative override for one subsystem.
    ///
    /// Fails when the subsystem is not configured. The resulting document
    /// edit bumps the change sequence, so the next pass reconciles it.
    pub fn set_override(&self, subsystem: &str, speed: Option<FanSpeed>) -> Result<()> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut doc = load_config(&inner.config_path)?;

        let entry = doc
            .subsystems
            .iter_mut()
            .find(|s| s.name == subsystem)
            .ok_or_else(|| {
                PlatfandError::store(format!("no such subsystem: {}", subsystem))
            })?;

        match speed {
            Some(speed) => {
                entry
                    .other_config
                    .insert(OVERRIDE_KEY.to_string(), speed.as_str().to_string());
            }
            None => {
                entry.other_config.remove(OVERRIDE_KEY);
            }
        }

        write_atomic(&inner.config_path, &doc)
    }
}

impl ConfigStore for JsonStore {
    fn change_seqno(&mut self) -> u64 {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let current = fs::metadata(&inner.config_path)
            .ok()
            .map(|meta| (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), meta.len()));

        if let Some(fingerprint) = current {
            if inner.fingerprint != Some(fingerprint) {
                inner.fingerprint = Some(fingerprint);
                inner.seqno += 1;
                debug!(seqno = inner.seqno, "configuration document changed");
            }
        }
        inner.seqno
    }

    fn subsystems(&mut self) -> Result<Vec<SubsystemConfig>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let doc = load_config(&inner.config_path)?;
        Ok(doc
            .subsystems
            .into_iter()
            .map(|entry| {
                let hw_desc_dir = if entry.hw_desc_dir.is_empty() {
                    format!("{}/{}", DEFAULT_HWDESC_DIR, entry.name)
                } else {
                    entry.hw_desc_dir
                };
                SubsystemConfig {
                    hw_desc_dir,
                    speed_override: entry
                        .other_config
                        .get(OVERRIDE_KEY)
                        .and_then(|value| FanSpeed::from_name(value)),
                    zone_states: entry
                        .temp_sensors
                        .iter()
                        .filter_map(|zone| FanSpeed::from_name(&zone.fan_state))
                        .collect(),
                    name: entry.name,
                }
            })
            .collect())
    }

    fn register_fans(&mut self, _subsystem: &str, fans: &[FanUpdate]) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        for fan in fans {
            inner.state.fans.entry(fan.name.clone()).or_insert(FanRow {
                rpm: fan.rpm,
                speed: fan.speed,
                direction: fan.direction,
                status: fan.status,
            });
        }
        let state = inner.state.clone();
        write_atomic(&inner.state_path, &state)
    }

    fn publish(&mut self, batch: &StatusBatch) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        // Stage the batch on a copy; only adopt it once the commit lands.
        let mut staged = inner.state.clone();
        for fan in &batch.fans {
            staged.fans.insert(
                fan.name.clone(),
                FanRow {
                    rpm: fan.rpm,
                    speed: fan.speed,
                    direction: fan.direction,
                    status: fan.status,
                },
            );
        }
        if batch.hw_initialized {
            staged.hw_initialized = true;
        }

        write_atomic(&inner.state_path, &staged)?;
        inner.state = staged;
        Ok(())
    }
}

fn load_config(path: &Path) -> Result<SubsystemsDoc> {
    let content = fs::read_to_string(path).map_err(|e| {
        PlatfandError::store(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PlatfandError::store(format!("failed to parse {}: {}", path.display(), e))
    })
}

fn load_state(path: &Path) -> StateDoc {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state document unreadable, starting fresh");
                StateDoc::default()
            }
        },
        Err(_) => StateDoc::default(),
    }
}

/// Atomic write: temp file then rename, so a crash never leaves a torn
/// document behind.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");

    fs::write(&temp_path, content).map_err(|e| {
        PlatfandError::store(format!("failed to write {}: {}", temp_path.display(), e))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        PlatfandError::store(format!("failed to commit {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::ConfigStore;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("subsystems.json");
        fs::write(&path, content).unwrap();
        path
    }

    const CONFIG: &str = r#"{
        "subsystems": [
            {
                "name": "base",
                "hw_desc_dir": "/usr/share/hwdesc/base",
                "other_config": {"fan_speed_override": "fast"},
                "temp_sensors": [
                    {"name": "t1", "fan_state": "slow"},
                    {"name": "t2", "fan_state": "medium"}
                ]
            }
        ]
    }"#;

    #[test]
    fn subsystems_parse_overrides_and_zones() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);
        let mut store = JsonStore::new(&config, dir.path().join("fans.json"));

        let subsystems = store.subsystems().unwrap();
        assert_eq!(subsystems.len(), 1);
        assert_eq!(subsystems[0].speed_override, Some(FanSpeed::Fast));
        assert_eq!(
            subsystems[0].zone_states,
            vec![FanSpeed::Slow, FanSpeed::Medium]
        );
    }

    #[test]
    fn seqno_moves_only_when_the_document_changes() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);
        let mut store = JsonStore::new(&config, dir.path().join("fans.json"));

        let first = store.change_seqno();
        assert_eq!(store.change_seqno(), first);

        // an override write is a document edit
        store.set_override("base", Some(FanSpeed::Slow)).unwrap();
        assert!(store.change_seqno() > first);
    }

    #[test]
    fn set_override_rewrites_the_document() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);
        let mut store = JsonStore::new(&config, dir.path().join("fans.json"));

        store.set_override("base", None).unwrap();
        assert_eq!(store.subsystems().unwrap()[0].speed_override, None);

        store.set_override("base", Some(FanSpeed::Max)).unwrap();
        assert_eq!(
            store.subsystems().unwrap()[0].speed_override,
            Some(FanSpeed::Max)
        );

        assert!(store.set_override("missing", None).is_err());
    }

    #[test]
    fn publish_commits_atomically_and_persists() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);
        let state_path = dir.path().join("fans.json");
        let mut store = JsonStore::new(&config, &state_path);

        let batch = StatusBatch {
            fans: vec![FanUpdate {
                name: "base-1-1".to_string(),
                rpm: 4200,
                speed: FanSpeed::Fast,
                direction: FanDirection::FrontToBack,
                status: FanStatus::Ok,
            }],
            hw_initialized: true,
        };
        store.publish(&batch).unwrap();

        // a fresh handle reads the committed state back
        let reread = JsonStore::new(&config, &state_path);
        let inner = reread.inner.lock().unwrap();
        assert!(inner.state.hw_initialized);
        let row = inner.state.fans.get("base-1-1").unwrap();
        assert_eq!(row.rpm, 4200);
        assert_eq!(row.status, FanStatus::Ok);
        // no temp file left behind
        assert!(!state_path.with_extension("json.tmp").exists());
    }

    #[test]
    fn registration_keeps_existing_rows() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);
        let mut store = JsonStore::new(&config, dir.path().join("fans.json"));

        store
            .publish(&StatusBatch {
                fans: vec![FanUpdate {
                    name: "base-1-1".to_string(),
                    rpm: 4200,
                    speed: FanSpeed::Fast,
                    direction: FanDirection::FrontToBack,
                    status: FanStatus::Ok,
                }],
                hw_initialized: false,
            })
            .unwrap();

        // re-registration after a daemon restart must not clobber state
        store
            .register_fans("base", &[FanUpdate::initial("base-1-1")])
            .unwrap();
        let inner = store.inner.lock().unwrap();
        assert_eq!(inner.state.fans.get("base-1-1").unwrap().rpm, 4200);
    }

    #[test]
    fn missing_config_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonStore::new(
            dir.path().join("nope.json"),
            dir.path().join("fans.json"),
        );
        assert!(store.subsystems().is_err());
    }
}
