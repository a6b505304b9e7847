//! Reconciliation engine
//!
//! Owns the live subsystem/fan entity set and keeps it in agreement with
//! the configuration store using a mark-and-sweep pass per observed
//! configuration change. Each wake runs a bounded unit of work: reconcile,
//! recompute and apply speeds, read hardware state back, aggregate LEDs,
//! and publish one diffed batch to the store.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogSource, FanDescriptor, SubsystemCatalog};
use crate::data::{FanDirection, FanSpeed, FanStatus};
use crate::engine::policy;
use crate::hw::leds::apply_leds;
use crate::hw::readback::read_fan;
use crate::hw::register::Bus;
use crate::hw::speed::apply_speed;
use crate::store::{ConfigStore, FanUpdate, StatusBatch, SubsystemConfig};

/// One physical fan, owned by its subsystem.
///
/// Readback state (`rpm`, `direction`, `status`) is meaningful only after
/// the first readback pass and is written by the engine alone.
#[derive(Debug)]
pub struct Fan {
    /// Globally unique name, namespaced as `<subsystem>-<local>`
    pub name: String,
    /// Name within the subsystem's catalog
    pub local_name: String,
    /// Immutable descriptor cloned from the catalog at creation
    pub descriptor: FanDescriptor,
    pub rpm: i64,
    pub direction: FanDirection,
    pub status: FanStatus,
    /// Last row successfully committed to the store, for diffing
    published: Option<FanUpdate>,
}

/// One independently cooled hardware domain
#[derive(Debug)]
pub struct Subsystem {
    pub name: String,
    /// Liveness flag reset at the start of every reconciliation pass
    marked: bool,
    /// True only when the catalog loaded and reported at least one fan FRU
    valid: bool,
    /// Name of an enclosing subsystem; never populated by current catalogs
    #[allow(dead_code)]
    parent: Option<String>,
    /// Aggregated thermal-zone demand
    pub sensor_speed: FanSpeed,
    /// Administrative override from the store
    pub speed_override: Option<FanSpeed>,
    /// Last level actually driven to hardware; always concrete
    pub resolved_speed: FanSpeed,
    catalog: Option<SubsystemCatalog>,
    pub fans: BTreeMap<String, Fan>,
}

impl Subsystem {
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            marked: false,
            valid: false,
            parent: None,
            sensor_speed: FanSpeed::Normal,
            speed_override: None,
            resolved_speed: FanSpeed::Normal,
            catalog: None,
            fans: BTreeMap::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn catalog(&self) -> Option<&SubsystemCatalog> {
        self.catalog.as_ref()
    }
}

/// The reconciliation engine.
///
/// Holds the two owned collections (the subsystem map and the non-owning
/// global fan index) plus the change-sequence gate and the one-shot
/// hardware-initialized latch. Single writer by construction: all mutation
/// happens from the event loop that drives [`Engine::run_pass`].
pub struct Engine<S, C, B> {
    store: S,
    catalogs: C,
    bus: B,
    subsystems: BTreeMap<String, Subsystem>,
    /// Namespaced fan name -> owning subsystem name
    fan_index: HashMap<String, String>,
    last_seqno: Option<u64>,
    hw_initialized: bool,
}

impl<S, C, B> Engine<S, C, B>
where
    S: ConfigStore,
    C: CatalogSource,
    B: Bus,
{
    pub fn new(store: S, catalogs: C, bus: B) -> Self {
        Self {
            store,
            catalogs,
            bus,
            subsystems: BTreeMap::new(),
            fan_index: HashMap::new(),
            last_seqno: None,
            hw_initialized: false,
        }
    }

    /// One bounded unit of work: reconcile, apply, read back, publish.
    pub fn run_pass(&mut self) {
        self.reconcile();
        self.read_status();
        self.update_leds();
        self.publish();
    }

    /// Bring the entity set into agreement with the store.
    ///
    /// A no-op when the store's change sequence has not moved since the
    /// last pass.
    pub fn reconcile(&mut self) {
        let seqno = self.store.change_seqno();
        if self.last_seqno == Some(seqno) {
            return;
        }
        self.last_seqno = Some(seqno);
        debug!(seqno, "configuration changed, reconciling");

        for subsystem in self.subsystems.values_mut() {
            subsystem.marked = false;
        }

        let configs = match self.store.subsystems() {
            Ok(configs) => configs,
            Err(e) => {
                // Do not sweep on a failed read; retry the whole pass later.
                warn!(error = %e, "unable to read subsystem configuration");
                self.last_seqno = None;
                return;
            }
        };

        for cfg in &configs {
            let usable = match self.subsystems.get(&cfg.name) {
                Some(existing) => existing.valid,
                None => self.create_subsystem(cfg),
            };
            if !usable {
                continue;
            }

            let subsystem = self
                .subsystems
                .get_mut(&cfg.name)
                .expect("subsystem present after lookup");

            subsystem.sensor_speed = policy::aggregate_zones(cfg.zone_states.iter().copied());
            subsystem.speed_override = cfg.speed_override;

            let resolved =
                policy::resolve(Some(subsystem.sensor_speed), subsystem.speed_override);
            // Recorded before any hardware write so published state reflects
            // intent even when a control-point write fails.
            subsystem.resolved_speed = resolved;

            if let Some(catalog) = subsystem.catalog.as_ref() {
                apply_speed(&mut self.bus, catalog, resolved);
            }

            subsystem.marked = true;
        }

        self.sweep();
    }

    /// Create the local subsystem for a newly reported configuration entry.
    ///
    /// Returns whether the subsystem came up usable. A failed creation
    /// leaves an unmarked placeholder that the same pass sweeps away; the
    /// subsystem is retried when the store reports it again.
    fn create_subsystem(&mut self, cfg: &SubsystemConfig) -> bool {
        debug!(subsystem = %cfg.name, "adding new subsystem");
        self.subsystems
            .insert(cfg.name.clone(), Subsystem::placeholder(&cfg.name));

        let catalog = match self.catalogs.load(&cfg.name, &cfg.hw_desc_dir) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(
                    subsystem = %cfg.name,
                    error = %e,
                    "unable to load hardware description"
                );
                return false;
            }
        };

        if catalog.frus.is_empty() {
            info!(subsystem = %cfg.name, "subsystem has no fan FRUs");
            return false;
        }

        let mut rows = Vec::with_capacity(catalog.fan_count());
        let subsystem = self
            .subsystems
            .get_mut(&cfg.name)
            .expect("placeholder just inserted");

        for (_, descriptor) in catalog.fans() {
            let name = format!("{}-{}", cfg.name, descriptor.name);
            debug!(fan = %name, "registering fan");
            subsystem.fans.insert(
                name.clone(),
                Fan {
                    name: name.clone(),
                    local_name: descriptor.name.clone(),
                    descriptor: descriptor.clone(),
                    rpm: 0,
                    direction: FanDirection::FrontToBack,
                    status: FanStatus::Uninitialized,
                    published: None,
                },
            );
            self.fan_index.insert(name.clone(), cfg.name.clone());
            rows.push(FanUpdate::initial(name));
        }

        subsystem.speed_override = cfg.speed_override;
        subsystem.sensor_speed = FanSpeed::Normal;
        subsystem.resolved_speed =
            policy::resolve(Some(subsystem.sensor_speed), subsystem.speed_override);
        subsystem.catalog = Some(catalog);
        subsystem.valid = true;

        info!(
            subsystem = %cfg.name,
            fans = rows.len(),
            "subsystem added"
        );

        if let Err(e) = self.store.register_fans(&cfg.name, &rows) {
            warn!(subsystem = %cfg.name, error = %e, "fan registration failed");
        }

        let subsystem = self
            .subsystems
            .get(&cfg.name)
            .expect("placeholder just inserted");
        if let Some(catalog) = subsystem.catalog.as_ref() {
            apply_speed(&mut self.bus, catalog, subsystem.resolved_speed);
        }

        true
    }

    /// Destroy every subsystem the pass did not mark, with its fans and
    /// their global index entries (collect first, then remove).
    fn sweep(&mut self) {
        let dead: Vec<String> = self
            .subsystems
            .values()
            .filter(|s| !s.marked)
            .map(|s| s.name.clone())
            .collect();

        for name in dead {
            if let Some(subsystem) = self.subsystems.remove(&name) {
                for fan_name in subsystem.fans.keys() {
                    self.fan_index.remove(fan_name);
                }
                info!(
                    subsystem = %name,
                    fans = subsystem.fans.len(),
                    "removed subsystem no longer present in configuration"
                );
            }
        }
    }

    /// Read rpm/direction/presence/fault state back for every fan.
    fn read_status(&mut self) {
        for subsystem in self.subsystems.values_mut() {
            if !subsystem.valid {
                continue;
            }
            let catalog = match subsystem.catalog.as_ref() {
                Some(catalog) => catalog,
                None => continue,
            };
            for fan in subsystem.fans.values_mut() {
                let reading = read_fan(&mut self.bus, catalog, &fan.descriptor);
                fan.rpm = reading.rpm;
                fan.direction = reading.direction;
                fan.status = reading.status;
                debug!(fan = %fan.name, rpm = fan.rpm, status = %fan.status, "fan readback");
            }
        }
    }

    /// Roll fan status up into FRU and subsystem LEDs.
    fn update_leds(&mut self) {
        for subsystem in self.subsystems.values() {
            if !subsystem.valid {
                continue;
            }
            let catalog = match subsystem.catalog.as_ref() {
                Some(catalog) => catalog,
                None => continue,
            };
            let statuses: HashMap<String, FanStatus> = subsystem
                .fans
                .values()
                .map(|fan| (fan.local_name.clone(), fan.status))
                .collect();
            apply_leds(&mut self.bus, catalog, &statuses);
        }
    }

    /// Publish changed fan rows as one transaction.
    fn publish(&mut self) {
        let mut fans = Vec::new();
        for subsystem in self.subsystems.values() {
            if !subsystem.valid {
                continue;
            }
            for fan in subsystem.fans.values() {
                let row = FanUpdate {
                    name: fan.name.clone(),
                    rpm: fan.rpm,
                    speed: subsystem.resolved_speed,
                    direction: fan.direction,
                    status: fan.status,
                };
                if fan.published.as_ref() != Some(&row) {
                    fans.push(row);
                }
            }
        }

        let first_pass = !self.hw_initialized;
        if fans.is_empty() && !first_pass {
            return;
        }

        let batch = StatusBatch {
            fans,
            hw_initialized: first_pass,
        };
        match self.store.publish(&batch) {
            Ok(()) => {
                self.hw_initialized = true;
                for row in batch.fans {
                    if let Some(subsystem_name) = self.fan_index.get(&row.name) {
                        if let Some(fan) = self
                            .subsystems
                            .get_mut(subsystem_name)
                            .and_then(|s| s.fans.get_mut(&row.name))
                        {
                            fan.published = Some(row);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "status publication failed, will retry next pass");
            }
        }
    }

    /// Iterate the known subsystems in name order
    pub fn subsystems(&self) -> impl Iterator<Item = &Subsystem> {
        self.subsystems.values()
    }

    /// O(1) fan lookup through the global index
    pub fn fan(&self, name: &str) -> Option<&Fan> {
        let subsystem = self.fan_index.get(name)?;
        self.subsystems.get(subsystem)?.fans.get(name)
    }

    /// Human-readable snapshot for the admin inspection interface
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for subsystem in self.subsystems.values() {
            let _ = writeln!(out, "Subsystem: {}", subsystem.name);
            let override_name = subsystem
                .speed_override
                .map(|s| s.as_str())
                .unwrap_or("none");
            let _ = writeln!(out, "    Fan speed override: {}", override_name);
            let _ = writeln!(out, "    Fan speed: {}", subsystem.sensor_speed);
            if subsystem.fans.is_empty() {
                let _ = writeln!(out, "    Fan details: No fans found.");
                continue;
            }
            let _ = writeln!(out, "    Fan details:");
            for fan in subsystem.fans.values() {
                let _ = writeln!(out, "        Name: {}", fan.name);
                let _ = writeln!(out, "            rpm: {}", fan.rpm);
                let _ = writeln!(out, "            direction: {}", fan.direction);
                let _ = writeln!(out, "            status: {}", fan.status);
            }
        }
        out
    }
}
