//! Host platform binding for Landau
//!
//! Thin consumer layer between the refresh coordinator and the host
//! smart-home platform: it rebuilds the entity set from the latest
//! snapshot, resolves entity values, and exposes the coordinator-backed
//! diagnostics (daily counters, update timestamps, API status).

use crate::coordinator::{RefreshCoordinator, TelemetrySnapshot};
use crate::entity::{self, EntitySpec, EntityKind};
use crate::logging::get_logger;
use crate::util::flatten_json;
use serde_json::Value;

/// Integration domain used in unique ids
pub const DOMAIN: &str = "landau";

const UNKNOWN_CHASSIS: &str = "unknown_chassis";

/// Identity of the tracked vehicle for host device registries
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub chassis_number: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i64>,
}

/// Build device identity from the first vehicle of a snapshot
pub fn device_info(snapshot: &TelemetrySnapshot) -> Option<DeviceInfo> {
    let vehicle = snapshot.vehicle()?;
    let model = vehicle.get("model");
    Some(DeviceInfo {
        chassis_number: vehicle
            .get("chassisNumber")
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_CHASSIS)
            .to_string(),
        brand: model
            .and_then(|m| m.get("brandName"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        model: model
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        year: model.and_then(|m| m.get("year")).and_then(|v| v.as_i64()),
    })
}

/// A materialized entity value for the host
#[derive(Debug, Clone)]
pub struct EntityState {
    pub unique_id: String,
    pub name: String,
    pub value: Option<Value>,
}

/// Entity platform bound to one coordinator's data
pub struct EntityPlatform {
    /// CAN sections enabled in config
    can_sections: Vec<String>,

    /// Current entity set, rebuilt per snapshot
    specs: Vec<EntitySpec>,

    /// Device identity from the latest rebuild
    device: Option<DeviceInfo>,

    /// Warn-once state while the vehicle payload is absent
    warned_no_vehicle: bool,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl EntityPlatform {
    /// Create a platform for the configured CAN sections
    pub fn new(can_sections: Vec<String>) -> Self {
        Self {
            can_sections,
            specs: Vec::new(),
            device: None,
            warned_no_vehicle: false,
            logger: get_logger("platform"),
        }
    }

    /// Rebuild the entity set from a snapshot. Returns the entity count;
    /// zero while no vehicle payload has arrived yet.
    pub fn rebuild(&mut self, snapshot: &TelemetrySnapshot) -> usize {
        let Some(device) = device_info(snapshot) else {
            if !self.warned_no_vehicle {
                self.logger
                    .warn("No vehicle data found; skipping entity setup until data arrives");
                self.warned_no_vehicle = true;
            }
            self.specs.clear();
            self.device = None;
            return 0;
        };
        self.warned_no_vehicle = false;
        self.device = Some(device);

        let mut specs = entity::static_entities();
        specs.extend(entity::discover_can_entities(
            &snapshot.can_bus_data,
            &self.can_sections,
        ));
        self.specs = specs;
        self.specs.len()
    }

    /// Current entity specs
    pub fn specs(&self) -> &[EntitySpec] {
        &self.specs
    }

    /// Device identity from the latest rebuild
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    fn chassis(&self) -> &str {
        self.device
            .as_ref()
            .map(|d| d.chassis_number.as_str())
            .unwrap_or(UNKNOWN_CHASSIS)
    }

    /// Stable unique id for a spec
    pub fn unique_id(&self, spec: &EntitySpec) -> String {
        let suffix = if spec.path.is_empty() {
            slugify(&spec.name)
        } else {
            spec.unique_suffix()
        };
        format!("{}_{}_{}_{}", DOMAIN, self.chassis(), suffix, kind_slug(spec.kind))
    }

    /// Materialize values for every path-backed entity
    pub fn states(&self, snapshot: &TelemetrySnapshot) -> Vec<EntityState> {
        self.specs
            .iter()
            .map(|spec| EntityState {
                unique_id: self.unique_id(spec),
                name: spec.name.clone(),
                value: entity::resolve_value(spec, snapshot),
            })
            .collect()
    }

    /// Coordinator-backed diagnostics: daily counters, update timestamps,
    /// token presence, and CAN availability
    pub fn status_entities(&self, coordinator: &RefreshCoordinator) -> Vec<EntityState> {
        let counters = coordinator.counters();
        let snapshot = coordinator.snapshot();
        let can_available = snapshot
            .can_bus_data
            .get("levels3")
            .is_some_and(Value::is_object);

        let mut states = vec![
            self.counter_state("API Calls Today", counters.calls_total),
            self.counter_state("API (CAN) Calls Today", counters.can_calls_total),
            self.counter_state("API Calls Failed Today", counters.calls_failed),
            self.counter_state("API (CAN) Calls Failed Today", counters.can_calls_failed),
        ];

        states.push(EntityState {
            unique_id: format!("{}_{}_last_full_update", DOMAIN, self.chassis()),
            name: "Last Update".to_string(),
            value: coordinator
                .last_full_update()
                .map(|ts| Value::String(ts.to_rfc3339())),
        });
        states.push(EntityState {
            unique_id: format!("{}_{}_last_can_update", DOMAIN, self.chassis()),
            name: "Last CAN Update".to_string(),
            value: coordinator
                .last_can_update()
                .map(|ts| Value::String(ts.to_rfc3339())),
        });
        states.push(EntityState {
            unique_id: format!("{}_{}_api_token_status", DOMAIN, self.chassis()),
            name: "API Status".to_string(),
            value: Some(Value::Bool(coordinator.has_token())),
        });
        states.push(EntityState {
            unique_id: format!("{}_{}_api_can_status", DOMAIN, self.chassis()),
            name: "API Status (CAN)".to_string(),
            value: Some(Value::Bool(snapshot.has_can_data() && can_available)),
        });

        states
    }

    fn counter_state(&self, name: &str, value: u64) -> EntityState {
        EntityState {
            unique_id: format!("{}_{}_counter_{}", DOMAIN, self.chassis(), slugify(name)),
            name: name.to_string(),
            value: Some(Value::from(value)),
        }
    }
}

fn kind_slug(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Sensor => "sensor",
        EntityKind::BinarySensor => "binary",
        EntityKind::Light => "light",
        EntityKind::Switch => "switch",
        EntityKind::LocationTracker => "device_tracker",
        EntityKind::Button => "button",
    }
}

fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Key count and flattened attributes for a payload overview entity
pub fn payload_overview(payload: &Value) -> Option<(usize, Vec<(String, Value)>)> {
    if !payload.is_object() {
        return None;
    }
    let flat = flatten_json(payload);
    Some((flat.len(), flat))
}
