//! Entity schema for host-platform bindings
//!
//! The host platform materializes entities from a declarative schema: a
//! list of (path, kind, semantic type, unit, category) specs. Static specs
//! cover the vehicle identity, position, derived power values, and toggle
//! controls; CAN specs are discovered by a capability-tagged traversal of
//! the configured sections. Discovery and materialization are separate
//! pure functions.

use crate::coordinator::TelemetrySnapshot;
use crate::util::{PathStep, calculate_power_watts, get_nested_value, index, key, value_to_f64};
use serde_json::Value;

/// CAN endpoint accepting the toggle commands for lights and power
pub const CAN_TOGGLE_ENDPOINT: u32 = 11;

/// Kind of host entity a spec materializes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Sensor,
    BinarySensor,
    Light,
    Switch,
    LocationTracker,
    Button,
}

/// Semantic classification driving units and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Voltage,
    Current,
    Temperature,
    Humidity,
    Power,
    /// Generic numeric reading
    Measurement,
    /// Identity or other string value
    Text,
    /// Boolean: mains/charger power presence
    PowerState,
    /// Boolean: warning/fault/error flag
    Problem,
    /// Boolean: pump or motor running
    Running,
    /// Generic boolean
    OnOff,
    /// GPS position
    Location,
    /// Stateless action
    Action,
}

/// Exposure category for host UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Primary,
    Diagnostic,
}

/// Derived watts calculation attached to a current (amps) reading
#[derive(Debug, Clone)]
pub struct PowerDerivation {
    /// Voltage assumed when no measured value is present
    pub default_volts: f64,

    /// Path to the measured voltage that overrides the default
    pub measured_volts_path: Vec<PathStep>,
}

/// CAN command bound to a toggle entity
#[derive(Debug, Clone)]
pub struct CanCommand {
    pub endpoint: u32,
    pub payload: Vec<u8>,
}

/// One declarative entity definition
#[derive(Debug, Clone)]
pub struct EntitySpec {
    /// Display name
    pub name: String,

    /// Kind of entity to materialize
    pub kind: EntityKind,

    /// Path into the snapshot (`customer_data` or `can_bus_data` root)
    pub path: Vec<PathStep>,

    /// Semantic classification
    pub semantic: SemanticType,

    /// Unit of measurement, when one applies
    pub unit: Option<&'static str>,

    /// Exposure category
    pub category: EntityCategory,

    /// Watts derivation for power sensors
    pub derived: Option<PowerDerivation>,

    /// Toggle command for lights and switches
    pub command: Option<CanCommand>,
}

impl EntitySpec {
    fn sensor(
        name: &str,
        path: Vec<PathStep>,
        semantic: SemanticType,
        unit: Option<&'static str>,
        category: EntityCategory,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: EntityKind::Sensor,
            path,
            semantic,
            unit,
            category,
            derived: None,
            command: None,
        }
    }

    fn derived_power(
        name: &str,
        amps_path: Vec<PathStep>,
        default_volts: f64,
        measured_volts_path: Vec<PathStep>,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: EntityKind::Sensor,
            path: amps_path,
            semantic: SemanticType::Power,
            unit: Some("W"),
            category: EntityCategory::Primary,
            derived: Some(PowerDerivation {
                default_volts,
                measured_volts_path,
            }),
            command: None,
        }
    }

    fn toggle(name: &str, kind: EntityKind, state_path: Vec<PathStep>, payload: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            path: state_path,
            semantic: SemanticType::OnOff,
            unit: None,
            category: EntityCategory::Primary,
            derived: None,
            command: Some(CanCommand {
                endpoint: CAN_TOGGLE_ENDPOINT,
                payload: payload.to_vec(),
            }),
        }
    }

    /// Stable suffix for unique ids, derived from the path
    pub fn unique_suffix(&self) -> String {
        let joined = self
            .path
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase();
        joined.trim_start_matches("can_bus_data_").to_string()
    }
}

/// Entities that exist for every vehicle, independent of the CAN payload
pub fn static_entities() -> Vec<EntitySpec> {
    let vehicle = |leaf: &str| vec![key("customer_data"), key("vehicles"), index(0), key(leaf)];
    let position = |leaf: &str| {
        vec![
            key("customer_data"),
            key("vehicles"),
            index(0),
            key("lastPosition"),
            key(leaf),
        ]
    };
    let levels3 = |leaf: &str| vec![key("can_bus_data"), key("levels3"), key(leaf)];

    vec![
        // Identity (diagnostics)
        EntitySpec::sensor(
            "Chassis Number",
            vehicle("chassisNumber"),
            SemanticType::Text,
            None,
            EntityCategory::Diagnostic,
        ),
        EntitySpec::sensor(
            "Brand Name",
            vec![
                key("customer_data"),
                key("vehicles"),
                index(0),
                key("model"),
                key("brandName"),
            ],
            SemanticType::Text,
            None,
            EntityCategory::Diagnostic,
        ),
        EntitySpec::sensor(
            "Model Name",
            vec![
                key("customer_data"),
                key("vehicles"),
                index(0),
                key("model"),
                key("name"),
            ],
            SemanticType::Text,
            None,
            EntityCategory::Diagnostic,
        ),
        EntitySpec::sensor(
            "Model Year",
            vec![
                key("customer_data"),
                key("vehicles"),
                index(0),
                key("model"),
                key("year"),
            ],
            SemanticType::Text,
            None,
            EntityCategory::Diagnostic,
        ),
        // Battery readings reported with the position fix
        EntitySpec::sensor(
            "Leisure Voltage",
            position("leisureVoltage"),
            SemanticType::Voltage,
            Some("V"),
            EntityCategory::Primary,
        ),
        EntitySpec::sensor(
            "Alarm Triggered Leisure Voltage",
            position("alarmTriggeredLeisureVoltage"),
            SemanticType::Voltage,
            Some("V"),
            EntityCategory::Primary,
        ),
        // Derived power: measured voltage preferred, nominal fallback
        EntitySpec::derived_power(
            "Battery Power",
            levels3("batteryAmp"),
            12.0,
            levels3("leisureBatteryVoltage"),
        ),
        EntitySpec::derived_power(
            "Solar Power",
            levels3("solarAmps"),
            18.0,
            levels3("solarVoltage"),
        ),
        EntitySpec::derived_power(
            "Mains Power",
            levels3("acCurrent"),
            240.0,
            levels3("acVoltage"),
        ),
        // Vehicle location
        EntitySpec {
            name: "Vehicle Location".to_string(),
            kind: EntityKind::LocationTracker,
            path: vec![
                key("customer_data"),
                key("vehicles"),
                index(0),
                key("lastPosition"),
            ],
            semantic: SemanticType::Location,
            unit: None,
            category: EntityCategory::Primary,
            derived: None,
            command: None,
        },
        // Toggle controls, all on the shared CAN toggle endpoint
        EntitySpec::toggle(
            "All Lights",
            EntityKind::Light,
            vec![key("can_bus_data"), key("psuStatus1"), key("lightsOn")],
            &[5, 19, 100, 100, 4, 0, 0, 0],
        ),
        EntitySpec::toggle(
            "Awning Light",
            EntityKind::Light,
            vec![key("can_bus_data"), key("psuStatus1"), key("awningLightsOn")],
            &[6, 19, 100, 100, 4, 0, 0, 0],
        ),
        EntitySpec::toggle(
            "Dimmer 1 Light",
            EntityKind::Light,
            vec![key("can_bus_data"), key("psuStatus2"), key("dim1on")],
            &[9, 19, 100, 100, 4, 0, 0, 0],
        ),
        EntitySpec::toggle(
            "Dimmer 2 Light",
            EntityKind::Light,
            vec![key("can_bus_data"), key("psuStatus2"), key("dim2on")],
            &[10, 19, 100, 100, 4, 0, 0, 0],
        ),
        EntitySpec::toggle(
            "Power",
            EntityKind::Switch,
            vec![key("can_bus_data"), key("psuStatus1"), key("powerOn")],
            &[4, 19, 100, 100, 4, 0, 0, 0],
        ),
        // Manual refresh action
        EntitySpec {
            name: "Update Now".to_string(),
            kind: EntityKind::Button,
            path: Vec::new(),
            semantic: SemanticType::Action,
            unit: None,
            category: EntityCategory::Primary,
            derived: None,
            command: None,
        },
    ]
}

/// Numeric keys with dedicated derived sensors, excluded from generic
/// discovery
const DEDICATED_NUMERIC_KEYS: [&str; 4] =
    ["batteryamp", "solaramps", "accurrent", "leisurebatteryvoltage"];

/// Firmware/identity values that belong in diagnostics
const FIRMWARE_KEYS: [&str; 3] = [
    "cpsoftwareversionnumber",
    "psusoftwarenumber",
    "ec630softwareversionnumber",
];

/// Discover entity specs from the CAN payload sections enabled in config.
///
/// Walks each named section recursively; `id` keys are ignored at any
/// level, booleans become binary sensors, numbers and strings become
/// sensors classified by key name.
pub fn discover_can_entities(can_bus_data: &Value, sections: &[String]) -> Vec<EntitySpec> {
    let mut specs = Vec::new();
    for section in sections {
        if let Some(section_data) = can_bus_data.get(section.as_str()) {
            let base = vec![key("can_bus_data"), key(section)];
            walk_section(section_data, &base, &mut specs);
        }
    }
    specs
}

fn walk_section(data: &Value, base_path: &[PathStep], specs: &mut Vec<EntitySpec>) {
    let Some(map) = data.as_object() else {
        return;
    };

    for (k, v) in map {
        if k == "id" {
            continue;
        }
        let mut path = base_path.to_vec();
        path.push(key(k));
        let lower = k.to_lowercase();

        match v {
            Value::Object(_) => walk_section(v, &path, specs),
            Value::Bool(_) => {
                let semantic = classify_binary(&lower);
                specs.push(EntitySpec {
                    name: humanize_key(k),
                    kind: EntityKind::BinarySensor,
                    path,
                    semantic,
                    unit: None,
                    category: EntityCategory::Primary,
                    derived: None,
                    command: None,
                });
            }
            Value::Number(_) => {
                if DEDICATED_NUMERIC_KEYS.contains(&lower.as_str()) {
                    continue;
                }
                let (semantic, unit) = classify_numeric(&lower);
                specs.push(EntitySpec {
                    name: humanize_key(k),
                    kind: EntityKind::Sensor,
                    path,
                    semantic,
                    unit,
                    category: category_for(&lower),
                    derived: None,
                    command: None,
                });
            }
            Value::String(_) => {
                specs.push(EntitySpec {
                    name: humanize_key(k),
                    kind: EntityKind::Sensor,
                    path,
                    semantic: SemanticType::Text,
                    unit: None,
                    category: category_for(&lower),
                    derived: None,
                    command: None,
                });
            }
            _ => {}
        }
    }
}

fn classify_binary(lower_key: &str) -> SemanticType {
    if ["poweron", "mains", "acpresent"]
        .iter()
        .any(|p| lower_key.contains(p))
    {
        SemanticType::PowerState
    } else if ["warning", "fault", "error"]
        .iter()
        .any(|p| lower_key.contains(p))
    {
        SemanticType::Problem
    } else if ["run", "pump"].iter().any(|p| lower_key.contains(p)) {
        SemanticType::Running
    } else {
        SemanticType::OnOff
    }
}

fn classify_numeric(lower_key: &str) -> (SemanticType, Option<&'static str>) {
    if lower_key.contains("voltage") {
        (SemanticType::Voltage, Some("V"))
    } else if lower_key.contains("current") {
        (SemanticType::Current, Some("A"))
    } else if lower_key.contains("temp") {
        (SemanticType::Temperature, Some("°C"))
    } else if lower_key.contains("humiditylevel") {
        (SemanticType::Humidity, Some("%"))
    } else {
        (SemanticType::Measurement, None)
    }
}

fn category_for(lower_key: &str) -> EntityCategory {
    if FIRMWARE_KEYS.contains(&lower_key) {
        EntityCategory::Diagnostic
    } else {
        EntityCategory::Primary
    }
}

/// Turn a payload key into a readable name: split camelCase and
/// underscores, capitalize words, spell PSU in caps
pub fn humanize_key(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in raw.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_ascii_uppercase()
            && current
                .chars()
                .last()
                .is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            if w.eq_ignore_ascii_case("psu") {
                "PSU".to_string()
            } else {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Walk a spec path against a snapshot, dispatching on the payload root
pub fn resolve_path<'a>(snapshot: &'a TelemetrySnapshot, path: &[PathStep]) -> Option<&'a Value> {
    let (root, rest) = path.split_first()?;
    let base = match root {
        PathStep::Key(k) if k == "customer_data" => &snapshot.customer_data,
        PathStep::Key(k) if k == "can_bus_data" => &snapshot.can_bus_data,
        _ => return None,
    };
    get_nested_value(base, rest)
}

/// Materialize a spec's value against a snapshot.
///
/// Derived power sensors multiply the amps reading by the measured voltage
/// when present, falling back to the nominal voltage otherwise.
pub fn resolve_value(spec: &EntitySpec, snapshot: &TelemetrySnapshot) -> Option<Value> {
    if let Some(derived) = &spec.derived {
        let amps = resolve_path(snapshot, &spec.path).and_then(value_to_f64);
        let measured = resolve_path(snapshot, &derived.measured_volts_path).and_then(value_to_f64);
        return calculate_power_watts(amps, measured, derived.default_volts, true)
            .map(|watts| Value::from(watts));
    }
    resolve_path(snapshot, &spec.path).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_can() -> Value {
        json!({
            "psuStatus1": {
                "id": 17,
                "powerOn": true,
                "lightsOn": false,
                "waterPumpOn": true,
                "nested": {"chargerFault": false}
            },
            "levels3": {
                "batteryAmp": 2.0,
                "solarAmps": 1.5,
                "leisureBatteryVoltage": 13.2,
                "internalTemperature": 19.5,
                "cpSoftwareVersionNumber": "4.1.0"
            },
            "levels2": {
                "freshWaterLevel": 80
            }
        })
    }

    fn sections(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn discovery_classifies_booleans() {
        let specs = discover_can_entities(&sample_can(), &sections(&["psuStatus1"]));

        let power = specs.iter().find(|s| s.name == "Power On").unwrap();
        assert_eq!(power.kind, EntityKind::BinarySensor);
        assert_eq!(power.semantic, SemanticType::PowerState);

        let pump = specs.iter().find(|s| s.name == "Water Pump On").unwrap();
        assert_eq!(pump.semantic, SemanticType::Running);

        // Nested objects are walked
        let fault = specs.iter().find(|s| s.name == "Charger Fault").unwrap();
        assert_eq!(fault.semantic, SemanticType::Problem);
        assert_eq!(
            fault.path,
            vec![
                key("can_bus_data"),
                key("psuStatus1"),
                key("nested"),
                key("chargerFault")
            ]
        );
    }

    #[test]
    fn discovery_skips_id_and_dedicated_keys() {
        let specs = discover_can_entities(&sample_can(), &sections(&["psuStatus1", "levels3"]));

        assert!(specs.iter().all(|s| s.name != "Id"));
        // Amps/voltage keys with derived power sensors are not re-exposed
        assert!(specs.iter().all(|s| s.name != "Battery Amp"));
        assert!(specs.iter().all(|s| s.name != "Solar Amps"));
        assert!(specs.iter().all(|s| s.name != "Leisure Battery Voltage"));
    }

    #[test]
    fn discovery_classifies_numbers_and_strings() {
        let specs = discover_can_entities(&sample_can(), &sections(&["levels3", "levels2"]));

        let temp = specs
            .iter()
            .find(|s| s.name == "Internal Temperature")
            .unwrap();
        assert_eq!(temp.semantic, SemanticType::Temperature);
        assert_eq!(temp.unit, Some("°C"));

        let level = specs.iter().find(|s| s.name == "Fresh Water Level").unwrap();
        assert_eq!(level.semantic, SemanticType::Measurement);
        assert_eq!(level.unit, None);

        let firmware = specs
            .iter()
            .find(|s| s.name == "Cp Software Version Number")
            .unwrap();
        assert_eq!(firmware.semantic, SemanticType::Text);
        assert_eq!(firmware.category, EntityCategory::Diagnostic);
    }

    #[test]
    fn discovery_only_covers_enabled_sections() {
        let specs = discover_can_entities(&sample_can(), &sections(&["levels2"]));
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "Fresh Water Level");
    }

    #[test]
    fn derived_power_prefers_measured_voltage() {
        let snapshot = TelemetrySnapshot {
            customer_data: json!({}),
            can_bus_data: sample_can(),
        };
        let battery = static_entities()
            .into_iter()
            .find(|s| s.name == "Battery Power")
            .unwrap();
        // 2.0 A * 13.2 V measured
        assert_eq!(resolve_value(&battery, &snapshot), Some(json!(26.4)));
    }

    #[test]
    fn derived_power_falls_back_to_nominal_voltage() {
        let snapshot = TelemetrySnapshot {
            customer_data: json!({}),
            can_bus_data: json!({"levels3": {"solarAmps": 2.0}}),
        };
        let solar = static_entities()
            .into_iter()
            .find(|s| s.name == "Solar Power")
            .unwrap();
        // 2.0 A * 18.0 V nominal
        assert_eq!(resolve_value(&solar, &snapshot), Some(json!(36.0)));
    }

    #[test]
    fn static_sensor_resolution() {
        let snapshot = TelemetrySnapshot {
            customer_data: json!({
                "vehicles": [{
                    "chassisNumber": "CH123",
                    "model": {"brandName": "Swift", "name": "Kon-Tiki", "year": 2022},
                    "lastPosition": {"latitude": 53.2, "longitude": -1.4, "leisureVoltage": 12.8}
                }]
            }),
            can_bus_data: json!({}),
        };

        let specs = static_entities();
        let chassis = specs.iter().find(|s| s.name == "Chassis Number").unwrap();
        assert_eq!(resolve_value(chassis, &snapshot), Some(json!("CH123")));

        let voltage = specs.iter().find(|s| s.name == "Leisure Voltage").unwrap();
        assert_eq!(resolve_value(voltage, &snapshot), Some(json!(12.8)));

        let location = specs.iter().find(|s| s.name == "Vehicle Location").unwrap();
        let position = resolve_value(location, &snapshot).unwrap();
        assert_eq!(position.get("latitude"), Some(&json!(53.2)));
    }

    #[test]
    fn toggle_specs_share_the_can_endpoint() {
        let specs = static_entities();
        for spec in specs.iter().filter(|s| s.command.is_some()) {
            let command = spec.command.as_ref().unwrap();
            assert_eq!(command.endpoint, CAN_TOGGLE_ENDPOINT);
            assert_eq!(command.payload.len(), 8);
        }
        let lights = specs
            .iter()
            .filter(|s| s.kind == EntityKind::Light)
            .count();
        assert_eq!(lights, 4);
    }

    #[test]
    fn humanize_key_splits_camel_case() {
        assert_eq!(humanize_key("batteryAmp"), "Battery Amp");
        assert_eq!(humanize_key("psuSoftwareNumber"), "PSU Software Number");
        assert_eq!(humanize_key("fresh_water_level"), "Fresh Water Level");
        assert_eq!(humanize_key("acPresent"), "Ac Present");
    }

    #[test]
    fn unique_suffix_strips_can_root() {
        let spec = EntitySpec::sensor(
            "Battery Amp",
            vec![key("can_bus_data"), key("levels3"), key("batteryAmp")],
            SemanticType::Current,
            Some("A"),
            EntityCategory::Primary,
        );
        assert_eq!(spec.unique_suffix(), "levels3_batteryamp");
    }
}
