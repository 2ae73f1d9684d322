//! Shared value helpers for Landau
//!
//! Small pure functions for walking vendor JSON payloads and deriving
//! display values from them.

use serde_json::Value;
use tracing::debug;

/// One step of a path into a nested JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// Build an object-key path step
pub fn key(k: &str) -> PathStep {
    PathStep::Key(k.to_string())
}

/// Build an array-index path step
pub fn index(i: usize) -> PathStep {
    PathStep::Index(i)
}

impl std::fmt::Display for PathStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathStep::Key(k) => write!(f, "{}", k),
            PathStep::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Format a path for logs and unique ids
pub fn path_to_string(path: &[PathStep]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Safely get a nested value from a JSON payload by walking `path`.
///
/// A missing key, an out-of-bounds index, or a step applied to a scalar
/// yields `None`.
pub fn get_nested_value<'a>(data: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    let mut current = data;
    for (level, step) in path.iter().enumerate() {
        let next = match step {
            PathStep::Key(k) => current.as_object().and_then(|o| o.get(k.as_str())),
            PathStep::Index(i) => current.as_array().and_then(|a| a.get(*i)),
        };
        match next {
            Some(v) => current = v,
            None => {
                debug!(
                    "Path not found in data: missing step '{}' at level {} for full path {}",
                    step,
                    level,
                    path_to_string(path)
                );
                return None;
            }
        }
    }
    Some(current)
}

/// Calculate power (W) given current and a measured-or-default voltage.
///
/// - If `measured_volts` is present it is used; otherwise `default_volts`.
/// - If `amps` is `None`, returns `None`.
/// - When `absolute` is true, the absolute value of current is used (useful
///   for battery charge/discharge).
///
/// The result is rounded to one decimal place.
pub fn calculate_power_watts(
    amps: Option<f64>,
    measured_volts: Option<f64>,
    default_volts: f64,
    absolute: bool,
) -> Option<f64> {
    let amps = amps?;
    let volts = measured_volts.unwrap_or(default_volts);
    let amps = if absolute { amps.abs() } else { amps };
    let watts = amps * volts;
    if !watts.is_finite() {
        return None;
    }
    Some((watts * 10.0).round() / 10.0)
}

/// Coerce a JSON value to f64. Accepts numbers or strings like "2.8A" or
/// "240 V".
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => extract_number(s),
        _ => None,
    }
}

/// Pull the first numeric token out of a string, ignoring thousands commas
fn extract_number(s: &str) -> Option<f64> {
    let cleaned = s.replace(',', "");
    let chars: Vec<char> = cleaned.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let starts_number = chars[i].is_ascii_digit()
            || (matches!(chars[i], '+' | '-' | '.')
                && chars
                    .get(i + 1)
                    .is_some_and(|c| c.is_ascii_digit() || *c == '.'));
        if !starts_number {
            i += 1;
            continue;
        }

        let mut j = i;
        let mut seen_digit = false;
        let mut seen_dot = false;
        let mut seen_exp = false;
        while j < chars.len() {
            let c = chars[j];
            if c.is_ascii_digit() {
                seen_digit = true;
                j += 1;
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                j += 1;
            } else if matches!(c, '+' | '-') && j == i {
                j += 1;
            } else if matches!(c, 'e' | 'E')
                && seen_digit
                && !seen_exp
                && chars
                    .get(j + 1)
                    .is_some_and(|n| n.is_ascii_digit() || matches!(n, '+' | '-'))
            {
                seen_exp = true;
                j += 1;
                if matches!(chars.get(j), Some('+') | Some('-')) {
                    j += 1;
                }
            } else {
                break;
            }
        }

        if seen_digit {
            let token: String = chars[i..j].iter().collect();
            if let Ok(v) = token.parse::<f64>() {
                return Some(v);
            }
        }
        i = j.max(i + 1);
    }
    None
}

/// Flatten nested objects/arrays into `a.b[0].c` keyed leaves for
/// diagnostics and overview attributes.
pub fn flatten_json(value: &Value) -> Vec<(String, Value)> {
    let mut flat = Vec::new();
    walk_flatten(value, String::new(), &mut flat);
    flat
}

fn walk_flatten(value: &Value, prefix: String, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let next = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                walk_flatten(v, next, out);
            }
        }
        Value::Array(items) => {
            for (idx, v) in items.iter().enumerate() {
                walk_flatten(v, format!("{}[{}]", prefix, idx), out);
            }
        }
        _ => out.push((prefix, value.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_lookup_walks_objects_and_arrays() {
        let data = json!({"a": {"b": [{"c": 1}]}});
        let found = get_nested_value(&data, &[key("a"), key("b"), index(0), key("c")]);
        assert_eq!(found, Some(&json!(1)));
    }

    #[test]
    fn nested_lookup_missing_key_is_none() {
        let data = json!({"a": {"b": [{"c": 1}]}});
        assert_eq!(get_nested_value(&data, &[key("a"), key("x")]), None);
        assert_eq!(get_nested_value(&data, &[key("a"), key("b"), index(3)]), None);
        assert_eq!(
            get_nested_value(&data, &[key("a"), key("b"), index(0), key("c"), key("d")]),
            None
        );
    }

    #[test]
    fn power_watts_uses_default_voltage() {
        assert_eq!(calculate_power_watts(Some(2.0), None, 12.0, true), Some(24.0));
    }

    #[test]
    fn power_watts_prefers_measured_voltage() {
        assert_eq!(
            calculate_power_watts(Some(2.0), Some(13.2), 12.0, true),
            Some(26.4)
        );
    }

    #[test]
    fn power_watts_without_current_is_none() {
        assert_eq!(calculate_power_watts(None, Some(13.2), 12.0, true), None);
    }

    #[test]
    fn power_watts_absolute_flag() {
        assert_eq!(calculate_power_watts(Some(-3.0), None, 12.0, true), Some(36.0));
        assert_eq!(
            calculate_power_watts(Some(-3.0), None, 12.0, false),
            Some(-36.0)
        );
    }

    #[test]
    fn value_coercion_accepts_units() {
        assert_eq!(value_to_f64(&json!(2.5)), Some(2.5));
        assert_eq!(value_to_f64(&json!("2.8A")), Some(2.8));
        assert_eq!(value_to_f64(&json!("240 V")), Some(240.0));
        assert_eq!(value_to_f64(&json!("1,250 W")), Some(1250.0));
        assert_eq!(value_to_f64(&json!("-12.5")), Some(-12.5));
        assert_eq!(value_to_f64(&json!("no reading")), None);
        assert_eq!(value_to_f64(&json!(true)), None);
    }

    #[test]
    fn flatten_builds_dotted_keys() {
        let data = json!({"a": {"b": [{"c": 1}, 2]}, "d": "x"});
        let flat = flatten_json(&data);
        assert!(flat.contains(&("a.b[0].c".to_string(), json!(1))));
        assert!(flat.contains(&("a.b[1]".to_string(), json!(2))));
        assert!(flat.contains(&("d".to_string(), json!("x"))));
        assert_eq!(flat.len(), 3);
    }
}
