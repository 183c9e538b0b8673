use serde_json::Value;
use std::collections::BTreeMap;

pub type MetricMap = BTreeMap<String, Value>;

/// Flat current-value view of every device: device id -> metric -> value.
pub type DeviceSnapshot = BTreeMap<String, MetricMap>;

/// `{"value": v}` wrappers collapse to `v`; anything else is kept as-is.
pub fn unwrap_reading(reading: &Value) -> Value {
    match reading {
        Value::Object(fields) => match fields.get("value") {
            Some(inner) => inner.clone(),
            None => reading.clone(),
        },
        other => other.clone(),
    }
}

/// Normalizes one device measurement into a flat metric map.
///
/// A nested object under `measurements` takes precedence over the
/// measurement's own top-level keys. Non-object measurements flatten to an
/// empty map.
pub fn flatten_measurement(measurement: &Value) -> MetricMap {
    let Value::Object(fields) = measurement else {
        return MetricMap::new();
    };
    let source = match fields.get("measurements") {
        Some(Value::Object(inner)) => inner,
        _ => fields,
    };
    source
        .iter()
        .map(|(metric, reading)| (metric.clone(), unwrap_reading(reading)))
        .collect()
}

/// Builds a snapshot from a `devices.poll` result (`{"updates": [...]}`).
/// Updates without a string id are skipped; a repeated id keeps the last update.
pub fn flatten_poll(result: &Value) -> DeviceSnapshot {
    let mut snapshot = DeviceSnapshot::new();
    let Some(updates) = result.get("updates").and_then(Value::as_array) else {
        return snapshot;
    };
    for update in updates {
        let Some(device_id) = update.get("id").and_then(Value::as_str) else {
            continue;
        };
        let flat = update
            .get("measurement")
            .map(flatten_measurement)
            .unwrap_or_default();
        snapshot.insert(device_id.to_string(), flat);
    }
    snapshot
}

/// Numeric view of a metric value: numbers, booleans (1/0) and numeric
/// strings convert; everything else is not a usable number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn metric_number(snapshot: &DeviceSnapshot, device_id: &str, metric: &str) -> Option<f64> {
    snapshot
        .get(device_id)
        .and_then(|metrics| metrics.get(metric))
        .and_then(as_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_measurements_are_unwrapped() {
        let poll = json!({"updates": [
            {"id": "d1", "measurement": {"measurements": {"m": {"value": 3}}}}
        ]});
        let snapshot = flatten_poll(&poll);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["d1"]["m"], json!(3));
    }

    #[test]
    fn top_level_measurement_keys_are_used_directly() {
        let poll = json!({"updates": [{"id": "d2", "measurement": {"m": 5}}]});
        let snapshot = flatten_poll(&poll);
        assert_eq!(
            serde_json::to_value(&snapshot).expect("encode"),
            json!({"d2": {"m": 5}})
        );
    }

    #[test]
    fn top_level_wrappers_are_unwrapped_too() {
        let flat = flatten_measurement(&json!({
            "pressure_kPa": {"value": 40.5, "unit": "kPa"},
            "sealed": true
        }));
        assert_eq!(flat["pressure_kPa"], json!(40.5));
        assert_eq!(flat["sealed"], json!(true));
    }

    #[test]
    fn non_object_measurements_key_falls_back_to_top_level() {
        let flat = flatten_measurement(&json!({"measurements": [1, 2], "t": 1}));
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["measurements"], json!([1, 2]));
    }

    #[test]
    fn irregular_updates_are_tolerated() {
        let poll = json!({"updates": [
            {"id": 4, "measurement": {"m": 1}},
            {"measurement": {"m": 1}},
            {"id": "d3", "measurement": "offline"},
            {"id": "d4"}
        ]});
        let snapshot = flatten_poll(&poll);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot["d3"].is_empty());
        assert!(snapshot["d4"].is_empty());
        assert!(flatten_poll(&json!({})).is_empty());
        assert!(flatten_poll(&json!([1])).is_empty());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(as_number(&json!(2)), Some(2.0));
        assert_eq!(as_number(&json!(true)), Some(1.0));
        assert_eq!(as_number(&json!(" 4.25 ")), Some(4.25));
        assert_eq!(as_number(&json!("warm")), None);
        assert_eq!(as_number(&json!(null)), None);
        assert_eq!(as_number(&json!({"value": 1})), None);
    }

    #[test]
    fn metric_lookup_goes_through_coercion() {
        let snapshot = flatten_poll(&json!({"updates": [
            {"id": "press0", "measurement": {"measurements": {"pressure_kPa": {"value": "39.9"}}}}
        ]}));
        assert_eq!(metric_number(&snapshot, "press0", "pressure_kPa"), Some(39.9));
        assert_eq!(metric_number(&snapshot, "press0", "temperature_K"), None);
        assert_eq!(metric_number(&snapshot, "press1", "pressure_kPa"), None);
    }
}
