use serde_json::json;

use super::GaugeEncoder;

/// JSON encoder for metrics
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeEncoder for JsonEncoder {
    fn encode_gauge(&self, name: &str, value: f64, timestamp: i64) -> String {
        let value = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);

        let metrics = json!({
            "measure": name,
            "ts": timestamp,
            "field": { "value": value },
        });
        metrics.to_string() + "\n"
    }
}
