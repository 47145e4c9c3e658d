use influxdb_line_protocol::LineProtocolBuilder;

use super::GaugeEncoder;

const VALUE_FIELD: &str = "value";

/// InfluxDB line protocol encoder
pub struct InfluxEncoder;

impl InfluxEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InfluxEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GaugeEncoder for InfluxEncoder {
    fn encode_gauge(&self, name: &str, value: f64, timestamp: i64) -> String {
        let line = LineProtocolBuilder::new()
            .measurement(name)
            .field(VALUE_FIELD, value)
            .timestamp(timestamp)
            .close_line()
            .build();

        String::from_utf8_lossy(&line).into_owned()
    }
}
