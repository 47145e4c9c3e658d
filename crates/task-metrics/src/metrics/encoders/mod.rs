pub mod influx;
pub mod json;

/// Trait for encoding a single gauge reading into a log line
pub trait GaugeEncoder: Send + Sync {
    /// Encode `value` for metric `name` observed at `timestamp` (ms since epoch)
    fn encode_gauge(&self, name: &str, value: f64, timestamp: i64) -> String;
}

/// Factory function to create encoders based on format string
pub fn create_encoder(format: &str) -> Box<dyn GaugeEncoder> {
    match format.to_lowercase().as_str() {
        "json" => Box::new(json::JsonEncoder::new()),
        _ => Box::new(influx::InfluxEncoder::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_encoder_by_format() {
        let json = create_encoder("JSON").encode_gauge("m", 1.0, 1);
        assert!(json.starts_with('{'));

        let influx = create_encoder("influx").encode_gauge("m", 1.0, 1);
        assert!(influx.starts_with("m "));

        // unknown formats fall back to influx
        let fallback = create_encoder("otel").encode_gauge("m", 1.0, 1);
        assert!(fallback.starts_with("m "));
    }
}
