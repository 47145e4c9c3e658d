//! Human-readable byte counts for log lines

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
const STEP: f64 = 1024.0;

/// Render a byte count with the largest base-1024 unit that keeps the value >= 1.
///
/// Plain byte counts have no fractional part and no space (`"0B"`, `"512B"`);
/// larger units are rounded to two decimals (`"1.5 KB"`). PB is the largest unit.
pub fn humanize(size_bytes: u64) -> String {
    if size_bytes < 1024 {
        return format!("{size_bytes}{}", UNITS[0]);
    }

    let mut unit = 0;
    let mut value = size_bytes as f64;
    while value >= STEP && unit < UNITS.len() - 1 {
        value /= STEP;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    // `{:?}` keeps the trailing `.0` on whole values
    format!("{rounded:?} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn byte_counts() {
        assert_eq!(humanize(0), "0B");
        assert_eq!(humanize(1), "1B");
        assert_eq!(humanize(1023), "1023B");
    }

    #[test]
    fn scaled_units() {
        let cases = [
            (1024, "1.0 KB"),
            (1536, "1.5 KB"),
            (1024 * 1024, "1.0 MB"),
            (1_294_967, "1.23 MB"),
            (3 * 1024 * 1024 * 1024, "3.0 GB"),
            (1024u64.pow(4), "1.0 TB"),
            (1024u64.pow(5), "1.0 PB"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(humanize(bytes), expected, "bytes = {bytes}");
        }
    }

    #[test]
    fn rounding_can_reach_the_next_integer() {
        assert_eq!(humanize(1024 * 1024 - 1), "1024.0 KB");
    }

    #[test]
    fn petabytes_are_the_ceiling() {
        assert_eq!(humanize(2048 * 1024u64.pow(5)), "2048.0 PB");
    }
}
