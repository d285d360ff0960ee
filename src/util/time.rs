//! Duration, rate and size formatting for run reports

use std::time::Duration;

const DECIMAL_UNITS: &[(f64, &str)] = &[(1e6, "M"), (1e3, "K")];

const BINARY_UNITS: &[(f64, &str)] = &[
    (1024.0 * 1024.0 * 1024.0 * 1024.0, " TB"),
    (1024.0 * 1024.0 * 1024.0, " GB"),
    (1024.0 * 1024.0, " MB"),
    (1024.0, " KB"),
];

/// Scale `value` by the largest unit it reaches, with two decimals
fn scaled(value: f64, units: &[(f64, &str)]) -> Option<String> {
    units
        .iter()
        .find(|(factor, _)| value >= *factor)
        .map(|(factor, suffix)| format!("{:.2}{}", value / factor, suffix))
}

/// Format a duration with the coarsest unit that keeps it above 1
///
/// ```
/// use std::time::Duration;
/// use f1plot::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    let units = [(1_000_000_000u128, "s"), (1_000_000, "ms"), (1_000, "us")];

    units
        .iter()
        .find(|(factor, _)| nanos >= *factor)
        .map(|(factor, suffix)| format!("{:.2}{}", nanos as f64 / *factor as f64, suffix))
        .unwrap_or_else(|| format!("{}ns", nanos))
}

/// Format an entry rate (entries per second)
///
/// ```
/// use f1plot::util::time::format_rate;
///
/// assert_eq!(format_rate(500.0), "500");
/// assert_eq!(format_rate(2_500_000.0), "2.50M");
/// ```
pub fn format_rate(rate: f64) -> String {
    scaled(rate, DECIMAL_UNITS).unwrap_or_else(|| format!("{:.0}", rate))
}

/// Per-second rate of `count` over `duration` (0 for a zero duration)
pub fn calculate_rate(count: u64, duration: Duration) -> f64 {
    match duration.as_secs_f64() {
        secs if secs > 0.0 => count as f64 / secs,
        _ => 0.0,
    }
}

/// Format bytes per second
pub fn format_throughput(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_sec))
}

/// Format a byte count with binary units
///
/// ```
/// use f1plot::util::time::format_bytes;
///
/// assert_eq!(format_bytes(512), "512.00 B");
/// assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    format_bytes_f64(bytes as f64)
}

fn format_bytes_f64(bytes: f64) -> String {
    scaled(bytes, BINARY_UNITS).unwrap_or_else(|| format!("{:.2} B", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50us");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn test_format_rate_caps_at_millions() {
        assert_eq!(format_rate(999.0), "999");
        assert_eq!(format_rate(1500.0), "1.50K");
        assert_eq!(format_rate(4_294_967_296.0), "4294.97M");
    }

    #[test]
    fn test_calculate_rate() {
        assert_eq!(calculate_rate(1000, Duration::from_secs(10)), 100.0);
        assert_eq!(calculate_rate(1000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_table_sizes() {
        // y and x arrays of a k=32 table
        assert_eq!(format_bytes(2 * 4 << 32), "32.00 GB");
        assert_eq!(format_throughput(1536.0), "1.50 KB/s");
    }
}
