//! Timestamp sources shared by the WAL, checkpoint and metadata layers.

use chrono::Utc;

/// Wall-clock nanoseconds since the unix epoch.
///
/// Saturates at `i64::MAX` far past any plausible deployment horizon.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Wall-clock time as an RFC3339 string with second precision.
///
/// Format: YYYY-MM-DDTHH:MM:SSZ
pub(crate) fn now_rfc3339() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_are_monotonic_enough() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
    }

    #[test]
    fn rfc3339_shape() {
        let ts = now_rfc3339();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
    }
}
