//! Clock formatting for time updates

use serde::Serialize;

/// Payload of the outbound `updateTime` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeUpdate {
    /// Elapsed time, "MM:SS"
    pub duration: String,
    /// Total time, "MM:SS"
    pub total: String,
}

/// Format seconds as zero-padded "MM:SS"
///
/// Minutes are not wrapped into hours. Fractions are truncated and negative
/// values read as zero. Returns `None` for NaN or infinite input.
pub fn format_clock(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.max(0.0) as u64;
    Some(format!("{:02}:{:02}", whole / 60, whole % 60))
}

/// Build a time update, or `None` while the total duration is unknown
pub fn time_update(current: f64, total: f64) -> Option<TimeUpdate> {
    let total_str = format_clock(total)?;
    let current = if current.is_finite() { current.min(total) } else { 0.0 };
    Some(TimeUpdate {
        duration: format_clock(current)?,
        total: total_str,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0).as_deref(), Some("00:00"));
        assert_eq!(format_clock(5.9).as_deref(), Some("00:05"));
        assert_eq!(format_clock(61.0).as_deref(), Some("01:01"));
        assert_eq!(format_clock(4503.0).as_deref(), Some("75:03"));
        assert_eq!(format_clock(-3.0).as_deref(), Some("00:00"));
    }

    #[test]
    fn test_non_finite_is_none() {
        assert!(format_clock(f64::NAN).is_none());
        assert!(format_clock(f64::INFINITY).is_none());
    }

    #[test]
    fn test_time_update() {
        let update = time_update(65.2, 300.0).unwrap();
        assert_eq!(update.duration, "01:05");
        assert_eq!(update.total, "05:00");

        assert!(time_update(10.0, f64::NAN).is_none());
        assert_eq!(time_update(f64::NAN, 60.0).unwrap().duration, "00:00");
    }
}
