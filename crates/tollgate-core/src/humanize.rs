//! Compact rendering of durations for status labels ("don't ask for 2h 59m",
//! "active 5m ago").

use std::fmt::Write as _;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Render a duration using its two most significant units.
///
/// Sub-second remainders are dropped; anything under a second renders as `0s`.
///
/// ```
/// use std::time::Duration;
/// use tollgate_core::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(3 * 3600)), "3h");
/// assert_eq!(format_duration(Duration::from_secs(3 * 3600 - 60)), "2h 59m");
/// assert_eq!(format_duration(Duration::from_secs(45)), "45s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let units = [
        (secs / DAY, "d"),
        ((secs % DAY) / HOUR, "h"),
        ((secs % HOUR) / MINUTE, "m"),
        (secs % MINUTE, "s"),
    ];

    let Some(first) = units.iter().position(|(value, _)| *value > 0) else {
        return "0s".to_string();
    };

    let mut out = String::new();
    for (value, unit) in units.iter().skip(first).take(2) {
        if *value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let _ = write!(out, "{value}{unit}");
    }
    out
}
