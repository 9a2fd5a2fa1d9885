//! Human-readable time formatting
//!
//! Countdown and elapsed displays use a clock-style format that grows with
//! the magnitude of the value.

/// Format whole seconds as `M:SS`, or `H:MM:SS` from one hour up.
///
/// # Examples
///
/// ```
/// use nocturne_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0), "0:00");
/// assert_eq!(format_clock(75), "1:15");
/// assert_eq!(format_clock(3600), "1:00:00");
/// assert_eq!(format_clock(5430), "1:30:30");
/// ```
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Format a fractional duration in seconds for log lines (`2.50s`).
pub fn format_seconds(seconds: f64) -> String {
    if seconds.is_finite() {
        format!("{:.2}s", seconds)
    } else {
        "--".to_string()
    }
}

/// Convert a timer selection in minutes to whole seconds, rounding up so a
/// partial second still counts down.
///
/// Non-finite or negative selections yield zero.
///
/// ```
/// use nocturne_common::human_time::minutes_to_secs;
///
/// assert_eq!(minutes_to_secs(0.05), 3);
/// assert_eq!(minutes_to_secs(30.0), 1800);
/// assert_eq!(minutes_to_secs(-1.0), 0);
/// ```
pub fn minutes_to_secs(minutes: f64) -> u64 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    // Guard against 0.05 * 60 = 3.0000000000000004
    let secs = minutes * 60.0;
    let rounded = secs.round();
    if (secs - rounded).abs() < 1e-9 {
        rounded as u64
    } else {
        secs.ceil() as u64
    }
}
