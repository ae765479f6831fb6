//! Virtual-time rendering.

/// Render `seconds` of virtual time as `HH:MM:SS.mmm`.
///
/// Hours wrap at 24 like a wall clock. The value is rounded to the
/// microsecond first and then truncated to the millisecond, so `1.001`
/// renders as `00:00:01.001` despite its binary representation.
/// Negative or non-finite input renders as midnight.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_hms(seconds: f64) -> String {
    let micros = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1_000_000.0).round() as u64
    } else {
        0
    };
    let millis = micros / 1_000;
    let ms = millis % 1_000;
    let total_secs = millis / 1_000;
    let (h, m, s) = ((total_secs / 3_600) % 24, (total_secs / 60) % 60, total_secs % 60);
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}
