//! Small numeric helpers shared by planning and progress logging.

/// `a` lies within `tolerance` (a fraction of `b`) of `b`.
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    a >= b * (1.0 - tolerance) && a <= b * (1.0 + tolerance)
}

/// Render milliseconds as `1h2m3s 45ms`. Zero components are omitted,
/// except the trailing milliseconds.
pub fn format_duration(ms: f64) -> String {
    let mut rest = ms.max(0.0).round() as u64;
    let hours = rest / 3_600_000;
    rest %= 3_600_000;
    let minutes = rest / 60_000;
    rest %= 60_000;
    let seconds = rest / 1000;
    let millis = rest % 1000;

    let mut out = String::new();
    if hours != 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes != 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds != 0 {
        out.push_str(&format!("{seconds}s "));
    }
    out.push_str(&format!("{millis}ms"));
    out
}
