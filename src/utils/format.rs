use chrono::{DateTime, Local, Utc};

/// Format a UTC timestamp in local time as "YYYY-MM-DD HH:MM"
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Format a UTC timestamp's local calendar date
pub fn format_date(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Create a simple ASCII progress bar for a fill ratio; values outside
/// [0, 1] are clamped.
pub fn ratio_bar(ratio: f64, width: usize) -> String {
    let ratio = ratio.clamp(0.0, 1.0);
    let filled_count = (ratio * width as f64).round() as usize;
    let empty_count = width.saturating_sub(filled_count);
    format!("{}{}", "█".repeat(filled_count), "░".repeat(empty_count))
}

/// Four pips, one per Dan, filled up to `current`.
pub fn dan_pips(current: u8) -> String {
    (1..=4u8)
        .map(|d| if d <= current { "●" } else { "○" })
        .collect::<Vec<_>>()
        .join(" ")
}
