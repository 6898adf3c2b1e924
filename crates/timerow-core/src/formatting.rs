//! Decimal parsing and value formatting.

/// Parse a decimal that may use `,` or `.` as the fractional separator.
///
/// Returns `None` for empty or unparseable input. Range checks are left to
/// [`crate::models::Reading::new`].
pub fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok()
}

/// Shortest decimal text that parses back to exactly `value`.
///
/// Whole numbers keep a trailing `.0` so the column stays visibly fractional.
pub fn format_value(value: f64) -> String {
    format!("{:?}", value)
}

/// Format a concentration for display with one decimal place.
pub fn format_concentration(value: f64) -> String {
    format!("{:.1} mmol/L", value)
}
