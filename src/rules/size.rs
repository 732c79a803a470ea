//! Human-readable sizes ("100MB", "1.5 GiB", "512") with base-1024 units.
//!
//! The same parser runs when a rule is authored and when it is evaluated, so
//! what the user typed and what gets matched cannot drift apart.

const UNITS: &[(&str, u32)] = &[
    ("", 0),
    ("b", 0),
    ("k", 1),
    ("kb", 1),
    ("kib", 1),
    ("m", 2),
    ("mb", 2),
    ("mib", 2),
    ("g", 3),
    ("gb", 3),
    ("gib", 3),
    ("t", 4),
    ("tb", 4),
    ("tib", 4),
];

/// Parse a size into bytes. Unknown units, negative or non-finite numbers
/// yield `None`.
pub fn parse_size(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return None;
    }

    let unit = unit.trim().to_ascii_lowercase();
    let exponent = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, exp)| *exp)?;

    let multiplier = 1024u64.checked_pow(exponent)?;
    if !number.contains('.') {
        return number.parse::<u64>().ok()?.checked_mul(multiplier);
    }

    let value: f64 = number.parse().ok()?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes.round() as u64)
}

/// Render bytes with the largest whole base-1024 unit.
pub fn format_size(bytes: u64) -> String {
    const NAMES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut index = 0;
    while value >= 1024.0 && index < NAMES.len() - 1 {
        value /= 1024.0;
        index += 1;
    }
    if index == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, NAMES[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units_with_base_1024() {
        assert_eq!(parse_size("512"), Some(512));
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("100MB"), Some(100 * 1024 * 1024));
        assert_eq!(parse_size("2 gib"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("1.5K"), Some(1536));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("MB"), None);
        assert_eq!(parse_size("-5MB"), None);
        assert_eq!(parse_size("10 parsecs"), None);
        assert_eq!(parse_size("1.2.3"), None);
        assert_eq!(parse_size("99999999999999999999TB"), None);
    }

    #[test]
    fn formats_round_numbers() {
        assert_eq!(format_size(10), "10 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100.0 MB");
    }
}
