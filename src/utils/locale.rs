// src/utils/locale.rs

//! German number formatting used by the portal and in messages.
//!
//! The portal prints decimals with a comma separator (`"2,35"`). Parsing and
//! formatting are done here explicitly and never depend on the process locale.

/// Parse a comma-decimal number such as `"2,35"` or `"4"`.
///
/// Returns `None` for empty, unparsable or non-finite text.
pub fn parse_locale_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a digits-only integer cell (final grades). Anything else is absent.
pub fn parse_digits(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// Format an average with two decimals and a decimal comma: `10.5` → `"10,50"`.
pub fn format_average(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locale_decimal() {
        assert_eq!(parse_locale_decimal("2,35"), Some(2.35));
        assert_eq!(parse_locale_decimal(" 4 "), Some(4.0));
        assert_eq!(parse_locale_decimal("1.5"), Some(1.5));
        assert_eq!(parse_locale_decimal(""), None);
        assert_eq!(parse_locale_decimal("n.b."), None);
        assert_eq!(parse_locale_decimal("inf"), None);
    }

    #[test]
    fn test_parse_digits() {
        assert_eq!(parse_digits("2"), Some(2));
        assert_eq!(parse_digits(" 15 "), Some(15));
        assert_eq!(parse_digits("2-"), None);
        assert_eq!(parse_digits("2,0"), None);
        assert_eq!(parse_digits(""), None);
    }

    #[test]
    fn test_format_average() {
        assert_eq!(format_average(10.5), "10,50");
        assert_eq!(format_average(2.0), "2,00");
        assert_eq!(format_average(1.256), "1,26");
    }
}
