//! Utility functions and helpers.

pub mod http;
pub mod locale;

pub use http::{create_api_client, create_session_client};
pub use locale::{format_average, parse_digits, parse_locale_decimal};

/// Turn a display name into a file-name-safe token.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Mask a secret for log output (at most eight stars).
pub fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count().min(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("Max Müller"), "Max_M_ller");
        assert_eq!(safe_file_name("anna-lena_2"), "anna-lena_2");
        assert_eq!(safe_file_name("a/b.c"), "a_b_c");
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask("a-very-long-password"), "********");
    }
}
