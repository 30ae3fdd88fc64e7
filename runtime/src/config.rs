//! Environment parsing shared by both services.
//!
//! Every helper reads through a lookup closure so configuration can be loaded
//! from the process environment or from a map in tests. Unset variables fall
//! back to their default; set but malformed variables are an error.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: '{value}'")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// Raw value of `key`, or `default` when unset.
#[must_use]
pub fn string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parse `key` with [`FromStr`], surrounding whitespace ignored.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the value does not parse.
pub fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Parse `key` as a boolean flag (`1/0`, `true/false`, `yes/no`, `on/off`).
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for any other value.
pub fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}

/// Parse `key` as a whole number of milliseconds.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the value is not a non-negative integer.
pub fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse(lookup, key, default).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(key: &'static str, value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |k| (k == key).then(|| value.to_string())
    }

    #[test]
    fn unset_falls_back_to_default() {
        let lookup = |_: &str| None;
        assert_eq!(parse(&lookup, "PORT", 3000_u16), Ok(3000));
        assert_eq!(flag(&lookup, "METRICS_ENABLED", true), Ok(true));
        assert_eq!(millis(&lookup, "TIMEOUT_MS", 250), Ok(Duration::from_millis(250)));
        assert_eq!(string(&lookup, "HOST", "0.0.0.0"), "0.0.0.0");
    }

    #[test]
    fn values_are_trimmed() {
        assert_eq!(parse(&only("PORT", " 8080 "), "PORT", 0_u16), Ok(8080));
        assert_eq!(flag(&only("ON", " Yes"), "ON", false), Ok(true));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        assert_eq!(
            millis(&only("TIMEOUT_MS", "-5"), "TIMEOUT_MS", 1),
            Err(ConfigError::Invalid {
                key: "TIMEOUT_MS",
                value: "-5".to_string()
            })
        );
        assert!(flag(&only("ON", "maybe"), "ON", false).is_err());
    }
}
