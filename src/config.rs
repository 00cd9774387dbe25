//! Environment Configuration
//!
//! Configuration structs carry sensible defaults and are overlaid with
//! `EMBERLANDS_*` environment variables by their `from_env` constructors.

use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// Read and parse an optional environment variable.
pub fn env_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_missing_is_none() {
        let value: Option<u32> = env_var("EMBERLANDS_TEST_SURELY_UNSET").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_env_var_parse_error() {
        std::env::set_var("EMBERLANDS_TEST_BAD_NUMBER", "twelve");
        let result: Result<Option<u32>, _> = env_var("EMBERLANDS_TEST_BAD_NUMBER");
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: "EMBERLANDS_TEST_BAD_NUMBER", .. })));
        std::env::remove_var("EMBERLANDS_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_env_var_trims() {
        std::env::set_var("EMBERLANDS_TEST_PADDED", " 42 ");
        let value: Option<u32> = env_var("EMBERLANDS_TEST_PADDED").unwrap();
        assert_eq!(value, Some(42));
        std::env::remove_var("EMBERLANDS_TEST_PADDED");
    }
}
