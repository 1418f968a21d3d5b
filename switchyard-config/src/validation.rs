// Configuration validation

use crate::{ConfigError, Result};
use switchyard_core::{AntPathMatcher, DispatcherConfig};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Common validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that `pattern` is a well-formed path pattern
    pub fn is_path_pattern(pattern: &str, matcher: &AntPathMatcher, field: &str) -> Result<()> {
        Self::not_empty(pattern, field)?;
        matcher.validate(pattern).map_err(|e| {
            ConfigError::ValidationError(format!("{} has an invalid pattern '{}': {}", field, pattern, e))
        })
    }
}

/// Longest flash map lifetime accepted, one day.
const MAX_FLASH_TIMEOUT_SECS: u64 = 86_400;

impl Validate for DispatcherConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::in_range(
            self.flash_map_timeout_secs,
            1,
            MAX_FLASH_TIMEOUT_SECS,
            "dispatcher.flash_map_timeout_secs",
        )
    }
}
