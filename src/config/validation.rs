//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, known log level)
//!
//! Backend-specific checks stay with each connector's `connect`, where a
//! failure becomes that connector's construction error instead of aborting
//! the whole process.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BootstrapConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::BootstrapConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check process-level settings.
pub fn validate_config(config: &BootstrapConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new("health_check.interval_secs", "must be > 0"));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::new("health_check.timeout_secs", "must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BootstrapConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = BootstrapConfig::default();
        config.observability.log_level = "loud".into();
        config.health_check.interval_secs = 0;
        config.health_check.timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].field, "observability.log_level");
    }

    #[test]
    fn test_disabled_health_check_skips_interval() {
        let mut config = BootstrapConfig::default();
        config.health_check.enabled = false;
        config.health_check.interval_secs = 0;
        assert!(validate_config(&config).is_ok());
    }
}
