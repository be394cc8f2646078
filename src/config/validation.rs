//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts, buffer sizes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the parsed config
//! - Runs before the config is accepted into the system

use crate::config::schema::ViewlinkConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Why the value was rejected.
    pub message: &'static str,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check semantic constraints on a parsed configuration.
pub fn validate_config(config: &ViewlinkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let transport = &config.transport;

    if transport.port == 0 {
        errors.push(ValidationError {
            field: "transport.port",
            message: "must be nonzero",
        });
    }
    if transport.handshake_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "transport.handshake_timeout_secs",
            message: "must be greater than zero",
        });
    }
    if transport.write_poll_interval_ms == 0 {
        errors.push(ValidationError {
            field: "transport.write_poll_interval_ms",
            message: "must be greater than zero",
        });
    }
    if transport.initial_buffer_capacity == 0 {
        errors.push(ValidationError {
            field: "transport.initial_buffer_capacity",
            message: "must be greater than zero",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
