//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, poll interval, timeouts)
//! - Check that configured queue names are usable directory names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BrokerConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::BrokerConfig;
use crate::storage::QueueName;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &BrokerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.daemon.port == 0 {
        errors.push(ValidationError::new("daemon.port", "must be between 1 and 65535"));
    }
    if config.daemon.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("daemon.bind_host", "must not be empty"));
    }
    if config.daemon.poll_interval_ms == 0 {
        errors.push(ValidationError::new("daemon.poll_interval_ms", "must be greater than 0"));
    }
    if config.storage.data_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("storage.data_dir", "must not be empty"));
    }
    for queue in &config.storage.queues {
        if let Err(e) = QueueName::parse(queue) {
            errors.push(ValidationError::new("storage.queues", e.to_string()));
        }
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }
    if config.observability.metrics_enabled && config.observability.metrics_socket_addr().is_none() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
