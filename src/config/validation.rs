//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (size caps ordered, timeouts > 0)
//! - Check addresses, allow-list patterns and record URLs parse
//! - Detect duplicate record ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::security::allow_list::HostPattern;

/// One semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    let fetch = &config.fetch;
    if fetch.min_max_bytes == 0 {
        errors.push(ValidationError::new("fetch.min_max_bytes", "must be greater than 0"));
    }
    if fetch.min_max_bytes > fetch.max_max_bytes {
        errors.push(ValidationError::new(
            "fetch.min_max_bytes",
            "must not exceed fetch.max_max_bytes",
        ));
    }
    if fetch.default_max_bytes < fetch.min_max_bytes
        || fetch.default_max_bytes > fetch.max_max_bytes
    {
        errors.push(ValidationError::new(
            "fetch.default_max_bytes",
            "must lie between fetch.min_max_bytes and fetch.max_max_bytes",
        ));
    }
    if fetch.timeout_secs == 0 {
        errors.push(ValidationError::new("fetch.timeout_secs", "must be greater than 0"));
    }
    if fetch.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("fetch.user_agent", "must not be empty"));
    }

    for (i, pattern) in config.allow_list.hosts.iter().enumerate() {
        if let Err(message) = HostPattern::parse(pattern) {
            errors.push(ValidationError::new(format!("allow_list.hosts[{i}]"), message));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if let Some(token) = &config.auth.bearer_token {
        if token.trim().is_empty() {
            errors.push(ValidationError::new(
                "auth.bearer_token",
                "must not be empty (omit it to disable auth)",
            ));
        }
    }

    let mut seen = HashSet::new();
    for (i, record) in config.records.iter().enumerate() {
        if record.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("records[{i}].id"), "must not be empty"));
        } else if !seen.insert(record.id.as_str()) {
            errors.push(ValidationError::new(
                format!("records[{i}].id"),
                format!("duplicate id '{}'", record.id),
            ));
        }
        if url::Url::parse(&record.url).is_err() {
            errors.push(ValidationError::new(
                format!("records[{i}].url"),
                "is not a valid URL",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
