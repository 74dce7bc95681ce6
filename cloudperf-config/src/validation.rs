//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate that a value lies within an inclusive range
pub fn validate_range<T>(value: T, min: T, max: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!(
                "{} must be between {} and {}, got {}",
                field_name, min, max, value
            ),
        });
    }
    Ok(())
}

/// Validate an http(s) URL with a host
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ConfigError::DomainError {
                domain: domain.to_string(),
                message: format!("{} scheme '{}' is not supported (only http/https)", field_name, scheme),
            })
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must have a valid host", field_name),
        });
    }

    Ok(())
}
