use crate::catalog::RecordConvention;
use crate::config::types::{Config, EndpointConfig, HarvesterConfig, OutputConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Longest prefix depth accepted; deeper enumerations explode combinatorially
const MAX_SUPPORTED_DEPTH: usize = 4;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvester_config(&config.harvester)?;
    validate_endpoint_config(&config.endpoint)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates enumeration and pacing settings
fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    if config.alphabet.is_empty() {
        return Err(ConfigError::Validation(
            "alphabet cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for c in config.alphabet.chars() {
        if c.is_whitespace() {
            return Err(ConfigError::Validation(
                "alphabet cannot contain whitespace".to_string(),
            ));
        }
        if !seen.insert(c) {
            return Err(ConfigError::Validation(format!(
                "alphabet contains '{}' more than once",
                c
            )));
        }
    }

    if config.max_depth < 1 || config.max_depth > MAX_SUPPORTED_DEPTH {
        return Err(ConfigError::Validation(format!(
            "max_depth must be between 1 and {}, got {}",
            MAX_SUPPORTED_DEPTH, config.max_depth
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if config.final_pass_attempts < 1 {
        return Err(ConfigError::Validation(
            "final_pass_attempts must be >= 1".to_string(),
        ));
    }

    if config.max_consecutive_recoveries == Some(0) {
        return Err(ConfigError::Validation(
            "max_consecutive_recoveries must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the endpoint description
fn validate_endpoint_config(config: &EndpointConfig) -> Result<(), ConfigError> {
    if config.source.trim().is_empty() {
        return Err(ConfigError::Validation("source cannot be empty".to_string()));
    }

    validate_http_url("url", &config.url)?;
    if let Some(session_url) = &config.session_url {
        validate_http_url("session_url", session_url)?;
    }

    if config.query_param.is_empty() {
        return Err(ConfigError::Validation(
            "query_param cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    validate_record_convention(&config.records)
}

fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(value).map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}

/// Validates that every field name and separator of a convention is usable
fn validate_record_convention(convention: &RecordConvention) -> Result<(), ConfigError> {
    let (fields, separator): (Vec<&str>, Option<&str>) = match convention {
        RecordConvention::Delimited { separator } => (vec![], Some(separator.as_str())),
        RecordConvention::Compound {
            code_field,
            name_field,
            separator,
            ..
        } => (
            vec![code_field.as_str(), name_field.as_str()],
            Some(separator.as_str()),
        ),
        RecordConvention::Positional {
            value_field,
            subtext_field,
            name_field,
        } => (
            vec![value_field.as_str(), subtext_field.as_str(), name_field.as_str()],
            None,
        ),
        RecordConvention::Plain {
            code_field,
            name_field,
            alt_field,
        } => (
            vec![code_field.as_str(), name_field.as_str(), alt_field.as_str()],
            None,
        ),
    };

    if fields.iter().any(|f| f.is_empty()) {
        return Err(ConfigError::Validation(
            "record field names cannot be empty".to_string(),
        ));
    }

    if separator.is_some_and(str::is_empty) {
        return Err(ConfigError::Validation(
            "record separator cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.catalog_path.is_empty() {
        return Err(ConfigError::Validation(
            "catalog_path cannot be empty".to_string(),
        ));
    }

    if config.failed_path.is_empty() {
        return Err(ConfigError::Validation(
            "failed_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
