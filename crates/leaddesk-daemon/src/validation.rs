//! Request body decoding and validation.
//!
//! Bodies are decoded in two steps so that a malformed document and a
//! well-formed document with invalid content are reported differently:
//! unparseable JSON is a `BadRequest`, everything else is a `Validation`
//! error carrying the first failing rule.

use crate::error::{ApiError, ApiResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Content rules for a decoded request
pub trait Validate {
    /// Return the first violated rule, if any
    fn validate(&self) -> Result<(), String>;
}

/// Parse raw bytes into a JSON document
pub fn parse_json(bytes: &[u8]) -> ApiResult<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {}", e)))
}

/// Decode a JSON document into `T` and apply its rules
pub fn decode<T: DeserializeOwned + Validate>(value: Value) -> ApiResult<T> {
    let decoded: T = serde_json::from_value(value).map_err(|e| ApiError::Validation(e.to_string()))?;
    decoded.validate().map_err(ApiError::Validation)?;
    Ok(decoded)
}

/// Length in characters, not bytes
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Require a non-blank value of at most `max` characters
pub fn require_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    limit_text(field, value, max)
}

pub fn limit_text(field: &str, value: &str, max: usize) -> Result<(), String> {
    if char_len(value) > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain
pub fn check_email(field: &str, value: &str) -> Result<(), String> {
    require_text(field, value, 254)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("{} must be a valid email address", field))
    }
}
