//! Shared handler utilities
//!
//! Input validation and metrics helpers used across handlers.

use std::time::Instant;

use vidya_types::FeatureSlug;

use crate::error::ApiError;

// ============================================================================
// Input Validation
// ============================================================================

/// Maximum length for feature slugs (they become metric labels)
pub const MAX_FEATURE_SLUG_LEN: usize = 64;

/// Maximum length for user-provided strings
pub const MAX_STRING_LEN: usize = 256;

/// Validate a feature slug from the path.
///
/// # Security
/// - Bounded length and alphabet keep metric label cardinality in check
/// - Allows: lowercase ascii, digits, underscore, hyphen
///
/// # Example
/// ```ignore
/// validate_feature_slug("doubt_video")?;  // Ok
/// validate_feature_slug("Doubt Video")?;  // Err
/// ```
pub fn validate_feature_slug(slug: &str) -> Result<FeatureSlug, ApiError> {
    if slug.is_empty() {
        return Err(ApiError::BadRequest("Feature cannot be empty".into()));
    }

    if slug.len() > MAX_FEATURE_SLUG_LEN {
        return Err(ApiError::BadRequest(format!(
            "Feature too long (max {MAX_FEATURE_SLUG_LEN} chars)"
        )));
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ApiError::BadRequest(
            "Feature contains invalid characters (use a-z, 0-9, _, -)".into(),
        ));
    }

    if !slug.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(ApiError::BadRequest(
            "Feature must start with a lowercase letter".into(),
        ));
    }

    Ok(FeatureSlug::new(slug))
}

/// Validate a user-provided string is present and within safe bounds.
pub fn validate_required(value: &str, field_name: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field_name} is required")));
    }
    validate_string_length(value, field_name)
}

/// Validate a user-provided string is within safe bounds.
pub fn validate_string_length(value: &str, field_name: &str) -> Result<(), ApiError> {
    if value.len() > MAX_STRING_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field_name} too long (max {MAX_STRING_LEN} chars)"
        )));
    }
    Ok(())
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record HTTP operation duration with result label.
///
/// Labels: operation, result (ok/err)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "billing_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_feature_slug_valid() {
        assert!(validate_feature_slug("doubt_video").is_ok());
        assert!(validate_feature_slug("ai-notes").is_ok());
        assert!(validate_feature_slug("mains2").is_ok());
        assert!(validate_feature_slug("a").is_ok());
        assert_eq!(
            validate_feature_slug("answer_eval").unwrap().as_str(),
            "answer_eval"
        );
    }

    #[test]
    fn test_validate_feature_slug_invalid() {
        assert!(validate_feature_slug("").is_err());

        let long_slug = "a".repeat(MAX_FEATURE_SLUG_LEN + 1);
        assert!(validate_feature_slug(&long_slug).is_err());

        assert!(validate_feature_slug("Doubt").is_err());
        assert!(validate_feature_slug("foo bar").is_err());
        assert!(validate_feature_slug("foo.bar").is_err());
        assert!(validate_feature_slug("foo;drop").is_err());

        assert!(validate_feature_slug("1abc").is_err());
        assert!(validate_feature_slug("_abc").is_err());
        assert!(validate_feature_slug("-abc").is_err());
    }

    #[test]
    fn test_validate_required() {
        assert!(validate_required("order_1", "order id").is_ok());
        assert!(validate_required("", "order id").is_err());
        assert!(validate_required("   ", "order id").is_err());

        let long_string = "a".repeat(MAX_STRING_LEN + 1);
        assert!(validate_required(&long_string, "order id").is_err());
        assert!(validate_string_length(&long_string, "test").is_err());
    }
}
