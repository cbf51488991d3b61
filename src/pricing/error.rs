// Error types for the pricing engine
// Fatal failures only: recoverable conditions (no zone match, rejected
// discount codes, missing tax rates) are carried as flags on the result.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the pricing engine
///
/// Everything here aborts the calculation before a result is produced.
/// Per-code discount rejections and shipping/tax unavailability are not
/// errors; they are surfaced on `CartCalculationResult`.
#[derive(Debug, Error)]
pub enum PricingError {
    /// Malformed calculation input, rejected before any computation
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The same discount code was submitted more than once in one request
    #[error("Duplicate discount code submitted: {0}")]
    DuplicateDiscountCode(String),

    /// A cart line references an item the catalog does not know
    #[error("Catalog item not found: {0}")]
    ItemNotFound(String),

    /// Upstream lookup failed; no partial result is produced
    #[error("Upstream lookup failed: {0}")]
    UpstreamUnavailable(#[from] sqlx::Error),

    /// Stored configuration failed validation at load time
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Required configuration row is missing
    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(String),

    /// Kind-specific settings JSON could not be parsed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Arithmetic produced a value outside the representable range
    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type alias for pricing operations
pub type PricingResult<T> = Result<T, PricingError>;

impl From<validator::ValidationErrors> for PricingError {
    fn from(err: validator::ValidationErrors) -> Self {
        PricingError::ValidationError(err.to_string())
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PricingError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation error"),
            PricingError::DuplicateDiscountCode(_) => {
                (StatusCode::BAD_REQUEST, "Duplicate discount code")
            }
            PricingError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "Item not found"),
            PricingError::UpstreamUnavailable(ref e) => {
                tracing::error!("Upstream lookup failed: {}", e);
                (StatusCode::BAD_GATEWAY, "Upstream lookup failed")
            }
            PricingError::InvalidConfiguration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid configuration")
            }
            PricingError::ConfigurationNotFound(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration not found")
            }
            PricingError::JsonError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration parse error")
            }
            PricingError::CalculationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Calculation error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PricingError::ValidationError("quantity must be positive".to_string());
        assert_eq!(error.to_string(), "Validation failed: quantity must be positive");

        let error = PricingError::DuplicateDiscountCode("SAVE10".to_string());
        assert_eq!(error.to_string(), "Duplicate discount code submitted: SAVE10");

        let error = PricingError::ItemNotFound("variant:9".to_string());
        assert_eq!(error.to_string(), "Catalog item not found: variant:9");
    }

    #[test]
    fn test_error_from_sqlx() {
        let sqlx_error = sqlx::Error::RowNotFound;
        let error: PricingError = sqlx_error.into();
        assert!(matches!(error, PricingError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_error_from_json() {
        let result: Result<serde_json::Value, _> = serde_json::from_str("{not json}");
        if let Err(json_error) = result {
            let error: PricingError = json_error.into();
            assert!(matches!(error, PricingError::JsonError(_)));
        }
    }
}
