// Validation utilities module
// Custom validation functions for request DTOs

use validator::ValidationError;

/// Validates an ISO 3166-1 alpha-2 country code (two ASCII letters)
pub fn validate_country_code(country: &str) -> Result<(), ValidationError> {
    if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_country_code"))
    }
}

/// Validates submitted discount code strings
/// Codes must be non-empty, at most 64 characters, with no whitespace
pub fn validate_discount_codes(codes: &[String]) -> Result<(), ValidationError> {
    for code in codes {
        if code.is_empty() || code.len() > 64 || code.chars().any(|c| c.is_whitespace()) {
            return Err(ValidationError::new("invalid_discount_code"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code() {
        assert!(validate_country_code("US").is_ok());
        assert!(validate_country_code("gb").is_ok());
        assert!(validate_country_code("USA").is_err());
        assert!(validate_country_code("U1").is_err());
        assert!(validate_country_code("").is_err());
    }

    #[test]
    fn test_discount_codes() {
        assert!(validate_discount_codes(&["SAVE10".to_string()]).is_ok());
        assert!(validate_discount_codes(&[]).is_ok());
        assert!(validate_discount_codes(&["".to_string()]).is_err());
        assert!(validate_discount_codes(&["HAS SPACE".to_string()]).is_err());
    }
}
