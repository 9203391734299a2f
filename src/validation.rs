use crate::error::AppError;

/// Trim `value` and reject it when nothing is left.
pub fn require_non_empty(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub fn require_valid_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must be a valid ID")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_non_empty_trims() {
        assert_eq!(require_non_empty("name", "  Week 1 ").unwrap(), "Week 1");
    }

    #[test]
    fn test_require_non_empty_rejects_blank() {
        let err = require_non_empty("name", "   ").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "name cannot be empty"));
    }

    #[test]
    fn test_require_valid_id() {
        assert!(require_valid_id("thread id", "42").is_ok());
        assert!(require_valid_id("thread id", "").is_err());
    }
}
