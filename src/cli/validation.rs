//! CLI argument validation functions
//!
//! Value parsers for arguments that need more than clap's built-in checks.

use std::fs;
use std::path::PathBuf;

use crate::models::Currency;

/// Largest number of migrations a single rollback may revert
const MAX_ROLLBACK_STEPS: u32 = 100;

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!(
            "Cannot read configuration file '{}': {}",
            path_str, e
        )),
    }
}

/// Validate rollback steps is a positive number
pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str.parse().map_err(|_| {
        format!(
            "Rollback steps must be a valid positive number, got: '{}'",
            steps_str
        )
    })?;

    if steps == 0 {
        return Err("Rollback steps must be greater than 0".to_string());
    }

    if steps > MAX_ROLLBACK_STEPS {
        return Err(format!(
            "Rollback steps cannot exceed {}",
            MAX_ROLLBACK_STEPS
        ));
    }

    Ok(steps)
}

/// Validate an identity provider user id
///
/// User ids are opaque, but they are never empty and never contain whitespace.
pub fn validate_user_id(user_str: &str) -> Result<String, String> {
    if user_str.is_empty() {
        return Err("User id cannot be empty".to_string());
    }

    if user_str.chars().any(char::is_whitespace) {
        return Err(format!("User id cannot contain whitespace: '{}'", user_str));
    }

    Ok(user_str.to_string())
}

/// Validate an ISO 4217 currency code
pub fn validate_currency(code_str: &str) -> Result<Currency, String> {
    code_str
        .parse::<Currency>()
        .map_err(|_| format!("Currency must be a three letter code, got: '{}'", code_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, tempdir};

    #[test]
    fn test_config_file_path_accepts_readable_file() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        let result = validate_config_file_path(path);
        assert_eq!(result.unwrap(), file.path());
    }

    #[test]
    fn test_config_file_path_rejects_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");

        let err = validate_config_file_path(missing.to_str().unwrap()).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_config_file_path_rejects_directory() {
        let dir = tempdir().unwrap();

        let err = validate_config_file_path(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.contains("not a file"));
    }

    #[test]
    fn test_rollback_steps_validation_valid() {
        let valid_steps = ["1", "5", "10", "50", "100"];

        for steps_str in valid_steps {
            let result = validate_rollback_steps(steps_str);
            assert!(result.is_ok(), "Steps {} should be valid", steps_str);
        }
    }

    #[test]
    fn test_rollback_steps_validation_invalid() {
        let invalid_steps = ["0", "101", "999", "-1", "abc", ""];

        for steps_str in invalid_steps {
            let result = validate_rollback_steps(steps_str);
            assert!(result.is_err(), "Steps '{}' should be invalid", steps_str);
        }
    }

    #[test]
    fn test_user_id_validation() {
        assert_eq!(validate_user_id("auth0|42").unwrap(), "auth0|42");
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("two words").is_err());
    }

    #[test]
    fn test_currency_validation() {
        assert_eq!(validate_currency("eur").unwrap().to_string(), "EUR");
        assert!(validate_currency("euro").is_err());
    }
}
