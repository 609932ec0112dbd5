//! Identifier validation for store queries.
//!
//! Table, column and condition names come straight out of rule strings written
//! by callers. They are checked here before any query frame is built so a
//! malformed identifier surfaces as a fatal error instead of a confusing
//! planner failure deep inside the backend.

use crate::error::{BatchError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum accepted identifier length.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name, etc.).
    ///
    /// # Examples
    /// ```rust
    /// use batch_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("contacts").unwrap(), "\"contacts\"");
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE users--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("\"{identifier}\""))
    }

    /// Validates an unqualified SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(BatchError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(BatchError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        if identifier.contains('\0') {
            return Err(BatchError::SecurityError(
                "SQL identifier cannot contain null bytes".to_string(),
            ));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(BatchError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        Ok(())
    }

    /// Validates every identifier in `identifiers`, failing on the first bad one.
    pub fn validate_all<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Result<()> {
        identifiers
            .into_iter()
            .try_for_each(Self::validate_identifier)
    }
}
