//! Redemption code validation

use thiserror::Error;
use validator::ValidateEmail;

use crate::domain::DomainError;

/// Characters drawn for generated codes: uppercase letters and digits without 0, O, I and 1
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Storage limit of the code column
pub const MAX_CODE_LENGTH: usize = 32;

/// Errors that can occur during redemption input validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodeValidationError {
    #[error("Redemption code cannot be empty")]
    EmptyCode,

    #[error("Redemption code cannot exceed {0} characters")]
    CodeTooLong(usize),

    #[error("Redemption code can only contain letters, digits and hyphens")]
    InvalidCodeCharacters,

    #[error("Invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("Batch size must be between 1 and {max}, got {got}")]
    InvalidBatchSize { got: usize, max: usize },
}

impl From<CodeValidationError> for DomainError {
    fn from(error: CodeValidationError) -> Self {
        DomainError::validation(error.to_string())
    }
}

/// Validate a caller-supplied code
pub fn validate_code(code: &str) -> Result<(), CodeValidationError> {
    if code.is_empty() {
        return Err(CodeValidationError::EmptyCode);
    }

    if code.len() > MAX_CODE_LENGTH {
        return Err(CodeValidationError::CodeTooLong(MAX_CODE_LENGTH));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CodeValidationError::InvalidCodeCharacters);
    }

    Ok(())
}

/// Validate the email a seat is redeemed for
pub fn validate_email(email: &str) -> Result<(), CodeValidationError> {
    if !email.validate_email() {
        return Err(CodeValidationError::InvalidEmail(email.to_string()));
    }

    Ok(())
}

/// Whether a code consists only of the unambiguous alphabet (hyphens aside)
pub fn is_unambiguous(code: &str) -> bool {
    code.bytes()
        .filter(|b| *b != b'-')
        .all(|b| CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_excludes_ambiguous() {
        for c in [b'0', b'O', b'I', b'1'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
        assert_eq!(CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("ABCD-EFGH-JKLM-NPQR").is_ok());
        assert!(validate_code("promo2024").is_ok());
        assert_eq!(validate_code(""), Err(CodeValidationError::EmptyCode));
        assert_eq!(
            validate_code(&"A".repeat(33)),
            Err(CodeValidationError::CodeTooLong(32))
        );
        assert_eq!(
            validate_code("ABC DEF"),
            Err(CodeValidationError::InvalidCodeCharacters)
        );
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@x.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn test_is_unambiguous() {
        assert!(is_unambiguous("ABCD-EFGH-JKLM-NPQR"));
        assert!(!is_unambiguous("ABCD-EFGH-IJKL-MNOP"));
    }
}
