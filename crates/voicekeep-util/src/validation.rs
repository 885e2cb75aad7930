use thiserror::Error;

/// Registry entries with tokens at or below 30 characters are rejected.
pub const MIN_TOKEN_LEN: usize = 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is empty")]
    Empty,
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
}

/// Minimal check applied when a session is constructed: the token must be
/// present and contain no whitespace or control characters.
pub fn validate_token_present(token: &str) -> Result<(), ValidationError> {
    if token.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Stricter check used by the token registry.
pub fn validate_token(token: &str) -> Result<(), ValidationError> {
    validate_token_present(token)?;
    let len = token.chars().count();
    if len < MIN_TOKEN_LEN {
        return Err(ValidationError::TooShort {
            min: MIN_TOKEN_LEN,
            got: len,
        });
    }
    Ok(())
}
