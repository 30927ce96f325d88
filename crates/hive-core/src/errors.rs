//! Reading validation errors.

use thiserror::Error;

/// Why a submitted payload could not become a [`Reading`](crate::Reading).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReadingError {
    /// The request carried no body (or only whitespace).
    #[error("empty payload")]
    Empty,
    /// The body is not valid UTF-8 text.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    /// The body is not syntactically valid JSON.
    #[error("invalid JSON: {0}")]
    Syntax(String),
    /// The body is valid JSON but not an object.
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = ReadingError::NotAnObject("number");
        assert_eq!(err.to_string(), "payload must be a JSON object, got number");

        let err = ReadingError::Syntax("expected value at line 1 column 1".into());
        assert!(err.to_string().starts_with("invalid JSON:"));
    }
}
