use crate::error::DecodeError;

/// Result of one decode attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    Found(String),
    /// Expected steady-state signal, not an error.
    NotFound,
    Error(DecodeError),
}

impl From<Result<Option<String>, DecodeError>> for DecodeOutcome {
    fn from(result: Result<Option<String>, DecodeError>) -> Self {
        match result {
            Ok(Some(text)) => DecodeOutcome::Found(text),
            Ok(None) => DecodeOutcome::NotFound,
            Err(err) => DecodeOutcome::Error(err),
        }
    }
}
