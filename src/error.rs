//! Error codes shared by every service error.
//!
//! DESIGN
//! ======
//! Each module owns its own `thiserror` enum. `ErrorCode` gives those enums a
//! grepable code and a retryable hint so the HTTP layer can render them the
//! same way without knowing the concrete type.

/// Grepable error code plus retry hint for any service error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Serializable error body: `{ "code", "message", "retryable" }`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { code: err.error_code().to_string(), message: err.to_string(), retryable: err.retryable() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("thing {0} not found")]
    struct NotFound(u32);

    impl ErrorCode for NotFound {
        fn error_code(&self) -> &'static str {
            "E_NOT_FOUND"
        }
    }

    #[test]
    fn body_carries_code_message_and_default_retryable() {
        let body = ErrorBody::from_error(&NotFound(7));
        assert_eq!(body.code, "E_NOT_FOUND");
        assert_eq!(body.message, "thing 7 not found");
        assert!(!body.retryable);
    }
}
