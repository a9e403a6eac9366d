//! Error types for the archive server
//!
//! Handler failures are split by how the dispatcher must react: a syntax
//! error maps to `501` without closing the connection, a backend failure
//! maps to `403`, and a transport error abandons the session silently.

use crate::storage::StorageError;

/// Errors surfaced by command handlers
///
/// State errors (no current group, auth out of sequence, not-found) are not
/// errors at this layer; handlers reply with the specific NNTP code instead.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Malformed argument or range; dispatcher replies `501`
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Store unreachable or returned garbage; dispatcher replies `403`
    #[error("backend failure: {0}")]
    Backend(#[from] StorageError),

    /// The peer stream itself failed; the session ends without a reply
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl HandlerError {
    /// Convenience constructor for syntax errors
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_display() {
        let err = HandlerError::syntax("bad range");
        assert_eq!(err.to_string(), "syntax error: bad range");
    }

    #[test]
    fn test_backend_from_storage() {
        let err: HandlerError = StorageError::Unavailable("pool dry".to_string()).into();
        assert!(matches!(err, HandlerError::Backend(_)));
    }
}
