//! Core validated types shared across the server

use std::fmt;

use uuid::Uuid;

/// Validation failures for protocol primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid message-id: {0}")]
    InvalidMessageId(String),
    #[error("invalid newsgroup name: {0}")]
    InvalidGroupName(String),
}

/// A validated NNTP message ID
///
/// Message IDs must be enclosed in angle brackets per RFC 3977 §3.6 and
/// contain a local part and a host separated by `@`. The stored form always
/// includes the brackets; [`MessageId::without_brackets`] strips them for
/// cache keys and blob paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Validate and wrap a message-id string (brackets required)
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.len() < 5 || !s.starts_with('<') || !s.ends_with('>') {
            return Err(ValidationError::InvalidMessageId(
                "must be of the form <local@host>".to_string(),
            ));
        }
        let inner = &s[1..s.len() - 1];
        if !inner.contains('@') || inner.contains('<') || inner.contains('>') {
            return Err(ValidationError::InvalidMessageId(
                "must contain exactly one local@host pair".to_string(),
            ));
        }
        if inner.chars().any(|c| c.is_whitespace()) {
            return Err(ValidationError::InvalidMessageId(
                "must not contain whitespace".to_string(),
            ));
        }
        Ok(Self(s))
    }

    /// The full `<local@host>` form
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `local@host` form without angle brackets
    #[must_use]
    #[inline]
    pub fn without_brackets(&self) -> &str {
        &self.0[1..self.0.len() - 1]
    }

    /// The local part (everything before the first `@`)
    #[must_use]
    pub fn local_part(&self) -> &str {
        let inner = self.without_brackets();
        inner.split_once('@').map(|(l, _)| l).unwrap_or(inner)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated newsgroup name
///
/// Names are case-sensitive, dot-hierarchical, and must contain at least one
/// `.` (RFC 5536 §3.1.4). Metagroup suffixes (`.deleted`, `.pending`) are
/// legal here; stripping them is the retriever's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.is_empty() || !s.contains('.') {
            return Err(ValidationError::InvalidGroupName(
                "must contain at least one '.'".to_string(),
            ));
        }
        if s.starts_with('.') || s.ends_with('.') {
            return Err(ValidationError::InvalidGroupName(
                "must not start or end with '.'".to_string(),
            ));
        }
        if s.chars()
            .any(|c| c.is_whitespace() || c.is_ascii_control() || c == '*' || c == '?')
        {
            return Err(ValidationError::InvalidGroupName(
                "contains forbidden characters".to_string(),
            ));
        }
        Ok(Self(s))
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for client sessions, used for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
