//! Per-connection session state
//!
//! Lifecycle equals one TCP connection. The state machine is
//! `Greeting → Ready → {InPost} → Ready → Closed`; the mode tag decides
//! which sink the dispatcher reads into next.

use crate::models::Administrator;

/// What the session reads next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Reading command lines
    #[default]
    Ready,
    /// Accumulating raw article bytes after `340`
    InPost,
    /// `205` sent; the connection is winding down
    Closed,
}

/// Mutable per-connection state owned by the session
#[derive(Debug, Default)]
pub struct SessionState {
    pub mode: SessionMode,
    /// Currently selected group, exactly as the client named it
    /// (metagroup suffix included)
    pub current_group: Option<String>,
    pub current_article: Option<u64>,
    /// Authenticated principal, if any
    pub identity: Option<Administrator>,
    /// Username held between AUTHINFO USER and AUTHINFO PASS
    pub pending_username: Option<String>,
    pub tls_active: bool,
    pub compression_active: bool,
    /// GZIP TERMINATOR variant negotiated alongside compression
    pub compression_terminator: bool,
    /// Whether this connection may POST at all
    pub can_post: bool,
}

impl SessionState {
    #[must_use]
    pub fn new(can_post: bool, tls_active: bool) -> Self {
        Self {
            can_post,
            tls_active,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Select a group and reset the article pointer to its low watermark
    ///
    /// The low watermark is used even when that article has since been
    /// cancelled; a following argument-less ARTICLE may answer 420.
    pub fn select_group(&mut self, name: &str, low_watermark: u64) {
        self.current_group = Some(name.to_string());
        self.current_article = if low_watermark > 0 {
            Some(low_watermark)
        } else {
            None
        };
    }
}
