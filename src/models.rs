//! Domain records: articles, newsgroups, crosspost links, administrators
//!
//! `Article`, `Newsgroup`, and `ArticleNewsgroup` are three independent
//! records joined by opaque identifiers (message-id and group name); the
//! retriever materializes the join shape handlers need as
//! [`ResolvedArticle`]. No record holds an owning back-reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One header field, unfolded, in original order within the article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An immutable posted message
///
/// The ordered header list is the source of truth for HEAD/ARTICLE output;
/// structured accessors are derived views over it. The body is an opaque
/// octet stream with CRLF line endings and no terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Globally unique `<local@host>` identifier
    pub message_id: String,
    /// All header fields in the order they were posted (values unfolded)
    pub headers: Vec<Header>,
    /// Raw body octets, CRLF line endings, dot-unstuffed
    pub body: Vec<u8>,
    /// Server-side acceptance instant
    pub posted_at: DateTime<Utc>,
}

impl Article {
    /// First header value with the given name, case-insensitive
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Replace every header with the given name, or append if absent
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut found = false;
        self.headers.retain_mut(|h| {
            if h.name.eq_ignore_ascii_case(name) {
                if found {
                    return false;
                }
                h.value = value.clone();
                found = true;
            }
            true
        });
        if !found {
            self.headers.push(Header::new(name, value));
        }
    }

    /// Remove every header with the given name
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    /// Target groups from the Newsgroups header
    ///
    /// The header is a space-separated list; commas are tolerated as
    /// separators as well since readers in the wild emit both.
    #[must_use]
    pub fn newsgroups(&self) -> Vec<&str> {
        self.header("Newsgroups")
            .map(|v| {
                v.split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The verbatim header block for HEAD/ARTICLE output (no trailing blank line)
    #[must_use]
    pub fn header_block(&self) -> String {
        let mut out = String::with_capacity(self.headers.len() * 32);
        for h in &self.headers {
            out.push_str(&h.name);
            out.push_str(": ");
            out.push_str(&h.value);
            out.push_str("\r\n");
        }
        out
    }

    /// Number of CRLF-separated segments in the body
    #[must_use]
    pub fn body_line_count(&self) -> usize {
        if self.body.is_empty() {
            return 0;
        }
        let mut count = 1;
        let mut i = 0;
        while i + 1 < self.body.len() {
            if self.body[i] == b'\r' && self.body[i + 1] == b'\n' {
                count += 1;
                i += 2;
            } else {
                i += 1;
            }
        }
        // A trailing CRLF does not start a new segment
        if self.body.ends_with(b"\r\n") {
            count -= 1;
        }
        count
    }
}

/// A named feed of articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsgroup {
    pub name: String,
    pub description: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub moderated: bool,
    pub deny_local_posting: bool,
    pub deny_peer_posting: bool,
    /// Count of currently visible articles (reconciled on mutation)
    pub post_count: u64,
    /// Lowest visible article number, 0 when empty
    pub low_watermark: u64,
    /// Highest visible article number, 0 when empty
    pub high_watermark: u64,
}

impl Newsgroup {
    /// A fresh, empty group created now
    pub fn new(name: impl Into<String>, description: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            creator: creator.into(),
            created_at: Utc::now(),
            moderated: false,
            deny_local_posting: false,
            deny_peer_posting: false,
            post_count: 0,
            low_watermark: 0,
            high_watermark: 0,
        }
    }

    /// LIST ACTIVE status flag: `m` moderated, `y` posting allowed, `n` denied
    #[must_use]
    pub fn posting_flag(&self, server_posting_allowed: bool) -> char {
        if self.moderated {
            'm'
        } else if server_posting_allowed && !self.deny_local_posting {
            'y'
        } else {
            'n'
        }
    }
}

/// The crosspost record linking an article into one group
///
/// `number` is assigned at post time as `max(number in group) + 1` and is
/// never reused, even after cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleNewsgroup {
    pub message_id: String,
    pub group: String,
    pub number: u64,
    pub cancelled: bool,
    pub pending: bool,
}

impl ArticleNewsgroup {
    /// Visible means neither cancelled nor awaiting moderation
    #[must_use]
    #[inline]
    pub fn is_visible(&self) -> bool {
        !self.cancelled && !self.pending
    }
}

/// An authenticated principal with capability flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Administrator {
    pub username: String,
    /// Hex-encoded random salt
    pub password_salt: String,
    /// Hex-encoded SHA-256 of salt bytes followed by password bytes
    pub password_hash: String,
    #[serde(default)]
    pub can_approve_any: bool,
    #[serde(default)]
    pub can_cancel: bool,
    #[serde(default)]
    pub can_inject: bool,
    #[serde(default)]
    pub can_create_group: bool,
    #[serde(default)]
    pub can_delete_group: bool,
    #[serde(default)]
    pub can_check_groups: bool,
    #[serde(default)]
    pub local_authentication_only: bool,
    /// Groups this principal moderates
    #[serde(default)]
    pub moderates: Vec<String>,
}

impl Administrator {
    /// Whether this principal may approve articles for `group`
    #[must_use]
    pub fn can_approve_for(&self, group: &str) -> bool {
        self.can_approve_any || self.can_inject || self.moderates.iter().any(|g| g == group)
    }
}

/// The materialized `Article ⋈ ArticleNewsgroup ⋈ Newsgroup` join shape
///
/// `Article` is behind an `Arc` so cache clones stay cheap for large bodies.
#[derive(Debug, Clone)]
pub struct ResolvedArticle {
    pub article: Arc<Article>,
    pub group: Newsgroup,
    pub link: ArticleNewsgroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_with(headers: Vec<Header>, body: &[u8]) -> Article {
        Article {
            message_id: "<t@example>".to_string(),
            headers,
            body: body.to_vec(),
            posted_at: Utc::now(),
        }
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let a = article_with(vec![Header::new("Subject", "hello")], b"");
        assert_eq!(a.header("subject"), Some("hello"));
        assert_eq!(a.header("SUBJECT"), Some("hello"));
        assert_eq!(a.header("From"), None);
    }

    #[test]
    fn test_set_header_replaces_in_place() {
        let mut a = article_with(
            vec![Header::new("Subject", "old"), Header::new("From", "x@y")],
            b"",
        );
        a.set_header("subject", "new");
        assert_eq!(a.header("Subject"), Some("new"));
        assert_eq!(a.headers.len(), 2);
        // Name of the first header keeps its original spelling
        assert_eq!(a.headers[0].name, "Subject");
    }

    #[test]
    fn test_set_header_appends_when_absent() {
        let mut a = article_with(vec![], b"");
        a.set_header("Xref", "host local.test:1");
        assert_eq!(a.header("Xref"), Some("host local.test:1"));
    }

    #[test]
    fn test_newsgroups_space_and_comma_separated() {
        let a = article_with(vec![Header::new("Newsgroups", "a.one b.two")], b"");
        assert_eq!(a.newsgroups(), vec!["a.one", "b.two"]);

        let b = article_with(vec![Header::new("Newsgroups", "a.one,b.two, c.three")], b"");
        assert_eq!(b.newsgroups(), vec!["a.one", "b.two", "c.three"]);
    }

    #[test]
    fn test_header_block_roundtrip() {
        let a = article_with(
            vec![
                Header::new("From", "poster@example.com"),
                Header::new("Subject", "test"),
            ],
            b"",
        );
        assert_eq!(
            a.header_block(),
            "From: poster@example.com\r\nSubject: test\r\n"
        );
    }

    #[test]
    fn test_body_line_count() {
        assert_eq!(article_with(vec![], b"").body_line_count(), 0);
        assert_eq!(article_with(vec![], b"one\r\n").body_line_count(), 1);
        assert_eq!(article_with(vec![], b"one\r\ntwo\r\n").body_line_count(), 2);
        // No trailing CRLF still counts the last segment
        assert_eq!(article_with(vec![], b"one\r\ntwo").body_line_count(), 2);
    }

    #[test]
    fn test_posting_flag() {
        let mut g = Newsgroup::new("local.test", "", "admin");
        assert_eq!(g.posting_flag(true), 'y');
        assert_eq!(g.posting_flag(false), 'n');
        g.deny_local_posting = true;
        assert_eq!(g.posting_flag(true), 'n');
        g.moderated = true;
        assert_eq!(g.posting_flag(true), 'm');
    }

    #[test]
    fn test_visibility_partition() {
        let mut link = ArticleNewsgroup {
            message_id: "<t@example>".to_string(),
            group: "local.test".to_string(),
            number: 1,
            cancelled: false,
            pending: false,
        };
        assert!(link.is_visible());
        link.pending = true;
        assert!(!link.is_visible());
        link.pending = false;
        link.cancelled = true;
        assert!(!link.is_visible());
    }

    #[test]
    fn test_can_approve_for() {
        let mut admin = Administrator {
            username: "mod".to_string(),
            password_salt: String::new(),
            password_hash: String::new(),
            can_approve_any: false,
            can_cancel: false,
            can_inject: false,
            can_create_group: false,
            can_delete_group: false,
            can_check_groups: false,
            local_authentication_only: false,
            moderates: vec!["local.moderated".to_string()],
        };
        assert!(admin.can_approve_for("local.moderated"));
        assert!(!admin.can_approve_for("local.other"));
        admin.can_approve_any = true;
        assert!(admin.can_approve_for("local.other"));
    }
}
