//! Store contract: abstract interface over article/newsgroup persistence
//!
//! The protocol core issues the queries below and never assumes a concrete
//! backend. [`memory::MemoryStorage`] is the reference implementation; a
//! relational backend implements the same trait behind its own pool.

mod blob;
mod memory;

pub use blob::BlobStore;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Administrator, Article, ArticleNewsgroup, Newsgroup, ResolvedArticle};

/// Errors from the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend unreachable or query failed; surfaced to clients as `403`
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint was violated
    #[error("duplicate message-id {0}")]
    DuplicateMessageId(String),

    /// Referenced group does not exist
    #[error("no such newsgroup {0}")]
    NoSuchGroup(String),
}

/// The three-way visibility filter applied at query construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// `!cancelled && !pending`, the default reader view
    Visible,
    /// `cancelled`, the `.deleted` metagroup view
    Cancelled,
    /// `pending`, the `.pending` metagroup view
    Pending,
}

impl Visibility {
    /// Whether a link passes this filter
    #[must_use]
    #[inline]
    pub fn admits(&self, link: &ArticleNewsgroup) -> bool {
        match self {
            Self::Visible => !link.cancelled && !link.pending,
            Self::Cancelled => link.cancelled,
            Self::Pending => link.pending,
        }
    }
}

/// Filter for newsgroup listings
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    /// Wildmat expression over group names
    pub name_wildmat: Option<String>,
    /// Only groups created at or after this instant
    pub created_since: Option<DateTime<Utc>>,
}

/// A group link awaiting number assignment at insert time
#[derive(Debug, Clone)]
pub struct PendingLink {
    pub group: String,
    pub pending: bool,
}

/// Abstract persistence interface consumed by the protocol core
///
/// Implementations must provide unique indexes on message-id, on
/// `(group, number)`, on group name, and on username, plus an index on
/// `(group, cancelled, pending, number)` for range scans.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Point lookup of a group by exact name
    async fn newsgroup_by_name(&self, name: &str) -> Result<Option<Newsgroup>, StorageError>;

    /// Lookup by message-id, eager-loading article and group
    ///
    /// Returns the first *visible* crosspost link; an article whose links are
    /// all cancelled or pending resolves to `None`.
    async fn article_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ResolvedArticle>, StorageError>;

    /// Positional lookup within a group under a visibility filter
    async fn article_by_number(
        &self,
        group: &str,
        number: u64,
        vis: Visibility,
    ) -> Result<Option<ResolvedArticle>, StorageError>;

    /// Range scan `[lo, hi]` ordered by number ascending, capped at `max`
    async fn articles_in_range(
        &self,
        group: &str,
        lo: u64,
        hi: u64,
        max: usize,
        vis: Visibility,
    ) -> Result<Vec<ResolvedArticle>, StorageError>;

    /// List groups matching the filter, ordered by name
    async fn list_newsgroups(&self, filter: &GroupFilter) -> Result<Vec<Newsgroup>, StorageError>;

    /// Persist an article and its group links atomically
    ///
    /// Numbers are assigned here as `max(number in group) + 1` under
    /// per-group serialization. Returns the links with numbers filled in.
    async fn insert_article(
        &self,
        article: Article,
        groups: Vec<PendingLink>,
    ) -> Result<Vec<ArticleNewsgroup>, StorageError>;

    /// Update a crosspost link in place (cancel, moderation approval)
    async fn update_link(&self, link: &ArticleNewsgroup) -> Result<(), StorageError>;

    /// Rewrite a stored article's headers (moderation approval)
    async fn update_article(&self, article: &Article) -> Result<(), StorageError>;

    /// Create a newsgroup (control message `newgroup`)
    async fn create_newsgroup(&self, group: Newsgroup) -> Result<(), StorageError>;

    /// Remove a newsgroup and its links (control message `rmgroup`)
    async fn remove_newsgroup(&self, name: &str) -> Result<(), StorageError>;

    /// Update group metadata (description, flags)
    async fn update_newsgroup(&self, group: &Newsgroup) -> Result<(), StorageError>;

    /// All authenticated principals
    async fn administrators(&self) -> Result<Vec<Administrator>, StorageError>;

    /// Every crosspost link for a message-id regardless of visibility
    ///
    /// Used by cancel processing and cache invalidation, which must reach
    /// links the reader view hides.
    async fn links_for_message_id(
        &self,
        message_id: &str,
    ) -> Result<Vec<ArticleNewsgroup>, StorageError>;

    /// The bare article record regardless of link visibility
    ///
    /// Moderation approval reads pending articles through this.
    async fn article_record(&self, message_id: &str) -> Result<Option<Article>, StorageError>;
}
