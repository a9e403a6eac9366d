//! Cache-first article and newsgroup resolution
//!
//! The retriever is the only read path used by command handlers. Every
//! lookup computes a cache key, consults the cache, and falls back to the
//! store with eager loading, populating the cache on the way out.
//!
//! Visibility is decided here, at query construction time: a requested name
//! ending in `.deleted` or `.pending` is a metagroup view of the real group
//! (the prefix) under the corresponding filter; everything else sees only
//! visible links. Handlers never post-filter.

use std::sync::Arc;

use crate::cache::RetrievalCache;
use crate::constants::protocol::METAGROUP_SUFFIX_LEN;
use crate::constants::session::MAX_RANGE_RESULTS;
use crate::models::{Newsgroup, ResolvedArticle};
use crate::storage::{Storage, StorageError, Visibility};

/// A requested group name resolved to its real group and visibility filter
///
/// Stripping the suffix is a pure function of the requested name; metagroups
/// are synthesized views, never stored rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupView {
    /// The name as the client gave it (suffix included)
    pub requested: String,
    /// The real group name (suffix stripped)
    pub base: String,
    pub visibility: Visibility,
}

impl GroupView {
    #[must_use]
    pub fn parse(requested: &str) -> Self {
        let (base, visibility) = if let Some(base) = requested.strip_suffix(".deleted") {
            (base, Visibility::Cancelled)
        } else if let Some(base) = requested.strip_suffix(".pending") {
            (base, Visibility::Pending)
        } else {
            (requested, Visibility::Visible)
        };
        debug_assert!(
            visibility == Visibility::Visible
                || requested.len() == base.len() + METAGROUP_SUFFIX_LEN
        );
        Self {
            requested: requested.to_string(),
            base: base.to_string(),
            visibility,
        }
    }

    /// Whether this is a synthesized metagroup view
    #[must_use]
    #[inline]
    pub fn is_metagroup(&self) -> bool {
        self.visibility != Visibility::Visible
    }
}

/// A parsed article range: `N`, `N-`, or `N-M`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleRange {
    Single(u64),
    From(u64),
    Bounded(u64, u64),
}

impl ArticleRange {
    /// Parse the range grammar; any other shape is a syntax error
    pub fn parse(s: &str) -> Result<Self, ()> {
        if s.is_empty() {
            return Err(());
        }
        match s.split_once('-') {
            None => s.parse().map(Self::Single).map_err(|_| ()),
            Some((lo, "")) => lo.parse().map(Self::From).map_err(|_| ()),
            Some((lo, hi)) => {
                let lo = lo.parse().map_err(|_| ())?;
                let hi = hi.parse().map_err(|_| ())?;
                Ok(Self::Bounded(lo, hi))
            }
        }
    }

    /// Concrete `[lo, hi]` bounds; the open upper bound is the current
    /// high watermark at query time
    #[must_use]
    pub fn bounds(&self, high_watermark: u64) -> (u64, u64) {
        match *self {
            Self::Single(n) => (n, n),
            Self::From(n) => (n, high_watermark),
            Self::Bounded(lo, hi) => (lo, hi),
        }
    }
}

/// Aggregate counters for a GROUP/LISTGROUP status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStats {
    pub count: u64,
    pub low: u64,
    pub high: u64,
}

/// Cache-first reader over the store
#[derive(Clone)]
pub struct Retriever {
    storage: Arc<dyn Storage>,
    cache: Arc<RetrievalCache>,
}

impl Retriever {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<RetrievalCache>) -> Self {
        Self { storage, cache }
    }

    /// Resolve a real group by name, cache-first
    pub async fn newsgroup(&self, base: &str) -> Result<Option<Newsgroup>, StorageError> {
        if let Some(group) = self.cache.group(base).await {
            return Ok(Some(group));
        }
        match self.storage.newsgroup_by_name(base).await? {
            Some(group) => {
                self.cache.store_group(&group).await;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    /// Resolve the group behind a view and compute its counters
    ///
    /// For the reader view this is the group's cached watermarks; metagroup
    /// counters are computed from a filtered scan since they are not cached
    /// on the group row.
    pub async fn group_stats(
        &self,
        view: &GroupView,
    ) -> Result<Option<(Newsgroup, GroupStats)>, StorageError> {
        let Some(group) = self.newsgroup(&view.base).await? else {
            return Ok(None);
        };
        let stats = if view.is_metagroup() {
            let rows = self
                .storage
                .articles_in_range(&view.base, 1, u64::MAX, MAX_RANGE_RESULTS, view.visibility)
                .await?;
            GroupStats {
                count: rows.len() as u64,
                low: rows.first().map(|r| r.link.number).unwrap_or(0),
                high: rows.last().map(|r| r.link.number).unwrap_or(0),
            }
        } else {
            GroupStats {
                count: group.post_count,
                low: group.low_watermark,
                high: group.high_watermark,
            }
        };
        Ok(Some((group, stats)))
    }

    /// List real groups matching a filter (LIST, NEWGROUPS)
    ///
    /// Listings bypass the group cache: they are unbounded scans and the
    /// point lookups stay warm on their own.
    pub async fn list_groups(
        &self,
        filter: &crate::storage::GroupFilter,
    ) -> Result<Vec<Newsgroup>, StorageError> {
        self.storage.list_newsgroups(filter).await
    }

    /// Lookup by the full `<…>` message-id string (reader view only)
    pub async fn article_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        if let Some(hit) = self.cache.article_by_message_id(message_id).await {
            return Ok(Some(hit));
        }
        match self.storage.article_by_message_id(message_id).await? {
            Some(resolved) => {
                self.cache.store_article(&resolved).await;
                Ok(Some(resolved))
            }
            None => Ok(None),
        }
    }

    /// Positional lookup within a view
    pub async fn article_by_number(
        &self,
        view: &GroupView,
        number: u64,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        if let Some(hit) = self.cache.article_by_position(&view.requested, number).await {
            return Ok(Some(hit));
        }
        match self
            .storage
            .article_by_number(&view.base, number, view.visibility)
            .await?
        {
            Some(resolved) => {
                self.cache
                    .store_article_keyed(&resolved, &view.requested)
                    .await;
                Ok(Some(resolved))
            }
            None => Ok(None),
        }
    }

    /// Bulk range read, ordered by number ascending
    ///
    /// Bypasses the cache for both lookup and population; this path exists
    /// for large scans (LISTGROUP, OVER) where caching every row would
    /// evict the hot set.
    pub async fn article_range(
        &self,
        view: &GroupView,
        lo: u64,
        hi: u64,
        max: usize,
    ) -> Result<Vec<ResolvedArticle>, StorageError> {
        self.storage
            .articles_in_range(&view.base, lo, hi, max, view.visibility)
            .await
    }

    /// The closest article strictly before `current` in the view
    pub async fn previous_article(
        &self,
        view: &GroupView,
        current: u64,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        if current <= 1 {
            return Ok(None);
        }
        let rows = self
            .storage
            .articles_in_range(&view.base, 1, current - 1, MAX_RANGE_RESULTS, view.visibility)
            .await?;
        Ok(rows.into_iter().next_back())
    }

    /// The closest article strictly after `current` in the view
    pub async fn next_article(
        &self,
        view: &GroupView,
        current: u64,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        let rows = self
            .storage
            .articles_in_range(&view.base, current + 1, u64::MAX, 1, view.visibility)
            .await?;
        Ok(rows.into_iter().next())
    }
}
