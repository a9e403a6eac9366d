//! Retrieval cache in front of the store
//!
//! Three indexes: message-id → resolved article, `(group, number)` →
//! resolved article, and group name → newsgroup. Entries are weighted by
//! estimated byte cost (header bytes + body bytes + a fixed per-entry
//! overhead) against a configured budget, and expire on a TTL. Mutations
//! never block readers; size accounting is moka's and may lag briefly under
//! races, but cannot drift unboundedly.
//!
//! Invalidation is the caller's duty: a cancel, post, or moderation
//! approval must remove the affected message-id entry and the positional
//! entries of every affected group; watermark changes invalidate the
//! group-name entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::constants::cache::{ARTICLE_ENTRY_OVERHEAD, GROUP_ENTRY_OVERHEAD, SWEEP_INTERVAL};
use crate::models::{Newsgroup, ResolvedArticle};

/// Estimated byte cost of one cached article entry
fn article_weight(entry: &ResolvedArticle) -> u32 {
    let header_bytes: usize = entry
        .article
        .headers
        .iter()
        .map(|h| h.name.len() + h.value.len() + 4)
        .sum();
    (header_bytes + entry.article.body.len() + ARTICLE_ENTRY_OVERHEAD)
        .try_into()
        .unwrap_or(u32::MAX)
}

/// Cache statistics snapshot
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub article_entries: u64,
    pub group_entries: u64,
    pub weighted_bytes: u64,
    pub hit_rate: f64,
}

/// Concurrent cache over article and newsgroup lookups
#[derive(Clone)]
pub struct RetrievalCache {
    by_message_id: Cache<String, ResolvedArticle>,
    by_position: Cache<(String, u64), ResolvedArticle>,
    groups: Cache<String, Newsgroup>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl RetrievalCache {
    /// Build a cache with the given byte budget and entry TTL
    ///
    /// The budget covers the two article indexes; the group index gets a
    /// small fixed slice since group rows are tiny.
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        let article_budget = max_bytes / 2;
        let by_message_id = Cache::builder()
            .max_capacity(article_budget)
            .time_to_live(ttl)
            .weigher(|key: &String, entry: &ResolvedArticle| {
                article_weight(entry).saturating_add(key.len() as u32)
            })
            .build();
        let by_position = Cache::builder()
            .max_capacity(article_budget)
            .time_to_live(ttl)
            .weigher(|_key: &(String, u64), entry: &ResolvedArticle| article_weight(entry))
            .build();
        let groups = Cache::builder()
            .max_capacity((max_bytes / 16).max(64 * 1024))
            .time_to_live(ttl)
            .weigher(|key: &String, _entry: &Newsgroup| {
                (key.len() + GROUP_ENTRY_OVERHEAD).try_into().unwrap_or(u32::MAX)
            })
            .build();
        Self {
            by_message_id,
            by_position,
            groups,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lookup by the full `<…>` message-id string
    pub async fn article_by_message_id(&self, message_id: &str) -> Option<ResolvedArticle> {
        let result = self.by_message_id.get(message_id).await;
        self.record(result.is_some());
        result
    }

    /// Lookup by `(group, number)`
    pub async fn article_by_position(&self, group: &str, number: u64) -> Option<ResolvedArticle> {
        let result = self.by_position.get(&(group.to_string(), number)).await;
        self.record(result.is_some());
        result
    }

    /// Lookup a newsgroup by name
    pub async fn group(&self, name: &str) -> Option<Newsgroup> {
        let result = self.groups.get(name).await;
        self.record(result.is_some());
        result
    }

    /// Populate both article indexes from a store read
    pub async fn store_article(&self, resolved: &ResolvedArticle) {
        self.store_article_keyed(resolved, &resolved.link.group).await;
    }

    /// Populate with an explicit positional key group
    ///
    /// Metagroup reads key the positional index by the requested name
    /// (`local.test.deleted`) so they never collide with the reader view.
    pub async fn store_article_keyed(&self, resolved: &ResolvedArticle, group_key: &str) {
        self.by_message_id
            .insert(resolved.article.message_id.clone(), resolved.clone())
            .await;
        self.by_position
            .insert(
                (group_key.to_string(), resolved.link.number),
                resolved.clone(),
            )
            .await;
    }

    pub async fn store_group(&self, group: &Newsgroup) {
        self.groups.insert(group.name.clone(), group.clone()).await;
    }

    /// Drop the message-id entry and the given positional entries
    pub async fn invalidate_article(&self, message_id: &str, positions: &[(String, u64)]) {
        self.by_message_id.invalidate(message_id).await;
        for (group, number) in positions {
            self.by_position.invalidate(&(group.clone(), *number)).await;
        }
    }

    /// Drop a group-name entry (watermark or metadata change)
    pub async fn invalidate_group(&self, name: &str) {
        self.groups.invalidate(name).await;
    }

    /// Hit rate as a fraction in `[0, 1]`
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            article_entries: self.by_message_id.entry_count() + self.by_position.entry_count(),
            group_entries: self.groups.entry_count(),
            weighted_bytes: self.by_message_id.weighted_size()
                + self.by_position.weighted_size()
                + self.groups.weighted_size(),
            hit_rate: self.hit_rate(),
        }
    }

    /// Run pending maintenance (eviction, expiry) to completion
    ///
    /// Needed for deterministic tests; the sweeper calls this periodically.
    pub async fn sync(&self) {
        self.by_message_id.run_pending_tasks().await;
        self.by_position.run_pending_tasks().await;
        self.groups.run_pending_tasks().await;
    }

    /// Spawn the periodic expiry sweep
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                cache.sync().await;
                let stats = cache.stats().await;
                debug!(
                    entries = stats.article_entries + stats.group_entries,
                    weighted_bytes = stats.weighted_bytes,
                    hit_rate = format!("{:.1}%", stats.hit_rate * 100.0),
                    "cache sweep complete"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, ArticleNewsgroup, Header};
    use chrono::Utc;

    fn resolved(msgid: &str, group: &str, number: u64, body_len: usize) -> ResolvedArticle {
        ResolvedArticle {
            article: Arc::new(Article {
                message_id: msgid.to_string(),
                headers: vec![
                    Header::new("Subject", "test"),
                    Header::new("Message-ID", msgid),
                ],
                body: vec![b'x'; body_len],
                posted_at: Utc::now(),
            }),
            group: Newsgroup::new(group, "", "admin"),
            link: ArticleNewsgroup {
                message_id: msgid.to_string(),
                group: group.to_string(),
                number,
                cancelled: false,
                pending: false,
            },
        }
    }

    #[tokio::test]
    async fn test_store_populates_both_indexes() {
        let cache = RetrievalCache::new(1024 * 1024, Duration::from_secs(300));
        let entry = resolved("<a@x>", "local.test", 42, 100);
        cache.store_article(&entry).await;

        assert!(cache.article_by_message_id("<a@x>").await.is_some());
        assert!(cache.article_by_position("local.test", 42).await.is_some());
        assert!(cache.article_by_position("local.test", 43).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_article_clears_until_restore() {
        let cache = RetrievalCache::new(1024 * 1024, Duration::from_secs(300));
        let entry = resolved("<a@x>", "local.test", 1, 10);
        cache.store_article(&entry).await;

        cache
            .invalidate_article("<a@x>", &[("local.test".to_string(), 1)])
            .await;
        assert!(cache.article_by_message_id("<a@x>").await.is_none());
        assert!(cache.article_by_position("local.test", 1).await.is_none());

        // A subsequent store makes it visible again
        cache.store_article(&entry).await;
        assert!(cache.article_by_message_id("<a@x>").await.is_some());
    }

    #[tokio::test]
    async fn test_group_cache_and_invalidation() {
        let cache = RetrievalCache::new(1024 * 1024, Duration::from_secs(300));
        let group = Newsgroup::new("local.test", "desc", "admin");
        cache.store_group(&group).await;
        assert!(cache.group("local.test").await.is_some());

        cache.invalidate_group("local.test").await;
        assert!(cache.group("local.test").await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = RetrievalCache::new(1024 * 1024, Duration::from_millis(40));
        cache.store_article(&resolved("<e@x>", "local.test", 1, 10)).await;
        assert!(cache.article_by_message_id("<e@x>").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.sync().await;
        assert!(cache.article_by_message_id("<e@x>").await.is_none());
    }

    #[tokio::test]
    async fn test_byte_budget_evicts() {
        // Budget fits only a handful of 4KiB articles per index
        let cache = RetrievalCache::new(32 * 1024, Duration::from_secs(300));
        for i in 0..20 {
            cache
                .store_article(&resolved(&format!("<b{i}@x>"), "local.test", i, 4096))
                .await;
            cache.sync().await;
        }
        let stats = cache.stats().await;
        // Weighted size stays within budget plus racy-increment slack
        assert!(
            stats.weighted_bytes <= 32 * 1024 + 32 * 1024 / 10,
            "weighted bytes {} exceeds budget slack",
            stats.weighted_bytes
        );
    }

    #[tokio::test]
    async fn test_hit_rate_tracking() {
        let cache = RetrievalCache::new(1024 * 1024, Duration::from_secs(300));
        cache.store_article(&resolved("<h@x>", "local.test", 1, 10)).await;

        assert!(cache.article_by_message_id("<h@x>").await.is_some());
        assert!(cache.article_by_message_id("<miss@x>").await.is_none());
        let rate = cache.hit_rate();
        assert!(rate > 0.0 && rate < 1.0);
    }
}
