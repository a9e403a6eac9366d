//! In-memory reference implementation of the store contract
//!
//! Indexes mirror the hints in the store contract: message-id and group name
//! are `DashMap` point indexes, and crosspost links live in an ordered
//! `BTreeMap` keyed by `(group, number)` so range scans walk in number
//! order. Posts into the same group serialize on a per-group async mutex so
//! the `max + 1` number assignment never races.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::models::{Administrator, Article, ArticleNewsgroup, Newsgroup, ResolvedArticle};
use crate::wildmat::Wildmat;

use super::{GroupFilter, PendingLink, Storage, StorageError, Visibility};

#[derive(Default)]
pub struct MemoryStorage {
    groups: DashMap<String, Newsgroup>,
    articles: DashMap<String, Arc<Article>>,
    /// Ordered crosspost index: `(group, number)` → link
    links: RwLock<BTreeMap<(String, u64), ArticleNewsgroup>>,
    /// message-id → positions of its crosspost links
    msgid_links: DashMap<String, Vec<(String, u64)>>,
    admins: DashMap<String, Administrator>,
    /// Per-group post serialization for number assignment
    post_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal (startup seeding; usernames are unique)
    pub fn add_administrator(&self, admin: Administrator) {
        self.admins.insert(admin.username.clone(), admin);
    }

    /// Create a group if absent (startup bootstrap)
    pub fn add_newsgroup(&self, group: Newsgroup) {
        self.groups.entry(group.name.clone()).or_insert(group);
    }

    fn post_lock(&self, group: &str) -> Arc<Mutex<()>> {
        self.post_locks
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn links_read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<(String, u64), ArticleNewsgroup>>, StorageError>
    {
        self.links
            .read()
            .map_err(|_| StorageError::Unavailable("link index poisoned".to_string()))
    }

    fn links_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<(String, u64), ArticleNewsgroup>>, StorageError>
    {
        self.links
            .write()
            .map_err(|_| StorageError::Unavailable("link index poisoned".to_string()))
    }

    /// Reconcile a group's cached counters from its visible links
    fn reconcile_watermarks(
        &self,
        group: &str,
        links: &BTreeMap<(String, u64), ArticleNewsgroup>,
    ) {
        let mut count = 0u64;
        let mut lo = 0u64;
        let mut hi = 0u64;
        for (_, link) in links.range(range_bounds(group, 1, u64::MAX)) {
            if link.is_visible() {
                count += 1;
                if lo == 0 {
                    lo = link.number;
                }
                hi = link.number;
            }
        }
        if let Some(mut g) = self.groups.get_mut(group) {
            g.post_count = count;
            g.low_watermark = lo;
            g.high_watermark = hi;
        }
    }

    fn resolve(
        &self,
        link: &ArticleNewsgroup,
        group: Option<Newsgroup>,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        let Some(article) = self.articles.get(&link.message_id).map(|a| a.clone()) else {
            return Ok(None);
        };
        let group = match group {
            Some(g) => g,
            None => match self.groups.get(&link.group) {
                Some(g) => g.clone(),
                None => return Ok(None),
            },
        };
        Ok(Some(ResolvedArticle {
            article,
            group,
            link: link.clone(),
        }))
    }
}

fn range_bounds(
    group: &str,
    lo: u64,
    hi: u64,
) -> std::ops::RangeInclusive<(String, u64)> {
    (group.to_string(), lo)..=(group.to_string(), hi)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn newsgroup_by_name(&self, name: &str) -> Result<Option<Newsgroup>, StorageError> {
        Ok(self.groups.get(name).map(|g| g.clone()))
    }

    async fn article_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        let Some(positions) = self.msgid_links.get(message_id).map(|p| p.clone()) else {
            return Ok(None);
        };
        let links = self.links_read()?;
        for pos in positions {
            if let Some(link) = links.get(&pos)
                && link.is_visible()
            {
                let link = link.clone();
                drop(links);
                return self.resolve(&link, None);
            }
        }
        Ok(None)
    }

    async fn article_by_number(
        &self,
        group: &str,
        number: u64,
        vis: Visibility,
    ) -> Result<Option<ResolvedArticle>, StorageError> {
        let link = {
            let links = self.links_read()?;
            links
                .get(&(group.to_string(), number))
                .filter(|l| vis.admits(l))
                .cloned()
        };
        match link {
            Some(link) => self.resolve(&link, None),
            None => Ok(None),
        }
    }

    async fn articles_in_range(
        &self,
        group: &str,
        lo: u64,
        hi: u64,
        max: usize,
        vis: Visibility,
    ) -> Result<Vec<ResolvedArticle>, StorageError> {
        if hi < lo || max == 0 {
            return Ok(Vec::new());
        }
        let Some(group_row) = self.groups.get(group).map(|g| g.clone()) else {
            return Ok(Vec::new());
        };
        let selected: Vec<ArticleNewsgroup> = {
            let links = self.links_read()?;
            links
                .range(range_bounds(group, lo, hi))
                .map(|(_, l)| l)
                .filter(|l| vis.admits(l))
                .take(max)
                .cloned()
                .collect()
        };
        let mut out = Vec::with_capacity(selected.len());
        for link in &selected {
            if let Some(resolved) = self.resolve(link, Some(group_row.clone()))? {
                out.push(resolved);
            }
        }
        Ok(out)
    }

    async fn list_newsgroups(&self, filter: &GroupFilter) -> Result<Vec<Newsgroup>, StorageError> {
        let wildmat = filter.name_wildmat.as_deref().map(Wildmat::new);
        let mut out: Vec<Newsgroup> = self
            .groups
            .iter()
            .filter(|entry| {
                wildmat.as_ref().is_none_or(|w| w.matches(entry.key()))
                    && filter
                        .created_since
                        .is_none_or(|since| entry.value().created_at >= since)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn insert_article(
        &self,
        article: Article,
        groups: Vec<PendingLink>,
    ) -> Result<Vec<ArticleNewsgroup>, StorageError> {
        if self.articles.contains_key(&article.message_id) {
            return Err(StorageError::DuplicateMessageId(article.message_id));
        }

        // Acquire per-group locks in sorted order so concurrent crossposts
        // into overlapping group sets cannot deadlock.
        let mut names: Vec<&str> = groups.iter().map(|g| g.group.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        let mut held = Vec::with_capacity(names.len());
        for name in &names {
            held.push(self.post_lock(name).lock_owned().await);
        }

        let message_id = article.message_id.clone();
        let mut assigned = Vec::with_capacity(groups.len());
        {
            let mut links = self.links_write()?;
            // Re-check under the locks; a racing insert may have won
            if self.articles.contains_key(&message_id) {
                return Err(StorageError::DuplicateMessageId(message_id));
            }
            for pending in &groups {
                if !self.groups.contains_key(&pending.group) {
                    return Err(StorageError::NoSuchGroup(pending.group.clone()));
                }
                let next = links
                    .range(range_bounds(&pending.group, 1, u64::MAX))
                    .next_back()
                    .map(|((_, n), _)| *n)
                    .unwrap_or(0)
                    + 1;
                let link = ArticleNewsgroup {
                    message_id: message_id.clone(),
                    group: pending.group.clone(),
                    number: next,
                    cancelled: false,
                    pending: pending.pending,
                };
                links.insert((pending.group.clone(), next), link.clone());
                assigned.push(link);
            }
            self.articles.insert(message_id.clone(), Arc::new(article));
            self.msgid_links.insert(
                message_id.clone(),
                assigned.iter().map(|l| (l.group.clone(), l.number)).collect(),
            );
            for name in &names {
                self.reconcile_watermarks(name, &links);
            }
        }
        drop(held);
        Ok(assigned)
    }

    async fn update_link(&self, link: &ArticleNewsgroup) -> Result<(), StorageError> {
        let mut links = self.links_write()?;
        let key = (link.group.clone(), link.number);
        if !links.contains_key(&key) {
            return Err(StorageError::NoSuchGroup(link.group.clone()));
        }
        links.insert(key, link.clone());
        self.reconcile_watermarks(&link.group, &links);
        Ok(())
    }

    async fn update_article(&self, article: &Article) -> Result<(), StorageError> {
        self.articles
            .insert(article.message_id.clone(), Arc::new(article.clone()));
        Ok(())
    }

    async fn create_newsgroup(&self, group: Newsgroup) -> Result<(), StorageError> {
        self.groups.insert(group.name.clone(), group);
        Ok(())
    }

    async fn remove_newsgroup(&self, name: &str) -> Result<(), StorageError> {
        if self.groups.remove(name).is_none() {
            return Err(StorageError::NoSuchGroup(name.to_string()));
        }
        let removed: Vec<(String, u64)> = {
            let mut links = self.links_write()?;
            let keys: Vec<(String, u64)> = links
                .range(range_bounds(name, 0, u64::MAX))
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                links.remove(key);
            }
            keys
        };
        for (group, number) in removed {
            for mut entry in self.msgid_links.iter_mut() {
                entry
                    .value_mut()
                    .retain(|(g, n)| !(g == &group && *n == number));
            }
        }
        self.post_locks.remove(name);
        Ok(())
    }

    async fn update_newsgroup(&self, group: &Newsgroup) -> Result<(), StorageError> {
        match self.groups.get_mut(&group.name) {
            Some(mut existing) => {
                *existing = group.clone();
                Ok(())
            }
            None => Err(StorageError::NoSuchGroup(group.name.clone())),
        }
    }

    async fn administrators(&self) -> Result<Vec<Administrator>, StorageError> {
        Ok(self.admins.iter().map(|a| a.value().clone()).collect())
    }

    async fn links_for_message_id(
        &self,
        message_id: &str,
    ) -> Result<Vec<ArticleNewsgroup>, StorageError> {
        let Some(positions) = self.msgid_links.get(message_id).map(|p| p.clone()) else {
            return Ok(Vec::new());
        };
        let links = self.links_read()?;
        Ok(positions
            .iter()
            .filter_map(|pos| links.get(pos).cloned())
            .collect())
    }

    async fn article_record(&self, message_id: &str) -> Result<Option<Article>, StorageError> {
        Ok(self.articles.get(message_id).map(|a| (**a).clone()))
    }
}
