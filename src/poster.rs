//! Inbound article processing and control-message execution
//!
//! The poster receives the dot-unstuffed payload accumulated after `340`,
//! parses and validates it, applies capability-gated header hygiene, assigns
//! per-group sequence numbers through the store, and executes any control
//! message once the article is persisted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::RetrievalCache;
use crate::models::{Administrator, Article, ArticleNewsgroup, Header, Newsgroup};
use crate::storage::{PendingLink, Storage, StorageError};
use crate::types::MessageId;

/// How the session must answer a completed POST
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// `240 Article received OK`
    Accepted,
    /// `441 Posting failed`
    Rejected,
    /// `480`: control message without the matching capability
    ControlForbidden,
}

/// Split a raw article into its header block and body at the first blank line
fn split_payload(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        (&raw[..pos], &raw[pos + 4..])
    } else {
        (raw, &[][..])
    }
}

/// Parse a header block into ordered, unfolded fields
///
/// Continuation lines (leading space or tab) fold into the previous value
/// with a single space. A line without a colon aborts the parse.
fn parse_header_block(block: &str) -> Option<Vec<Header>> {
    let mut headers: Vec<Header> = Vec::new();
    for line in block.split("\r\n").filter(|l| !l.is_empty()) {
        if line.starts_with(' ') || line.starts_with('\t') {
            let last = headers.last_mut()?;
            if !last.value.is_empty() {
                last.value.push(' ');
            }
            last.value.push_str(line.trim_start());
        } else {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name.contains(' ') {
                return None;
            }
            headers.push(Header::new(name, value.trim()));
        }
    }
    Some(headers)
}

/// Parse a complete raw payload into an [`Article`], validating the
/// required headers (Date, From, Subject, Newsgroups, Message-ID, Path)
pub fn parse_article(raw: &[u8]) -> Option<Article> {
    let (header_bytes, body) = split_payload(raw);
    let header_text = std::str::from_utf8(header_bytes).ok()?;
    let headers = parse_header_block(header_text)?;

    let article = Article {
        message_id: String::new(),
        headers,
        body: body.to_vec(),
        posted_at: Utc::now(),
    };

    for required in ["Date", "From", "Subject", "Newsgroups", "Message-ID", "Path"] {
        if article.header(required).is_none_or(str::is_empty) {
            return None;
        }
    }
    let message_id = MessageId::new(article.header("Message-ID")?).ok()?;
    if article.newsgroups().is_empty() {
        return None;
    }

    Some(Article {
        message_id: message_id.as_str().to_string(),
        ..article
    })
}

/// The control verbs a posted article may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlVerb {
    Cancel,
    NewGroup,
    RmGroup,
    CheckGroups,
}

impl ControlVerb {
    fn parse(value: &str) -> Option<Self> {
        match value.split_ascii_whitespace().next()? {
            v if v.eq_ignore_ascii_case("cancel") => Some(Self::Cancel),
            v if v.eq_ignore_ascii_case("newgroup") => Some(Self::NewGroup),
            v if v.eq_ignore_ascii_case("rmgroup") => Some(Self::RmGroup),
            v if v.eq_ignore_ascii_case("checkgroups") => Some(Self::CheckGroups),
            _ => None,
        }
    }

    fn permitted(self, identity: &Administrator) -> bool {
        match self {
            Self::Cancel => identity.can_cancel,
            Self::NewGroup => identity.can_create_group,
            Self::RmGroup => identity.can_delete_group,
            Self::CheckGroups => identity.can_check_groups,
        }
    }
}

#[derive(Clone)]
pub struct Poster {
    storage: Arc<dyn Storage>,
    cache: Arc<RetrievalCache>,
    /// Host used for Xref and synthesized moderator mailboxes
    path_host: String,
}

impl Poster {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<RetrievalCache>, path_host: String) -> Self {
        Self {
            storage,
            cache,
            path_host,
        }
    }

    /// Process a complete, dot-unstuffed article payload
    pub async fn submit(
        &self,
        raw: &[u8],
        identity: Option<&Administrator>,
    ) -> Result<PostOutcome, StorageError> {
        let Some(mut article) = parse_article(raw) else {
            debug!("post rejected: parse or validation failure");
            return Ok(PostOutcome::Rejected);
        };

        // Permission gate: no anonymous control messages, and the verb must
        // match a capability the identity holds.
        let control = article.header("Control").map(str::to_string);
        let control_verb = match &control {
            Some(value) => match ControlVerb::parse(value) {
                Some(verb) => {
                    let allowed = identity.map(|a| verb.permitted(a)).unwrap_or(false);
                    if !allowed {
                        return Ok(PostOutcome::ControlForbidden);
                    }
                    Some(verb)
                }
                None => {
                    debug!("post rejected: unrecognized control verb");
                    return Ok(PostOutcome::Rejected);
                }
            },
            None => None,
        };

        let targets: Vec<String> = article.newsgroups().iter().map(|s| s.to_string()).collect();
        self.apply_header_hygiene(&mut article, identity, &targets);

        // Route into each resolvable target group; unknown groups are
        // skipped rather than failing the whole post.
        let mut links: Vec<PendingLink> = Vec::new();
        let mut approved_in_place = false;
        for name in &targets {
            let Some(group) = self.storage.newsgroup_by_name(name).await? else {
                debug!(group = %name, "skipping unknown newsgroup in post");
                continue;
            };
            let can_approve = identity.map(|a| a.can_approve_for(name)).unwrap_or(false);

            if can_approve
                && let Some(moderator) = identity
                && self.try_moderation_approval(&article, &group, moderator).await?
            {
                approved_in_place = true;
                continue;
            }

            links.push(PendingLink {
                group: group.name.clone(),
                pending: group.moderated && !can_approve,
            });
        }

        let mut assigned: Vec<ArticleNewsgroup> = Vec::new();
        if !links.is_empty() {
            match self.storage.insert_article(article.clone(), links).await {
                Ok(links) => assigned = links,
                Err(StorageError::DuplicateMessageId(id)) => {
                    debug!(message_id = %id, "post rejected: duplicate message-id");
                    return Ok(PostOutcome::Rejected);
                }
                Err(e) => return Err(e),
            }
            for link in &assigned {
                self.cache.invalidate_group(&link.group).await;
            }
            info!(
                message_id = %article.message_id,
                groups = assigned.len(),
                "article accepted"
            );
        } else if !approved_in_place {
            debug!(message_id = %article.message_id, "post matched no known groups");
        }

        if let Some(verb) = control_verb {
            self.execute_control(verb, &article, &assigned).await?;
        }

        Ok(PostOutcome::Accepted)
    }

    /// Header hygiene applied by the server before storage
    fn apply_header_hygiene(
        &self,
        article: &mut Article,
        identity: Option<&Administrator>,
        targets: &[String],
    ) {
        let can_approve_some = identity
            .map(|a| targets.iter().any(|g| a.can_approve_for(g)))
            .unwrap_or(false);
        if !can_approve_some {
            article.remove_header("Approved");
        }
        if !identity.map(|a| a.can_cancel).unwrap_or(false) {
            article.remove_header("Supersedes");
        }
        if !identity.map(|a| a.can_inject).unwrap_or(false) {
            article.set_header("Injection-Date", Utc::now().to_rfc2822());
            article.remove_header("Injection-Info");
            article.remove_header("Xref");
            let followup = article.header("Followup-To").map(str::to_string);
            let newsgroups = article.header("Newsgroups").map(str::to_string);
            if followup.is_some() && followup == newsgroups {
                article.remove_header("Followup-To");
            }
        }
    }

    /// Moderator approval shortcut: an APPROVE(D) body referencing a pending
    /// article flips its pending flag instead of creating a new record
    async fn try_moderation_approval(
        &self,
        article: &Article,
        group: &Newsgroup,
        moderator: &Administrator,
    ) -> Result<bool, StorageError> {
        let body_approves = article.body.starts_with(b"APPROVE\r\n")
            || article.body.starts_with(b"APPROVED\r\n");
        let references = article.header("References").unwrap_or("");
        if !body_approves || references.is_empty() {
            return Ok(false);
        }
        // The most recent reference is the article being approved
        let Some(target_id) = references.split_ascii_whitespace().next_back() else {
            return Ok(false);
        };

        let links = self.storage.links_for_message_id(target_id).await?;
        let Some(pending_link) = links
            .iter()
            .find(|l| l.group == group.name && l.pending)
            .cloned()
        else {
            return Ok(false);
        };

        let Some(mut target) = self.storage.article_record(target_id).await? else {
            return Ok(false);
        };

        let mailbox = moderator
            .username
            .contains('@')
            .then(|| moderator.username.clone())
            .unwrap_or_else(|| format!("{}@{}", moderator.username, self.path_host));
        target.set_header("Approved", mailbox);
        self.storage.update_article(&target).await?;

        let mut approved = pending_link.clone();
        approved.pending = false;
        self.storage.update_link(&approved).await?;

        self.invalidate_positions(target_id, &links).await;
        self.cache.invalidate_group(&group.name).await;
        info!(message_id = %target_id, group = %group.name, "pending article approved");
        Ok(true)
    }

    async fn invalidate_positions(&self, message_id: &str, links: &[ArticleNewsgroup]) {
        let mut positions = Vec::with_capacity(links.len() * 3);
        for link in links {
            positions.push((link.group.clone(), link.number));
            positions.push((format!("{}.deleted", link.group), link.number));
            positions.push((format!("{}.pending", link.group), link.number));
        }
        self.cache.invalidate_article(message_id, &positions).await;
    }

    /// Apply the control action once the carrying article is persisted
    async fn execute_control(
        &self,
        verb: ControlVerb,
        article: &Article,
        own_links: &[ArticleNewsgroup],
    ) -> Result<(), StorageError> {
        let value = article.header("Control").unwrap_or("");
        let mut tokens = value.split_ascii_whitespace().skip(1);
        match verb {
            ControlVerb::Cancel => {
                let Some(target_id) = tokens.next() else {
                    warn!("cancel control without a target message-id");
                    return Ok(());
                };
                self.execute_cancel(target_id, article, own_links).await
            }
            ControlVerb::NewGroup => {
                let Some(name) = tokens.next() else {
                    warn!("newgroup control without a group name");
                    return Ok(());
                };
                let moderated = tokens.next().is_some_and(|t| t.eq_ignore_ascii_case("moderated"));
                self.execute_newgroup(name, moderated, article).await
            }
            ControlVerb::RmGroup => {
                let Some(name) = tokens.next() else {
                    warn!("rmgroup control without a group name");
                    return Ok(());
                };
                self.execute_rmgroup(name).await
            }
            ControlVerb::CheckGroups => self.execute_checkgroups(article).await,
        }
    }

    async fn execute_cancel(
        &self,
        target_id: &str,
        cancel_article: &Article,
        own_links: &[ArticleNewsgroup],
    ) -> Result<(), StorageError> {
        let target_groups: Vec<&str> = cancel_article.newsgroups();
        let target_links = self.storage.links_for_message_id(target_id).await?;
        let mut touched = Vec::new();
        for link in &target_links {
            if !target_groups.iter().any(|g| *g == link.group) {
                continue;
            }
            if link.cancelled {
                continue;
            }
            let mut cancelled = link.clone();
            cancelled.cancelled = true;
            self.storage.update_link(&cancelled).await?;
            touched.push(cancelled);
        }

        // The cancel article itself is not kept visible either
        for link in own_links {
            let mut cancelled = link.clone();
            cancelled.cancelled = true;
            self.storage.update_link(&cancelled).await?;
        }

        self.invalidate_positions(target_id, &target_links).await;
        self.invalidate_positions(&cancel_article.message_id, own_links)
            .await;
        for link in touched.iter().chain(own_links) {
            self.cache.invalidate_group(&link.group).await;
        }
        info!(message_id = %target_id, links = touched.len(), "cancel applied");
        Ok(())
    }

    async fn execute_newgroup(
        &self,
        name: &str,
        moderated: bool,
        article: &Article,
    ) -> Result<(), StorageError> {
        if self.storage.newsgroup_by_name(name).await?.is_some() {
            debug!(group = %name, "newgroup for existing group ignored");
            return Ok(());
        }
        let description = description_from_body(&article.body, name).unwrap_or_default();
        let creator = article.header("From").unwrap_or("").to_string();
        let mut group = Newsgroup::new(name, description, creator);
        group.moderated = moderated;
        self.storage.create_newsgroup(group).await?;
        self.cache.invalidate_group(name).await;
        info!(group = %name, moderated, "newsgroup created by control message");
        Ok(())
    }

    async fn execute_rmgroup(&self, name: &str) -> Result<(), StorageError> {
        match self.storage.remove_newsgroup(name).await {
            Ok(()) => {
                self.cache.invalidate_group(name).await;
                info!(group = %name, "newsgroup removed by control message");
                Ok(())
            }
            Err(StorageError::NoSuchGroup(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// `checkgroups`: body lines of `group description`; listed groups get
    /// their descriptions replaced, missing ones are created, unlisted ones
    /// are left alone
    async fn execute_checkgroups(&self, article: &Article) -> Result<(), StorageError> {
        let body = String::from_utf8_lossy(&article.body);
        let creator = article.header("From").unwrap_or("").to_string();
        for line in body.lines() {
            let line = line.trim();
            let Some((name, description)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if !name.contains('.') {
                continue;
            }
            let description = description.trim();
            match self.storage.newsgroup_by_name(name).await? {
                Some(mut group) => {
                    if group.description != description {
                        group.description = description.to_string();
                        self.storage.update_newsgroup(&group).await?;
                        self.cache.invalidate_group(name).await;
                    }
                }
                None => {
                    self.storage
                        .create_newsgroup(Newsgroup::new(name, description, creator.clone()))
                        .await?;
                    self.cache.invalidate_group(name).await;
                }
            }
        }
        info!("checkgroups applied");
        Ok(())
    }
}

/// Pull a description for `group` out of a newgroup body
///
/// Accepts the conventional `For your newsgroups file:` form as well as a
/// bare `group description` first line.
fn description_from_body(body: &[u8], group: &str) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(group) {
            let rest = rest.trim_start_matches(['\t', ' ']).trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_payload() {
        let (h, b) = split_payload(b"A: 1\r\nB: 2\r\n\r\nbody\r\n");
        assert_eq!(h, b"A: 1\r\nB: 2");
        assert_eq!(b, b"body\r\n");

        let (h, b) = split_payload(b"A: 1\r\n");
        assert_eq!(h, b"A: 1\r\n");
        assert_eq!(b, b"");
    }

    #[test]
    fn test_parse_header_block_folding() {
        let headers = parse_header_block("Subject: a long\r\n subject line\r\nFrom: x@y").unwrap();
        assert_eq!(headers[0].value, "a long subject line");
        assert_eq!(headers[1].name, "From");
    }

    #[test]
    fn test_parse_header_block_rejects_garbage() {
        assert!(parse_header_block("no colon here").is_none());
        assert!(parse_header_block(" leading continuation").is_none());
        assert!(parse_header_block("Bad Name: value").is_none());
    }

    fn raw_article(msgid: &str, groups: &str, extra: &str, body: &str) -> Vec<u8> {
        format!(
            "Date: Mon, 01 Jan 2024 00:00:00 +0000\r\nFrom: poster@example.com\r\n\
             Subject: test\r\nNewsgroups: {groups}\r\nMessage-ID: {msgid}\r\n\
             Path: archive.example.com\r\n{extra}\r\n{body}"
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_article_ok() {
        let raw = raw_article("<ok@x>", "local.test", "", "hello\r\n");
        let article = parse_article(&raw).unwrap();
        assert_eq!(article.message_id, "<ok@x>");
        assert_eq!(article.newsgroups(), vec!["local.test"]);
        assert_eq!(article.body, b"hello\r\n");
    }

    #[test]
    fn test_parse_article_missing_required_header() {
        let raw = b"From: a@b\r\nSubject: s\r\n\r\nbody\r\n".to_vec();
        assert!(parse_article(&raw).is_none());
    }

    #[test]
    fn test_parse_article_bad_message_id() {
        let raw = raw_article("not-an-id", "local.test", "", "x\r\n");
        assert!(parse_article(&raw).is_none());
    }

    #[test]
    fn test_control_verb_parse_and_permissions() {
        assert_eq!(ControlVerb::parse("cancel <a@x>"), Some(ControlVerb::Cancel));
        assert_eq!(ControlVerb::parse("NEWGROUP x.y"), Some(ControlVerb::NewGroup));
        assert_eq!(ControlVerb::parse("bogus x"), None);

        let mut admin = Administrator {
            username: "op".to_string(),
            password_salt: String::new(),
            password_hash: String::new(),
            can_approve_any: false,
            can_cancel: true,
            can_inject: false,
            can_create_group: false,
            can_delete_group: false,
            can_check_groups: false,
            local_authentication_only: false,
            moderates: Vec::new(),
        };
        assert!(ControlVerb::Cancel.permitted(&admin));
        assert!(!ControlVerb::NewGroup.permitted(&admin));
        admin.can_create_group = true;
        assert!(ControlVerb::NewGroup.permitted(&admin));
    }

    #[test]
    fn test_description_from_body() {
        let body = b"For your newsgroups file:\r\nlocal.chat\tTalk about anything\r\n";
        assert_eq!(
            description_from_body(body, "local.chat").as_deref(),
            Some("Talk about anything")
        );
        assert_eq!(description_from_body(b"", "local.chat"), None);
    }
}
