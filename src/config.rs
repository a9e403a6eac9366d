//! Configuration loading and validation
//!
//! TOML file with listeners, cache tuning, TLS paths, administrators, and
//! bootstrap newsgroups. A default file is written on first run.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::constants::{cache, session};
use crate::models::Administrator;
use crate::types::GroupName;

/// How a listener treats the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Plain TCP
    Cleartext,
    /// TLS handshake before the greeting
    ImplicitTls,
    /// Cleartext start, STARTTLS upgrade available
    ExplicitTls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bind address, e.g. `0.0.0.0:119`
    pub addr: String,
    pub transport: Transport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Host injected into Path and synthesized moderator mailboxes
    pub hostname: String,
    #[serde(default = "default_posting_allowed")]
    pub posting_allowed: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_posting_allowed() -> bool {
    true
}

fn default_max_sessions() -> usize {
    session::DEFAULT_MAX_SESSIONS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_bytes() -> u64 {
    cache::DEFAULT_MAX_BYTES
}

fn default_cache_ttl_secs() -> u64 {
    cache::DEFAULT_TTL.as_secs()
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_bytes: default_cache_bytes(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheSection {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSection {
    pub cert_path: String,
    pub key_path: String,
}

/// A group created at startup if it does not already exist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub moderated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerSection,
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSection>,
    #[serde(default)]
    pub administrators: Vec<Administrator>,
    #[serde(default)]
    pub newsgroups: Vec<BootstrapGroup>,
}

impl Config {
    /// Reject configurations that cannot possibly serve
    pub fn validate(&self) -> Result<()> {
        if self.listeners.is_empty() {
            bail!("no listeners configured");
        }
        if self.server.max_sessions == 0 {
            bail!("max_sessions must be at least 1");
        }
        if self.server.hostname.is_empty() {
            bail!("server.hostname must be set");
        }
        let mut seen = std::collections::HashSet::new();
        for listener in &self.listeners {
            if !seen.insert(listener.addr.as_str()) {
                bail!("duplicate listener address {}", listener.addr);
            }
            listener
                .addr
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("invalid listener address {}", listener.addr))?;
            if listener.transport != Transport::Cleartext && self.tls.is_none() {
                bail!(
                    "listener {} requires TLS but no [tls] section is configured",
                    listener.addr
                );
            }
        }
        for group in &self.newsgroups {
            GroupName::new(group.name.as_str())
                .with_context(|| format!("invalid bootstrap newsgroup {}", group.name))?;
        }
        Ok(())
    }
}

/// Load and validate a configuration file
pub fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    let config: Config =
        toml::from_str(&text).with_context(|| format!("failed to parse config file {path}"))?;
    config.validate()?;
    Ok(config)
}

/// The configuration written on first run
#[must_use]
pub fn create_default_config() -> Config {
    Config {
        server: ServerSection {
            hostname: "news.example.com".to_string(),
            posting_allowed: true,
            max_sessions: session::DEFAULT_MAX_SESSIONS,
        },
        listeners: vec![ListenerConfig {
            addr: "0.0.0.0:1119".to_string(),
            transport: Transport::Cleartext,
        }],
        cache: CacheSection::default(),
        tls: None,
        administrators: Vec::new(),
        newsgroups: vec![BootstrapGroup {
            name: "local.test".to_string(),
            description: "Local test group".to_string(),
            moderated: false,
        }],
    }
}
