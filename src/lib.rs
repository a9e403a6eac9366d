//! # NNTP Archive Server
//!
//! An NNTP (RFC 3977) server that stores articles in persistent storage,
//! exposes them over a line-oriented TCP protocol (optionally wrapped in
//! TLS), and serves concurrent reader and poster clients.
//!
//! ## Architecture
//!
//! - **protocol**: wire codec (line framing, dot-stuffing, GZIP framing),
//!   command parsing, response constants
//! - **storage**: the store contract, the in-memory reference backend, and
//!   the body blob store
//! - **cache**: byte-weighted TTL caches indexed by message-id,
//!   `(group, number)`, and group name
//! - **retriever**: cache-first reads with visibility filters and the
//!   `.deleted`/`.pending` metagroup views
//! - **poster**: inbound article validation, header hygiene, per-group
//!   number assignment, control messages
//! - **session**: the per-connection state machine and command handlers
//! - **server**: listeners, bounded accept loops, graceful shutdown
//!
//! Data flows listener → session → dispatcher → handler → retriever →
//! cache → store, and back out through the codec.

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod poster;
pub mod protocol;
pub mod retriever;
pub mod server;
pub mod session;
pub mod storage;
pub mod stream;
pub mod tls;
pub mod types;
pub mod wildmat;

pub use config::{Config, create_default_config, load_config};
