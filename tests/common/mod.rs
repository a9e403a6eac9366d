//! Shared fixtures: a seeded store, a session over a duplex pipe, and a
//! line-oriented test client.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};

use nntp_archive::auth::{AuthManager, generate_salt, hash_password};
use nntp_archive::cache::RetrievalCache;
use nntp_archive::models::{Administrator, Article, Header, Newsgroup};
use nntp_archive::poster::Poster;
use nntp_archive::retriever::Retriever;
use nntp_archive::session::{ClientSession, SessionContext};
use nntp_archive::storage::{MemoryStorage, PendingLink, Storage};
use nntp_archive::stream::ConnectionStream;

pub const TEST_HOST: &str = "archive.test";

/// Build an administrator with the given password and capability tweaks
pub fn make_admin(
    username: &str,
    password: &str,
    configure: impl FnOnce(&mut Administrator),
) -> Administrator {
    let salt = generate_salt();
    let mut admin = Administrator {
        username: username.to_string(),
        password_hash: hash_password(&salt, password),
        password_salt: salt,
        can_approve_any: false,
        can_cancel: false,
        can_inject: false,
        can_create_group: false,
        can_delete_group: false,
        can_check_groups: false,
        local_authentication_only: false,
        moderates: Vec::new(),
    };
    configure(&mut admin);
    admin
}

pub fn make_article(msgid: &str, groups: &str, subject: &str, body: &str) -> Article {
    Article {
        message_id: msgid.to_string(),
        headers: vec![
            Header::new("Date", "Mon, 01 Jan 2024 00:00:00 +0000"),
            Header::new("From", "poster@example.com"),
            Header::new("Subject", subject),
            Header::new("Newsgroups", groups),
            Header::new("Message-ID", msgid),
            Header::new("Path", TEST_HOST),
        ],
        body: body.as_bytes().to_vec(),
        posted_at: Utc::now(),
    }
}

/// Store an article into a single group, returning its assigned number
pub async fn seed_article(store: &MemoryStorage, msgid: &str, group: &str, body: &str) -> u64 {
    let links = store
        .insert_article(
            make_article(msgid, group, "seeded", body),
            vec![PendingLink {
                group: group.to_string(),
                pending: false,
            }],
        )
        .await
        .unwrap();
    links[0].number
}

pub struct TestServer {
    pub store: Arc<MemoryStorage>,
    pub ctx: Arc<SessionContext>,
}

impl TestServer {
    /// A store with `local.test` plus any extra administrators
    pub async fn new(admins: Vec<Administrator>) -> Self {
        Self::with_posting(admins, true).await
    }

    pub async fn with_posting(admins: Vec<Administrator>, posting_allowed: bool) -> Self {
        let store = Arc::new(MemoryStorage::new());
        store.add_newsgroup(Newsgroup::new("local.test", "Test group", "admin"));
        for admin in &admins {
            store.add_administrator(admin.clone());
        }

        let cache = Arc::new(RetrievalCache::new(
            16 * 1024 * 1024,
            std::time::Duration::from_secs(300),
        ));
        let storage: Arc<dyn Storage> = store.clone();
        let ctx = Arc::new(SessionContext {
            retriever: Retriever::new(storage.clone(), cache.clone()),
            poster: Poster::new(storage.clone(), cache, TEST_HOST.to_string()),
            auth: AuthManager::new(admins),
            posting_allowed,
            tls_acceptor: None,
        });
        Self { store, ctx }
    }

    /// Open a client connection; the greeting is left unread
    pub async fn connect(&self) -> TestClient {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let session = ClientSession::new("127.0.0.1:45119".parse().unwrap(), self.ctx.clone());
        tokio::spawn(session.run(ConnectionStream::plain(server_side)));

        let (read_half, write_half) = tokio::io::split(client_side);
        TestClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Connect and consume the greeting
    pub async fn connect_ready(&self) -> TestClient {
        let mut client = self.connect().await;
        let greeting = client.read_line().await;
        assert!(greeting.starts_with("200") || greeting.starts_with("201"));
        client
    }
}

pub struct TestClient {
    reader: BufReader<ReadHalf<tokio::io::DuplexStream>>,
    writer: WriteHalf<tokio::io::DuplexStream>,
}

impl TestClient {
    pub async fn send(&mut self, command: &str) {
        self.writer.write_all(command.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Read one CRLF-terminated line, stripped
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            self.reader.read_line(&mut line),
        )
        .await
        .expect("read timed out")
        .expect("read failed");
        assert!(n > 0, "connection closed while expecting a line");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Read dot-terminated payload lines (terminator excluded, unstuffed)
    pub async fn read_multiline(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await;
            if line == "." {
                return lines;
            }
            // Undo dot-stuffing
            let line = match line.strip_prefix("..") {
                Some(rest) => format!(".{rest}"),
                None => line,
            };
            lines.push(line);
        }
    }

    /// Send a command and expect a single-line response
    pub async fn roundtrip(&mut self, command: &str) -> String {
        self.send(command).await;
        self.read_line().await
    }

    /// Drain everything until the server closes the stream
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        use tokio::io::AsyncReadExt;
        let mut out = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            self.reader.read_to_end(&mut out),
        )
        .await
        .expect("read timed out")
        .expect("read failed");
        out
    }
}
