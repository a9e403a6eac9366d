//! Body blob store: large bodies kept outside the metadata store
//!
//! The contract is a pure function from message-id to filesystem path plus
//! read/write primitives. Paths use a two-level fan-out over the hex
//! encoding of the local part's first two octets; hex is case-folded to
//! lowercase, so two message-ids that differ only in case still map to
//! distinct paths on case-insensitive file systems (the full local part is
//! itself hex-encoded in the leaf name).

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::types::MessageId;

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic path for a message-id's body
    ///
    /// Layout: `<root>/<hh>/<hh>/<hex(local)>@<host>` where `hh` are the hex
    /// pairs of the local part's first two octets (`00` when absent).
    #[must_use]
    pub fn path_for(&self, message_id: &MessageId) -> PathBuf {
        let local = message_id.local_part();
        let host = message_id
            .without_brackets()
            .split_once('@')
            .map(|(_, h)| h)
            .unwrap_or("");

        let bytes = local.as_bytes();
        let first = bytes.first().copied().unwrap_or(0);
        let second = bytes.get(1).copied().unwrap_or(0);

        let mut leaf = hex::encode(local);
        leaf.push('@');
        // Hosts are case-insensitive per RFC 5536; fold for stable paths
        leaf.push_str(&host.to_ascii_lowercase());

        self.root
            .join(hex::encode([first]))
            .join(hex::encode([second]))
            .join(leaf)
    }

    /// Write a body, creating fan-out directories as needed
    pub async fn write(&self, message_id: &MessageId, body: &[u8]) -> std::io::Result<()> {
        let path = self.path_for(message_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, body).await
    }

    /// Read a body; `Ok(None)` when no blob exists for this id
    pub async fn read(&self, message_id: &MessageId) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(message_id)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a body if present
    pub async fn remove(&self, message_id: &MessageId) -> std::io::Result<()> {
        match fs::remove_file(self.path_for(message_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
