//! Constants used throughout the archive server
//!
//! This module centralizes magic numbers and configuration values
//! to improve maintainability and reduce duplication.

use std::time::Duration;

/// Buffer size constants
pub mod buffer {
    /// Maximum length of a single command line (RFC 3977 allows 512 octets;
    /// we accept a little more before declaring a syntax error)
    pub const MAX_COMMAND_LINE: usize = 4096;

    /// Read chunk size for the command/article reader
    pub const READ_CHUNK: usize = 8192;

    /// Maximum size of an inbound article (headers + body)
    pub const MAX_ARTICLE_SIZE: usize = 8 * 1024 * 1024;

    /// Initial capacity for multi-line response assembly
    pub const RESPONSE_INITIAL_CAPACITY: usize = 8192;
}

/// Timeout constants
pub mod timeout {
    use super::Duration;

    /// Idle timeout waiting for the next command from a client
    pub const COMMAND_READ: Duration = Duration::from_secs(600);

    /// Timeout for receiving a complete article after `340`
    pub const ARTICLE_RECEIVE: Duration = Duration::from_secs(120);

    /// Timeout for the TLS handshake on implicit-TLS ports
    pub const TLS_HANDSHAKE: Duration = Duration::from_secs(30);
}

/// NNTP protocol constants
pub mod protocol {
    /// Multiline payload terminator: "\r\n.\r\n"
    pub const MULTILINE_TERMINATOR: &[u8] = b"\r\n.\r\n";

    /// Line ending: "\r\n"
    pub const CRLF: &[u8] = b"\r\n";

    /// Length of the metagroup suffixes ".deleted" and ".pending"
    pub const METAGROUP_SUFFIX_LEN: usize = 8;
}

/// Cache constants
pub mod cache {
    use super::Duration;

    /// Default cache budget in bytes
    pub const DEFAULT_MAX_BYTES: u64 = 256 * 1024 * 1024;

    /// Default entry time-to-live
    pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

    /// Interval between expiry sweeps
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Fixed per-entry overhead added to an article's estimated size
    pub const ARTICLE_ENTRY_OVERHEAD: usize = 1024;

    /// Fixed per-entry overhead added to a newsgroup's estimated size
    pub const GROUP_ENTRY_OVERHEAD: usize = 512;
}

/// Session constants
pub mod session {
    /// Default cap on concurrent sessions across all listeners
    pub const DEFAULT_MAX_SESSIONS: usize = 1000;

    /// Cap on results returned by a single bulk range scan
    pub const MAX_RANGE_RESULTS: usize = 10_000;
}
