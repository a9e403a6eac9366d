//! Administrator authentication
//!
//! Credentials are salted SHA-256 hashes; the stored forms are hex. The
//! AUTHINFO USER/PASS sequencing itself lives in the session handlers; this
//! module only answers "do these credentials match a principal, from this
//! peer address".

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::Administrator;
use crate::storage::{Storage, StorageError};

/// Hash a password with a hex salt: `hex(sha256(salt_bytes || password))`
#[must_use]
pub fn hash_password(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    match hex::decode(salt_hex) {
        Ok(salt) => hasher.update(&salt),
        // A non-hex salt still salts; hash its raw bytes
        Err(_) => hasher.update(salt_hex.as_bytes()),
    }
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh random salt, hex-encoded
#[must_use]
pub fn generate_salt() -> String {
    hex::encode(uuid::Uuid::new_v4().as_bytes())
}

/// Outcome of a credential check
///
/// Deliberately two-valued: callers must not learn (or leak) which field
/// failed.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Accepted(Box<Administrator>),
    Rejected,
}

/// Validates credentials against the administrator table
#[derive(Clone)]
pub struct AuthManager {
    admins: Arc<HashMap<String, Administrator>>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("admins", &self.admins.len())
            .finish()
    }
}

impl AuthManager {
    pub fn new(admins: Vec<Administrator>) -> Self {
        let mut map = HashMap::with_capacity(admins.len());
        for admin in admins {
            if map.insert(admin.username.clone(), admin).is_some() {
                warn!("duplicate administrator username; keeping the last entry");
            }
        }
        Self {
            admins: Arc::new(map),
        }
    }

    /// Load the administrator table once at startup
    pub async fn from_storage(storage: &dyn Storage) -> Result<Self, StorageError> {
        Ok(Self::new(storage.administrators().await?))
    }

    /// Check credentials from the given peer address
    ///
    /// A `LocalAuthenticationOnly` principal authenticating from a
    /// non-loopback address is rejected exactly like a bad password.
    #[must_use]
    pub fn verify(&self, username: &str, password: &str, peer: IpAddr) -> AuthOutcome {
        let Some(admin) = self.admins.get(username) else {
            return AuthOutcome::Rejected;
        };
        if admin.local_authentication_only && !peer.is_loopback() {
            return AuthOutcome::Rejected;
        }
        let candidate = hash_password(&admin.password_salt, password);
        if constant_time_eq(candidate.as_bytes(), admin.password_hash.as_bytes()) {
            AuthOutcome::Accepted(Box::new(admin.clone()))
        } else {
            AuthOutcome::Rejected
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

/// Compare hex digests without early exit on the first mismatched byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn admin(username: &str, password: &str, local_only: bool) -> Administrator {
        let salt = generate_salt();
        Administrator {
            username: username.to_string(),
            password_hash: hash_password(&salt, password),
            password_salt: salt,
            can_approve_any: false,
            can_cancel: false,
            can_inject: false,
            can_create_group: false,
            can_delete_group: false,
            can_check_groups: false,
            local_authentication_only: local_only,
            moderates: Vec::new(),
        }
    }

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));

    #[test]
    fn test_accepts_valid_credentials() {
        let mgr = AuthManager::new(vec![admin("alice", "s3cret", false)]);
        assert!(matches!(
            mgr.verify("alice", "s3cret", REMOTE),
            AuthOutcome::Accepted(_)
        ));
    }

    #[test]
    fn test_rejects_bad_password_and_unknown_user() {
        let mgr = AuthManager::new(vec![admin("alice", "s3cret", false)]);
        assert!(matches!(
            mgr.verify("alice", "wrong", REMOTE),
            AuthOutcome::Rejected
        ));
        assert!(matches!(
            mgr.verify("bob", "s3cret", REMOTE),
            AuthOutcome::Rejected
        ));
    }

    #[test]
    fn test_local_only_enforced() {
        let mgr = AuthManager::new(vec![admin("ops", "pw", true)]);
        assert!(matches!(
            mgr.verify("ops", "pw", REMOTE),
            AuthOutcome::Rejected
        ));
        assert!(matches!(
            mgr.verify("ops", "pw", LOOPBACK),
            AuthOutcome::Accepted(_)
        ));
    }

    #[test]
    fn test_salted_hashes_differ_between_users() {
        let a = admin("a", "same-password", false);
        let b = admin("b", "same-password", false);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let salt = "00ff10";
        assert_eq!(hash_password(salt, "pw"), hash_password(salt, "pw"));
        assert_ne!(hash_password(salt, "pw"), hash_password(salt, "pw2"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
