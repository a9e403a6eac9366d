//! TLS configuration for the server's listeners
//!
//! Builds a rustls server configuration from PEM certificate and key files
//! using the ring crypto provider. The same acceptor serves implicit-TLS
//! ports (handshake before the greeting) and the STARTTLS in-place upgrade
//! on explicit-TLS ports.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

/// Load certificates and key and build an acceptor
pub fn build_acceptor(cert_path: &str, key_path: &str) -> anyhow::Result<TlsAcceptor> {
    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| anyhow!("failed to select TLS protocol versions: {e}"))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| anyhow!("certificate/key mismatch: {e}"))?;

    debug!(cert = cert_path, "TLS server configuration loaded");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certificates(path: &str) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read TLS certificate from {path}"))?;
    let certs = rustls_pemfile::certs(&mut data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse TLS certificate from {path}"))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {path}"));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> anyhow::Result<PrivateKeyDer<'static>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read TLS private key from {path}"))?;
    rustls_pemfile::private_key(&mut data.as_slice())
        .with_context(|| format!("failed to parse TLS private key from {path}"))?
        .ok_or_else(|| anyhow!("no private key found in {path}"))
}
