//! Listeners and the bounded accept loop
//!
//! Each configured port gets its own accept loop. A slot is taken from the
//! shared session semaphore before accepting; the permit rides with the
//! session task and frees itself when the session ends. Accept errors are
//! counted and logged but never exit the loop; a shutdown signal does.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::auth::AuthManager;
use crate::cache::RetrievalCache;
use crate::config::{Config, ListenerConfig, Transport};
use crate::constants::timeout::TLS_HANDSHAKE;
use crate::poster::Poster;
use crate::retriever::Retriever;
use crate::session::{ClientSession, SessionContext};
use crate::storage::Storage;
use crate::stream::ConnectionStream;
use crate::tls;

/// Run every configured listener until the shutdown signal fires
pub async fn run(
    config: Config,
    storage: Arc<dyn Storage>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let cache = Arc::new(RetrievalCache::new(
        config.cache.max_bytes,
        config.cache.ttl(),
    ));
    let sweeper = cache.spawn_sweeper();

    let retriever = Retriever::new(storage.clone(), cache.clone());
    let poster = Poster::new(
        storage.clone(),
        cache.clone(),
        config.server.hostname.clone(),
    );
    let auth = AuthManager::from_storage(storage.as_ref())
        .await
        .context("failed to load administrators")?;
    if auth.is_empty() {
        warn!("no administrators configured; control messages and moderation are unavailable");
    }

    let acceptor = config
        .tls
        .as_ref()
        .map(|tls| tls::build_acceptor(&tls.cert_path, &tls.key_path))
        .transpose()?;

    let semaphore = Arc::new(Semaphore::new(config.server.max_sessions));
    let max_sessions = config.server.max_sessions;

    let mut handles = Vec::with_capacity(config.listeners.len());
    for listener_cfg in config.listeners.clone() {
        // STARTTLS is only advertised on explicit-TLS ports; implicit ports
        // are already TLS by the time the session starts.
        let ctx = Arc::new(SessionContext {
            retriever: retriever.clone(),
            poster: poster.clone(),
            auth: auth.clone(),
            posting_allowed: config.server.posting_allowed,
            tls_acceptor: match listener_cfg.transport {
                Transport::ExplicitTls => acceptor.clone(),
                _ => None,
            },
        });
        handles.push(tokio::spawn(accept_loop(
            listener_cfg,
            ctx,
            acceptor.clone(),
            semaphore.clone(),
            shutdown.clone(),
        )));
    }

    for handle in handles {
        if let Err(e) = handle.await.context("listener task panicked")? {
            error!(error = %e, "listener failed");
        }
    }

    // Accept loops are done; give in-flight sessions a moment to drain.
    let drain = semaphore.acquire_many(max_sessions as u32);
    if tokio::time::timeout(std::time::Duration::from_secs(30), drain)
        .await
        .is_err()
    {
        warn!("shutdown drain timed out; abandoning remaining sessions");
    }
    sweeper.abort();

    let stats = cache.stats().await;
    info!(
        entries = stats.article_entries + stats.group_entries,
        hit_rate = format!("{:.1}%", stats.hit_rate * 100.0),
        "server stopped"
    );
    Ok(())
}

async fn accept_loop(
    cfg: ListenerConfig,
    ctx: Arc<SessionContext>,
    acceptor: Option<TlsAcceptor>,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(&cfg.addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.addr))?;
    info!(addr = %cfg.addr, transport = ?cfg.transport, "listening");

    let accept_errors = AtomicU64::new(0);
    loop {
        // Slot first, then accept: the listener back-pressures instead of
        // accepting connections it cannot serve.
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    let count = accept_errors.fetch_add(1, Ordering::Relaxed) + 1;
                    error!(addr = %cfg.addr, error = %e, total = count, "accept failed");
                    continue;
                }
            },
        };

        let ctx = ctx.clone();
        let transport = cfg.transport;
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            // Permit released when the session task finishes
            let _permit = permit;

            let connection = match transport {
                Transport::ImplicitTls => {
                    let Some(acceptor) = acceptor else {
                        error!(peer = %peer, "implicit TLS port without an acceptor");
                        return;
                    };
                    // Handshake failure: log and drop without responding
                    match tokio::time::timeout(TLS_HANDSHAKE, acceptor.accept(stream)).await {
                        Ok(Ok(tls)) => ConnectionStream::tls(tls),
                        Ok(Err(e)) => {
                            warn!(peer = %peer, error = %e, "TLS handshake failed");
                            return;
                        }
                        Err(_) => {
                            warn!(peer = %peer, "TLS handshake timed out");
                            return;
                        }
                    }
                }
                Transport::Cleartext | Transport::ExplicitTls => ConnectionStream::plain(stream),
            };

            let session = ClientSession::new(peer, ctx);
            if let Err(e) = session.run(connection).await {
                warn!(peer = %peer, error = %e, "session error");
            }
        });
    }

    info!(addr = %cfg.addr, "listener stopped");
    Ok(())
}
