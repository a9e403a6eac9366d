//! Per-connection session engine
//!
//! One task per connection. The session owns its state, reads one command
//! at a time, and emits exactly one reply per command; distinct sessions
//! share only the retriever, poster, and auth manager through
//! [`SessionContext`]. No shared lock is held across a suspension point.

pub mod handlers;
mod state;

pub use handlers::{Reply, dispatch};
pub use state::{SessionMode, SessionState};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::auth::AuthManager;
use crate::constants::buffer::{MAX_ARTICLE_SIZE, MAX_COMMAND_LINE};
use crate::constants::timeout;
use crate::error::HandlerError;
use crate::poster::{PostOutcome, Poster};
use crate::protocol::responses;
use crate::protocol::wire::{ArticleRead, CommandRead, WireReader, encode_multiline, gzip_frame, unstuff};
use crate::retriever::Retriever;
use crate::stream::{AsyncStream, ConnectionStream};
use crate::types::SessionId;

/// Immutable collaborators shared by every session
pub struct SessionContext {
    pub retriever: Retriever,
    pub poster: Poster,
    pub auth: AuthManager,
    /// Server-wide posting switch; decides the greeting (200 vs 201)
    pub posting_allowed: bool,
    /// Present on explicit-TLS listeners; enables STARTTLS
    pub tls_acceptor: Option<TlsAcceptor>,
}

/// One client connection
pub struct ClientSession {
    id: SessionId,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
}

impl ClientSession {
    pub fn new(peer: SocketAddr, ctx: Arc<SessionContext>) -> Self {
        Self {
            id: SessionId::new(),
            peer,
            ctx,
        }
    }

    /// Drive the connection to completion
    ///
    /// Transport failures abandon the session without a further response;
    /// everything else answers and returns to `Ready`.
    pub async fn run<S: AsyncStream>(self, stream: ConnectionStream<S>) -> anyhow::Result<()> {
        let mut stream = stream;
        let mut state = SessionState::new(self.ctx.posting_allowed, stream.is_tls());
        let mut reader = WireReader::new();

        debug!(session = %self.id, peer = %self.peer, tls = state.tls_active, "session started");

        let greeting = if self.ctx.posting_allowed {
            responses::GREETING_POSTING_ALLOWED
        } else {
            responses::GREETING_POSTING_PROHIBITED
        };
        if write_line(&mut stream, greeting).await.is_err() {
            return Ok(());
        }

        loop {
            match state.mode {
                SessionMode::Ready => {
                    let read = tokio::time::timeout(
                        timeout::COMMAND_READ,
                        reader.read_line(&mut stream, MAX_COMMAND_LINE),
                    )
                    .await;
                    let line = match read {
                        Err(_) => {
                            debug!(session = %self.id, "idle timeout; closing");
                            break;
                        }
                        Ok(Err(e)) => {
                            debug!(session = %self.id, error = %e, "read failed");
                            break;
                        }
                        Ok(Ok(CommandRead::Closed)) => break,
                        Ok(Ok(CommandRead::TooLong)) => {
                            if write_line(&mut stream, responses::SYNTAX_ERROR).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        Ok(Ok(CommandRead::Line(line))) => line,
                    };

                    let reply = match dispatch(&line, &mut state, &self.ctx, self.peer.ip()).await {
                        Ok(reply) => reply,
                        Err(HandlerError::Syntax(msg)) => {
                            debug!(session = %self.id, %msg, "syntax error");
                            Reply::line(responses::SYNTAX_ERROR)
                        }
                        Err(HandlerError::Backend(e)) => {
                            error!(session = %self.id, error = %e, "backend failure");
                            Reply::line(responses::SERVER_OFFLINE)
                        }
                        Err(HandlerError::Transport(e)) => {
                            debug!(session = %self.id, error = %e, "transport failure");
                            break;
                        }
                    };

                    match reply {
                        Reply::Closing => {
                            let _ = write_line(&mut stream, responses::CLOSING).await;
                            let _ = stream.shutdown().await;
                            state.mode = SessionMode::Closed;
                            break;
                        }
                        Reply::BeginPost => {
                            if write_line(&mut stream, responses::SEND_ARTICLE).await.is_err() {
                                break;
                            }
                            state.mode = SessionMode::InPost;
                        }
                        Reply::BeginTls => {
                            let Some(acceptor) = self.ctx.tls_acceptor.clone() else {
                                // starttls() only returns BeginTls with an acceptor
                                if write_line(&mut stream, responses::TLS_NOT_AVAILABLE)
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                continue;
                            };
                            if write_line(&mut stream, responses::CONTINUE_WITH_TLS)
                                .await
                                .is_err()
                            {
                                break;
                            }
                            match stream.upgrade_tls(&acceptor).await {
                                Ok(upgraded) => {
                                    stream = upgraded;
                                    state.tls_active = true;
                                    debug!(session = %self.id, "STARTTLS upgrade complete");
                                }
                                Err(e) => {
                                    warn!(session = %self.id, error = %e, "STARTTLS handshake failed");
                                    return Ok(());
                                }
                            }
                        }
                        other => {
                            if write_reply(&mut stream, other, &state).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                SessionMode::InPost => {
                    let read = tokio::time::timeout(
                        timeout::ARTICLE_RECEIVE,
                        reader.read_article(&mut stream, MAX_ARTICLE_SIZE),
                    )
                    .await;
                    let reply = match read {
                        Err(_) => {
                            debug!(session = %self.id, "article receive timeout; closing");
                            break;
                        }
                        Ok(Err(e)) => {
                            debug!(session = %self.id, error = %e, "article read failed");
                            break;
                        }
                        Ok(Ok(ArticleRead::Closed)) => break,
                        Ok(Ok(ArticleRead::TooLarge)) => Reply::line(responses::POSTING_FAILED),
                        Ok(Ok(ArticleRead::Payload(raw))) => {
                            let payload = unstuff(&raw);
                            match self
                                .ctx
                                .poster
                                .submit(&payload, state.identity.as_ref())
                                .await
                            {
                                Ok(PostOutcome::Accepted) => {
                                    Reply::line(responses::ARTICLE_RECEIVED)
                                }
                                Ok(PostOutcome::Rejected) => {
                                    Reply::line(responses::POSTING_FAILED)
                                }
                                Ok(PostOutcome::ControlForbidden) => {
                                    Reply::line(responses::AUTH_REQUIRED)
                                }
                                Err(e) => {
                                    error!(session = %self.id, error = %e, "post persistence failed");
                                    Reply::line(responses::SERVER_OFFLINE)
                                }
                            }
                        }
                    };
                    state.mode = SessionMode::Ready;
                    if write_reply(&mut stream, reply, &state).await.is_err() {
                        break;
                    }
                }
                SessionMode::Closed => break,
            }
        }

        info!(session = %self.id, peer = %self.peer, "session ended");
        Ok(())
    }
}

async fn write_line<S: AsyncStream>(
    stream: &mut ConnectionStream<S>,
    line: &str,
) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await
}

/// Emit a handler reply through the codec
///
/// Multi-line payloads are dot-stuffed; when GZIP framing was negotiated
/// the payload (terminator included) goes out as a single GZIP stream
/// after the plain status line.
async fn write_reply<S: AsyncStream>(
    stream: &mut ConnectionStream<S>,
    reply: Reply,
    state: &SessionState,
) -> std::io::Result<()> {
    match reply {
        Reply::Line(line) => write_line(stream, &line).await,
        Reply::Multi { status, lines } => {
            stream.write_all(status.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;
            let payload = encode_multiline(&lines);
            if state.compression_active {
                let framed = gzip_frame(&payload)?;
                stream.write_all(&framed).await?;
            } else {
                stream.write_all(&payload).await?;
            }
            stream.flush().await
        }
        // The session loop writes these states itself
        Reply::Closing | Reply::BeginPost | Reply::BeginTls => Ok(()),
    }
}
