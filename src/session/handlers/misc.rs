//! CAPABILITIES, DATE, MODE, HELP, POST entry, AUTHINFO, XFEATURE, STARTTLS

use std::net::IpAddr;

use chrono::Utc;

use crate::auth::AuthOutcome;
use crate::error::HandlerError;
use crate::protocol::CommandLine;
use crate::protocol::responses;
use crate::session::{SessionContext, SessionState};

use super::Reply;

pub fn capabilities(state: &SessionState, ctx: &SessionContext) -> Result<Reply, HandlerError> {
    let mut lines = vec![
        "VERSION 2".to_string(),
        format!("IMPLEMENTATION nntp-archive {}", env!("CARGO_PKG_VERSION")),
        "READER".to_string(),
    ];
    if ctx.posting_allowed {
        lines.push("POST".to_string());
    }
    if !state.is_authenticated() {
        lines.push("AUTHINFO USER".to_string());
    }
    lines.push("LIST ACTIVE NEWSGROUPS ACTIVE.TIMES OVERVIEW.FMT".to_string());
    lines.push("OVER".to_string());
    lines.push("HDR".to_string());
    lines.push("XFEATURE-COMPRESS GZIP TERMINATOR".to_string());
    if ctx.tls_acceptor.is_some() && !state.tls_active {
        lines.push("STARTTLS".to_string());
    }
    Ok(Reply::multi("101 Capability list:", lines))
}

pub fn date() -> Result<Reply, HandlerError> {
    Ok(Reply::line(format!(
        "111 {}",
        Utc::now().format("%Y%m%d%H%M%S")
    )))
}

pub fn mode(cmd: &CommandLine<'_>, ctx: &SessionContext) -> Result<Reply, HandlerError> {
    match cmd.arg(0) {
        Some(arg) if arg.eq_ignore_ascii_case("READER") => Ok(Reply::line(
            if ctx.posting_allowed {
                responses::MODE_READER_POSTING_ALLOWED
            } else {
                responses::MODE_READER_POSTING_PROHIBITED
            },
        )),
        _ => Err(HandlerError::syntax("MODE READER is the only mode")),
    }
}

pub fn help() -> Result<Reply, HandlerError> {
    let lines = [
        "ARTICLE [message-id|number]",
        "AUTHINFO USER name | AUTHINFO PASS password",
        "BODY [message-id|number]",
        "CAPABILITIES",
        "DATE",
        "GROUP newsgroup",
        "HDR header [range|message-id]",
        "HEAD [message-id|number]",
        "HELP",
        "LAST",
        "LIST [ACTIVE|NEWSGROUPS|ACTIVE.TIMES|OVERVIEW.FMT] [wildmat]",
        "LISTGROUP [newsgroup [range]]",
        "MODE READER",
        "NEWGROUPS [yy]yymmdd hhmmss [GMT]",
        "NEXT",
        "OVER [range|message-id]",
        "POST",
        "QUIT",
        "STAT [message-id|number]",
        "XFEATURE COMPRESS GZIP TERMINATOR",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    Ok(Reply::multi("100 Help text follows (multi-line)", lines))
}

/// POST: flip into article accumulation if posting is allowed at all
pub fn post(state: &mut SessionState) -> Result<Reply, HandlerError> {
    if !state.can_post {
        return Ok(Reply::line(responses::POSTING_NOT_PERMITTED));
    }
    Ok(Reply::BeginPost)
}

/// AUTHINFO USER / AUTHINFO PASS (RFC 4643)
///
/// The password is the remaining tokens rejoined with single spaces, so
/// runs of whitespace inside a password normalize to one space.
pub fn authinfo(
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
    peer: IpAddr,
) -> Result<Reply, HandlerError> {
    if state.is_authenticated() {
        return Ok(Reply::line(responses::ALREADY_AUTHENTICATED));
    }
    match cmd.arg(0) {
        Some(sub) if sub.eq_ignore_ascii_case("USER") => {
            let Some(username) = cmd.rest_joined(1) else {
                return Err(HandlerError::syntax("AUTHINFO USER requires a username"));
            };
            state.pending_username = Some(username);
            Ok(Reply::line(responses::PASSWORD_REQUIRED))
        }
        Some(sub) if sub.eq_ignore_ascii_case("PASS") => {
            let Some(username) = state.pending_username.take() else {
                return Ok(Reply::line(responses::AUTH_OUT_OF_SEQUENCE));
            };
            let Some(password) = cmd.rest_joined(1) else {
                return Err(HandlerError::syntax("AUTHINFO PASS requires a password"));
            };
            match ctx.auth.verify(&username, &password, peer) {
                AuthOutcome::Accepted(admin) => {
                    state.identity = Some(*admin);
                    Ok(Reply::line(responses::AUTH_ACCEPTED))
                }
                AuthOutcome::Rejected => Ok(Reply::line(responses::AUTH_REJECTED)),
            }
        }
        _ => Err(HandlerError::syntax("AUTHINFO USER or AUTHINFO PASS expected")),
    }
}

/// XFEATURE COMPRESS GZIP TERMINATOR: enable GZIP framing for subsequent
/// multi-line payloads
pub fn xfeature(cmd: &CommandLine<'_>, state: &mut SessionState) -> Result<Reply, HandlerError> {
    let feature: Vec<String> = cmd.args.iter().map(|a| a.to_ascii_uppercase()).collect();
    if feature == ["COMPRESS", "GZIP", "TERMINATOR"] {
        state.compression_active = true;
        state.compression_terminator = true;
        return Ok(Reply::line(responses::COMPRESSION_ENABLED));
    }
    Err(HandlerError::syntax("unsupported feature"))
}

/// STARTTLS: only on explicit-TLS listeners, only before TLS is active
pub fn starttls(state: &SessionState, ctx: &SessionContext) -> Result<Reply, HandlerError> {
    if state.tls_active || ctx.tls_acceptor.is_none() {
        return Ok(Reply::line(responses::TLS_NOT_AVAILABLE));
    }
    Ok(Reply::BeginTls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format() {
        let reply = date().unwrap();
        let Reply::Line(line) = reply else {
            panic!("DATE must be single-line");
        };
        assert!(line.starts_with("111 "));
        assert_eq!(line.len(), "111 ".len() + 14);
        assert!(line["111 ".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_post_requires_permission() {
        let mut state = SessionState::new(false, false);
        assert_eq!(
            post(&mut state).unwrap(),
            Reply::line(responses::POSTING_NOT_PERMITTED)
        );
        let mut state = SessionState::new(true, false);
        assert_eq!(post(&mut state).unwrap(), Reply::BeginPost);
    }
}
