//! OVER/XOVER and HDR/XHDR

use crate::constants::session::MAX_RANGE_RESULTS;
use crate::error::HandlerError;
use crate::models::ResolvedArticle;
use crate::protocol::CommandLine;
use crate::protocol::responses;
use crate::retriever::{ArticleRange, GroupView};
use crate::session::{SessionContext, SessionState};

use super::Reply;

/// Unfold a header value for overview output: any internal CR, LF, or TAB
/// becomes a single space, runs collapsed
pub(crate) fn sanitize_overview(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_gap = false;
    for c in value.chars() {
        if matches!(c, '\r' | '\n' | '\t') {
            if !in_gap {
                out.push(' ');
                in_gap = true;
            }
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

/// One tab-separated overview row
///
/// `:bytes` is reported as twice the body length in octets, a quirk kept
/// for wire compatibility with existing readers of this server.
fn overview_row(number: u64, resolved: &ResolvedArticle) -> String {
    let article = &resolved.article;
    let field = |name: &str| sanitize_overview(article.header(name).unwrap_or(""));
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        number,
        field("Subject"),
        field("From"),
        field("Date"),
        article.message_id,
        field("References"),
        article.body.len() * 2,
        article.body_line_count()
    )
}

/// Resolve the `[range|msg-id]` argument shared by OVER and HDR
///
/// Returns the selected articles paired with the number to print (0 for a
/// message-id lookup outside group context), or an early [`Reply`] error.
async fn select_targets(
    cmd: &CommandLine<'_>,
    state: &SessionState,
    ctx: &SessionContext,
    arg_index: usize,
) -> Result<Result<Vec<(u64, ResolvedArticle)>, Reply>, HandlerError> {
    match cmd.arg(arg_index) {
        Some(arg) if arg.starts_with('<') => {
            match ctx.retriever.article_by_message_id(arg).await? {
                Some(resolved) => Ok(Ok(vec![(0, resolved)])),
                None => Ok(Err(Reply::line(responses::NO_SUCH_ARTICLE))),
            }
        }
        Some(spec) => {
            let Some(current) = state.current_group.clone() else {
                return Ok(Err(Reply::line(responses::NO_GROUP_SELECTED)));
            };
            let range = ArticleRange::parse(spec)
                .map_err(|()| HandlerError::syntax("malformed article range"))?;
            let view = GroupView::parse(&current);
            let Some((_, stats)) = ctx.retriever.group_stats(&view).await? else {
                return Ok(Err(Reply::line(responses::NO_GROUP_SELECTED)));
            };
            let (lo, hi) = range.bounds(stats.high);
            let rows = if hi < lo {
                Vec::new()
            } else {
                ctx.retriever
                    .article_range(&view, lo, hi, MAX_RANGE_RESULTS)
                    .await?
            };
            if rows.is_empty() {
                return Ok(Err(Reply::line(responses::NO_SUCH_ARTICLE_NUMBER)));
            }
            Ok(Ok(rows.into_iter().map(|r| (r.link.number, r)).collect()))
        }
        None => {
            let Some(current) = state.current_group.clone() else {
                return Ok(Err(Reply::line(responses::NO_GROUP_SELECTED)));
            };
            let Some(number) = state.current_article else {
                return Ok(Err(Reply::line(responses::NO_CURRENT_ARTICLE)));
            };
            let view = GroupView::parse(&current);
            match ctx.retriever.article_by_number(&view, number).await? {
                Some(resolved) => Ok(Ok(vec![(number, resolved)])),
                None => Ok(Err(Reply::line(responses::NO_CURRENT_ARTICLE))),
            }
        }
    }
}

/// OVER / XOVER
pub async fn overview(
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    let targets = match select_targets(cmd, state, ctx, 0).await? {
        Ok(targets) => targets,
        Err(reply) => return Ok(reply),
    };
    let lines = targets
        .iter()
        .map(|(number, resolved)| overview_row(*number, resolved))
        .collect();
    Ok(Reply::multi(
        "224 Overview information follows (multi-line)",
        lines,
    ))
}

/// HDR / XHDR: `header [range|msg-id]`
///
/// HDR answers `225` (RFC 3977), XHDR keeps the legacy `221`.
pub async fn header_values(
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
    rfc3977: bool,
) -> Result<Reply, HandlerError> {
    let Some(header) = cmd.arg(0) else {
        return Err(HandlerError::syntax("HDR requires a header name"));
    };
    let targets = match select_targets(cmd, state, ctx, 1).await? {
        Ok(targets) => targets,
        Err(reply) => return Ok(reply),
    };
    let lines = targets
        .iter()
        .map(|(number, resolved)| {
            let value = sanitize_overview(resolved.article.header(header).unwrap_or(""));
            format!("{number} {value}")
        })
        .collect();
    let status = if rfc3977 {
        "225 Headers follow (multi-line)"
    } else {
        "221 Header follows (multi-line)"
    };
    Ok(Reply::multi(status, lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, ArticleNewsgroup, Header, Newsgroup};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn test_sanitize_overview() {
        assert_eq!(sanitize_overview("plain"), "plain");
        assert_eq!(sanitize_overview("a\tb"), "a b");
        assert_eq!(sanitize_overview("a\r\n\tb"), "a b");
        assert_eq!(sanitize_overview("a\nb\tc"), "a b c");
    }

    #[test]
    fn test_overview_row_bytes_doubled() {
        let resolved = ResolvedArticle {
            article: Arc::new(Article {
                message_id: "<o@x>".to_string(),
                headers: vec![
                    Header::new("Subject", "s"),
                    Header::new("From", "f@h"),
                    Header::new("Date", "today"),
                    Header::new("References", "<r@x>"),
                ],
                body: b"12345\r\n".to_vec(),
                posted_at: Utc::now(),
            }),
            group: Newsgroup::new("local.test", "", "a"),
            link: ArticleNewsgroup {
                message_id: "<o@x>".to_string(),
                group: "local.test".to_string(),
                number: 9,
                cancelled: false,
                pending: false,
            },
        };
        let row = overview_row(9, &resolved);
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0], "9");
        assert_eq!(fields[4], "<o@x>");
        assert_eq!(fields[6], "14", ":bytes is body length times two");
        assert_eq!(fields[7], "1");
    }
}
