//! ARTICLE, HEAD, BODY, STAT, LAST, NEXT

use crate::error::HandlerError;
use crate::models::ResolvedArticle;
use crate::protocol::CommandLine;
use crate::protocol::responses;
use crate::retriever::GroupView;
use crate::session::{SessionContext, SessionState};

use super::Reply;

/// Which part of the article the client asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    Article,
    Head,
    Body,
    Stat,
}

impl Retrieval {
    fn code(self) -> u16 {
        match self {
            Self::Article => 220,
            Self::Head => 221,
            Self::Body => 222,
            Self::Stat => 223,
        }
    }

    fn status_text(self) -> &'static str {
        match self {
            Self::Article => "Article follows (multi-line)",
            Self::Head => "Headers follow (multi-line)",
            Self::Body => "Body follows (multi-line)",
            Self::Stat => "Article exists",
        }
    }
}

/// Split the body octets into response lines
fn body_lines(body: &[u8]) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    let text = String::from_utf8_lossy(body);
    let mut lines: Vec<String> = text.split("\r\n").map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

fn respond(kind: Retrieval, number: u64, resolved: &ResolvedArticle) -> Reply {
    let status = format!(
        "{} {} {} {}",
        kind.code(),
        number,
        resolved.article.message_id,
        kind.status_text()
    );
    match kind {
        Retrieval::Stat => Reply::Line(status),
        Retrieval::Head => Reply::multi(
            status,
            resolved
                .article
                .headers
                .iter()
                .map(|h| format!("{}: {}", h.name, h.value))
                .collect(),
        ),
        Retrieval::Body => Reply::multi(status, body_lines(&resolved.article.body)),
        Retrieval::Article => {
            let mut lines: Vec<String> = resolved
                .article
                .headers
                .iter()
                .map(|h| format!("{}: {}", h.name, h.value))
                .collect();
            lines.push(String::new());
            lines.extend(body_lines(&resolved.article.body));
            Reply::multi(status, lines)
        }
    }
}

/// Selection precedence: an explicit `<msg-id>` bypasses the current group;
/// a numeric argument requires one; no argument requires a current article.
pub async fn retrieve(
    kind: Retrieval,
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    match cmd.arg(0) {
        Some(arg) if arg.starts_with('<') => {
            let Some(resolved) = ctx.retriever.article_by_message_id(arg).await? else {
                return Ok(Reply::line(responses::NO_SUCH_ARTICLE));
            };
            // Number 0 unless the article lives in the currently selected group
            let number = state
                .current_group
                .as_deref()
                .map(GroupView::parse)
                .filter(|view| view.base == resolved.link.group)
                .map(|_| resolved.link.number)
                .unwrap_or(0);
            Ok(respond(kind, number, &resolved))
        }
        Some(arg) => {
            let Some(current) = state.current_group.clone() else {
                return Ok(Reply::line(responses::NO_GROUP_SELECTED));
            };
            let number: u64 = arg
                .parse()
                .map_err(|_| HandlerError::syntax("article number expected"))?;
            let view = GroupView::parse(&current);
            let Some(resolved) = ctx.retriever.article_by_number(&view, number).await? else {
                return Ok(Reply::line(responses::NO_SUCH_ARTICLE_NUMBER));
            };
            state.current_article = Some(number);
            Ok(respond(kind, number, &resolved))
        }
        None => {
            let Some(current) = state.current_group.clone() else {
                return Ok(Reply::line(responses::NO_GROUP_SELECTED));
            };
            let Some(number) = state.current_article else {
                return Ok(Reply::line(responses::NO_CURRENT_ARTICLE));
            };
            let view = GroupView::parse(&current);
            let Some(resolved) = ctx.retriever.article_by_number(&view, number).await? else {
                return Ok(Reply::line(responses::NO_CURRENT_ARTICLE));
            };
            Ok(respond(kind, number, &resolved))
        }
    }
}

/// LAST / NEXT movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

pub async fn step(
    direction: Direction,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    let Some(current_group) = state.current_group.clone() else {
        return Ok(Reply::line(responses::NO_GROUP_SELECTED));
    };
    let Some(current) = state.current_article else {
        return Ok(Reply::line(responses::NO_CURRENT_ARTICLE));
    };
    let view = GroupView::parse(&current_group);
    let moved = match direction {
        Direction::Previous => ctx.retriever.previous_article(&view, current).await?,
        Direction::Next => ctx.retriever.next_article(&view, current).await?,
    };
    match moved {
        Some(resolved) => {
            state.current_article = Some(resolved.link.number);
            Ok(Reply::line(format!(
                "223 {} {} Article exists",
                resolved.link.number, resolved.article.message_id
            )))
        }
        None => Ok(Reply::line(match direction {
            Direction::Previous => responses::NO_PREVIOUS_ARTICLE,
            Direction::Next => responses::NO_NEXT_ARTICLE,
        })),
    }
}
