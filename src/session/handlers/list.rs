//! LIST and its keywords

use crate::error::HandlerError;
use crate::protocol::CommandLine;
use crate::session::SessionContext;
use crate::storage::GroupFilter;

use super::Reply;

/// Overview fields in the order OVER emits them
pub(crate) const OVERVIEW_FMT: &[&str] = &[
    "Subject:",
    "From:",
    "Date:",
    "Message-ID:",
    "References:",
    ":bytes",
    ":lines",
];

fn filter_from(wildmat: Option<&str>) -> GroupFilter {
    GroupFilter {
        name_wildmat: wildmat.map(str::to_string),
        created_since: None,
    }
}

pub async fn list(cmd: &CommandLine<'_>, ctx: &SessionContext) -> Result<Reply, HandlerError> {
    match cmd.arg(0) {
        None => active(ctx, None).await,
        Some(keyword) if keyword.eq_ignore_ascii_case("ACTIVE") => {
            active(ctx, cmd.arg(1)).await
        }
        Some(keyword) if keyword.eq_ignore_ascii_case("NEWSGROUPS") => {
            descriptions(ctx, cmd.arg(1)).await
        }
        Some(keyword) if keyword.eq_ignore_ascii_case("ACTIVE.TIMES") => {
            active_times(ctx, cmd.arg(1)).await
        }
        Some(keyword) if keyword.eq_ignore_ascii_case("OVERVIEW.FMT") => Ok(Reply::multi(
            "215 Order of fields in overview database (multi-line)",
            OVERVIEW_FMT.iter().map(|s| s.to_string()).collect(),
        )),
        Some(_) => Err(HandlerError::syntax("unsupported LIST keyword")),
    }
}

/// `LIST [ACTIVE [wildmat]]`: `name hi lo flag`
async fn active(ctx: &SessionContext, wildmat: Option<&str>) -> Result<Reply, HandlerError> {
    let groups = ctx.retriever.list_groups(&filter_from(wildmat)).await?;
    let lines = groups
        .iter()
        .map(|g| {
            format!(
                "{} {} {} {}",
                g.name,
                g.high_watermark,
                g.low_watermark,
                g.posting_flag(ctx.posting_allowed)
            )
        })
        .collect();
    Ok(Reply::multi("215 Newsgroups in form \"group high low flags\" (multi-line)", lines))
}

/// `LIST NEWSGROUPS [wildmat]`: `name<TAB>description`
async fn descriptions(ctx: &SessionContext, wildmat: Option<&str>) -> Result<Reply, HandlerError> {
    let groups = ctx.retriever.list_groups(&filter_from(wildmat)).await?;
    let lines = groups
        .iter()
        .map(|g| format!("{}\t{}", g.name, g.description))
        .collect();
    Ok(Reply::multi("215 Descriptions in form \"group description\" (multi-line)", lines))
}

/// `LIST ACTIVE.TIMES [wildmat]`: `name unix-seconds creator`
async fn active_times(ctx: &SessionContext, wildmat: Option<&str>) -> Result<Reply, HandlerError> {
    let groups = ctx.retriever.list_groups(&filter_from(wildmat)).await?;
    let lines = groups
        .iter()
        .map(|g| {
            format!(
                "{} {} {}",
                g.name,
                g.created_at.timestamp(),
                g.creator
            )
        })
        .collect();
    Ok(Reply::multi(
        "215 Group creation times in form \"group seconds creator\" (multi-line)",
        lines,
    ))
}
