//! GROUP, LISTGROUP, NEWGROUPS

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::constants::session::MAX_RANGE_RESULTS;
use crate::error::HandlerError;
use crate::protocol::CommandLine;
use crate::protocol::responses;
use crate::retriever::{ArticleRange, GroupView};
use crate::session::{SessionContext, SessionState};
use crate::storage::GroupFilter;

use super::{Reply, may_view};

/// GROUP: select a newsgroup (or a permitted metagroup view) and reset the
/// current article to its low watermark
pub async fn select(
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    let Some(name) = cmd.arg(0) else {
        return Err(HandlerError::syntax("GROUP requires a newsgroup name"));
    };
    let view = GroupView::parse(name);
    if !may_view(state.identity.as_ref(), &view) {
        // Hidden views do not leak their existence
        return Ok(Reply::line(responses::NO_SUCH_GROUP));
    }
    let Some((_, stats)) = ctx.retriever.group_stats(&view).await? else {
        return Ok(Reply::line(responses::NO_SUCH_GROUP));
    };
    state.select_group(&view.requested, stats.low);
    Ok(Reply::line(format!(
        "211 {} {} {} {}",
        stats.count, stats.low, stats.high, view.requested
    )))
}

/// LISTGROUP: like GROUP plus the article numbers in the requested range
pub async fn listgroup(
    cmd: &CommandLine<'_>,
    state: &mut SessionState,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    let name = match cmd.arg(0) {
        Some(name) => name.to_string(),
        None => match &state.current_group {
            Some(current) => current.clone(),
            None => return Ok(Reply::line(responses::NO_GROUP_SELECTED)),
        },
    };
    let range = match cmd.arg(1) {
        Some(spec) => ArticleRange::parse(spec)
            .map_err(|()| HandlerError::syntax("malformed article range"))?,
        None => ArticleRange::From(1),
    };

    let view = GroupView::parse(&name);
    if !may_view(state.identity.as_ref(), &view) {
        return Ok(Reply::line(responses::NO_SUCH_GROUP));
    }
    let Some((_, stats)) = ctx.retriever.group_stats(&view).await? else {
        return Ok(Reply::line(responses::NO_SUCH_GROUP));
    };
    state.select_group(&view.requested, stats.low);

    let (lo, hi) = range.bounds(stats.high);
    let numbers = if hi < lo {
        Vec::new()
    } else {
        ctx.retriever
            .article_range(&view, lo, hi, MAX_RANGE_RESULTS)
            .await?
            .iter()
            .map(|r| r.link.number.to_string())
            .collect()
    };

    Ok(Reply::multi(
        format!(
            "211 {} {} {} {} Article numbers follow (multi-line)",
            stats.count, stats.low, stats.high, view.requested
        ),
        numbers,
    ))
}

/// Parse the NEWGROUPS date/time arguments (`YYMMDD|YYYYMMDD HHMMSS [GMT]`)
///
/// The instant is always interpreted as UTC. Two-digit years resolve to the
/// century making them nearest to today (RFC 3977 §7.3.2).
pub(crate) fn parse_newgroups_instant(
    date: &str,
    time: &str,
) -> Result<DateTime<Utc>, HandlerError> {
    let date = match date.len() {
        8 => NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| HandlerError::syntax("malformed date"))?,
        6 => {
            let yy: i32 = date[..2]
                .parse()
                .map_err(|_| HandlerError::syntax("malformed date"))?;
            let current_yy = Utc::now().format("%y").to_string().parse::<i32>().unwrap_or(0);
            let century = if yy <= current_yy { 2000 } else { 1900 };
            NaiveDate::parse_from_str(&format!("{}{}", century + yy, &date[2..]), "%Y%m%d")
                .map_err(|_| HandlerError::syntax("malformed date"))?
        }
        _ => return Err(HandlerError::syntax("malformed date")),
    };
    let time = NaiveTime::parse_from_str(time, "%H%M%S")
        .map_err(|_| HandlerError::syntax("malformed time"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

/// NEWGROUPS: groups created at or after the given instant
pub async fn newgroups(
    cmd: &CommandLine<'_>,
    ctx: &SessionContext,
) -> Result<Reply, HandlerError> {
    let (Some(date), Some(time)) = (cmd.arg(0), cmd.arg(1)) else {
        return Err(HandlerError::syntax("NEWGROUPS requires date and time"));
    };
    if let Some(zone) = cmd.arg(2)
        && !zone.eq_ignore_ascii_case("GMT")
    {
        return Err(HandlerError::syntax("only GMT is accepted"));
    }
    let since = parse_newgroups_instant(date, time)?;

    let groups = ctx
        .retriever
        .list_groups(&GroupFilter {
            name_wildmat: None,
            created_since: Some(since),
        })
        .await?;
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
    Ok(Reply::multi("231 List of new newsgroups follows (multi-line)", lines))
}
