//! Command handlers, one module per verb family
//!
//! Handlers never write to the stream. Each returns a [`Reply`] value and
//! the session writer emits it, which is what guarantees at most one
//! response per received command even on error paths.

mod article;
mod group;
mod list;
mod misc;
mod over;

use std::net::IpAddr;

use crate::error::HandlerError;
use crate::models::Administrator;
use crate::protocol::responses;
use crate::protocol::{CommandLine, Verb};
use crate::retriever::GroupView;
use crate::session::{SessionContext, SessionState};
use crate::storage::Visibility;

/// A handler's answer, written by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Single status line (no CRLF)
    Line(String),
    /// Status line plus dot-stuffed multi-line payload
    Multi { status: String, lines: Vec<String> },
    /// `205` then half-shutdown
    Closing,
    /// `340` then switch the sink to article accumulation
    BeginPost,
    /// `382` then in-place TLS upgrade
    BeginTls,
}

impl Reply {
    pub fn line(s: impl Into<String>) -> Self {
        Self::Line(s.into())
    }

    pub fn multi(status: impl Into<String>, lines: Vec<String>) -> Self {
        Self::Multi {
            status: status.into(),
            lines,
        }
    }
}

/// Whether a principal may see a metagroup view
///
/// Ordinary readers must not be able to select (or observe the existence
/// of) `.deleted` and `.pending` views.
pub(crate) fn may_view(identity: Option<&Administrator>, view: &GroupView) -> bool {
    match view.visibility {
        Visibility::Visible => true,
        Visibility::Cancelled => identity
            .map(|a| a.can_cancel || a.can_delete_group)
            .unwrap_or(false),
        Visibility::Pending => identity
            .map(|a| a.can_approve_for(&view.base))
            .unwrap_or(false),
    }
}

/// Parse and route one command line
pub async fn dispatch(
    line: &str,
    state: &mut SessionState,
    ctx: &SessionContext,
    peer: IpAddr,
) -> Result<Reply, HandlerError> {
    let Some(cmd) = CommandLine::parse(line) else {
        return Ok(Reply::line(responses::UNKNOWN_COMMAND));
    };

    match cmd.verb {
        Verb::Article => article::retrieve(article::Retrieval::Article, &cmd, state, ctx).await,
        Verb::Head => article::retrieve(article::Retrieval::Head, &cmd, state, ctx).await,
        Verb::Body => article::retrieve(article::Retrieval::Body, &cmd, state, ctx).await,
        Verb::Stat => article::retrieve(article::Retrieval::Stat, &cmd, state, ctx).await,
        Verb::Last => article::step(article::Direction::Previous, state, ctx).await,
        Verb::Next => article::step(article::Direction::Next, state, ctx).await,
        Verb::Group => group::select(&cmd, state, ctx).await,
        Verb::ListGroup => group::listgroup(&cmd, state, ctx).await,
        Verb::NewGroups => group::newgroups(&cmd, ctx).await,
        Verb::List => list::list(&cmd, ctx).await,
        Verb::Over | Verb::XOver => over::overview(&cmd, state, ctx).await,
        Verb::Hdr => over::header_values(&cmd, state, ctx, true).await,
        Verb::XHdr => over::header_values(&cmd, state, ctx, false).await,
        Verb::Post => misc::post(state),
        Verb::Authinfo => misc::authinfo(&cmd, state, ctx, peer),
        Verb::Mode => misc::mode(&cmd, ctx),
        Verb::Capabilities => misc::capabilities(state, ctx),
        Verb::Date => misc::date(),
        Verb::Help => misc::help(),
        Verb::Quit => Ok(Reply::Closing),
        Verb::XFeature => misc::xfeature(&cmd, state),
        Verb::StartTls => misc::starttls(state, ctx),
        Verb::Unknown => Ok(Reply::line(responses::UNKNOWN_COMMAND)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Visibility;

    fn admin_with(f: impl FnOnce(&mut Administrator)) -> Administrator {
        let mut a = Administrator {
            username: "t".to_string(),
            password_salt: String::new(),
            password_hash: String::new(),
            can_approve_any: false,
            can_cancel: false,
            can_inject: false,
            can_create_group: false,
            can_delete_group: false,
            can_check_groups: false,
            local_authentication_only: false,
            moderates: Vec::new(),
        };
        f(&mut a);
        a
    }

    #[test]
    fn test_anonymous_cannot_view_metagroups() {
        let deleted = GroupView::parse("a.b.deleted");
        let pending = GroupView::parse("a.b.pending");
        assert!(!may_view(None, &deleted));
        assert!(!may_view(None, &pending));
        assert!(may_view(None, &GroupView::parse("a.b")));
    }

    #[test]
    fn test_canceller_views_deleted() {
        let admin = admin_with(|a| a.can_cancel = true);
        assert!(may_view(Some(&admin), &GroupView::parse("a.b.deleted")));
        assert!(!may_view(Some(&admin), &GroupView::parse("a.b.pending")));
    }

    #[test]
    fn test_moderator_views_pending_for_own_group() {
        let admin = admin_with(|a| a.moderates = vec!["a.b".to_string()]);
        let own = GroupView::parse("a.b.pending");
        let other = GroupView::parse("c.d.pending");
        assert_eq!(own.visibility, Visibility::Pending);
        assert!(may_view(Some(&admin), &own));
        assert!(!may_view(Some(&admin), &other));
    }
}
