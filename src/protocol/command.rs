//! Command line parsing
//!
//! Only the first token selects the handler, case-insensitive
//! (RFC 3977 §3.1). Arguments keep their original case; group names and
//! message-ids are case-sensitive.

/// Command keywords the server dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Article,
    Authinfo,
    Body,
    Capabilities,
    Date,
    Group,
    Hdr,
    Head,
    Help,
    Last,
    List,
    ListGroup,
    Mode,
    NewGroups,
    Next,
    Over,
    Post,
    Quit,
    StartTls,
    Stat,
    XFeature,
    XHdr,
    XOver,
    Unknown,
}

impl Verb {
    fn classify(token: &str) -> Self {
        // A handful of verbs on a line-rate-irrelevant origin server:
        // a case-insensitive chain beats byte tables for clarity.
        const TABLE: &[(&str, Verb)] = &[
            ("ARTICLE", Verb::Article),
            ("AUTHINFO", Verb::Authinfo),
            ("BODY", Verb::Body),
            ("CAPABILITIES", Verb::Capabilities),
            ("DATE", Verb::Date),
            ("GROUP", Verb::Group),
            ("HDR", Verb::Hdr),
            ("HEAD", Verb::Head),
            ("HELP", Verb::Help),
            ("LAST", Verb::Last),
            ("LIST", Verb::List),
            ("LISTGROUP", Verb::ListGroup),
            ("MODE", Verb::Mode),
            ("NEWGROUPS", Verb::NewGroups),
            ("NEXT", Verb::Next),
            ("OVER", Verb::Over),
            ("POST", Verb::Post),
            ("QUIT", Verb::Quit),
            ("STARTTLS", Verb::StartTls),
            ("STAT", Verb::Stat),
            ("XFEATURE", Verb::XFeature),
            ("XHDR", Verb::XHdr),
            ("XOVER", Verb::XOver),
        ];
        TABLE
            .iter()
            .find(|(name, _)| token.eq_ignore_ascii_case(name))
            .map(|(_, verb)| *verb)
            .unwrap_or(Verb::Unknown)
    }
}

/// A parsed command line
#[derive(Debug, Clone)]
pub struct CommandLine<'a> {
    pub verb: Verb,
    /// Whitespace-split arguments after the verb
    pub args: Vec<&'a str>,
}

impl<'a> CommandLine<'a> {
    /// Parse one CRLF-stripped line; `None` for a blank line
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut tokens = line.split_ascii_whitespace();
        let verb = Verb::classify(tokens.next()?);
        Some(Self {
            verb,
            args: tokens.collect(),
        })
    }

    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Arguments from `index` on, rejoined with single spaces
    ///
    /// AUTHINFO PASS uses this, so a password containing runs of whitespace
    /// is normalized to single spaces.
    #[must_use]
    pub fn rest_joined(&self, index: usize) -> Option<String> {
        if self.args.len() <= index {
            return None;
        }
        Some(self.args[index..].join(" "))
    }
}
