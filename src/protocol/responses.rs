//! NNTP response constants
//!
//! Single-line responses that never vary are static byte strings; status
//! lines carrying numbers or names are built by the handlers.

/// Greeting when posting is allowed
pub const GREETING_POSTING_ALLOWED: &str = "200 Service available, posting allowed";
/// Greeting when posting is prohibited
pub const GREETING_POSTING_PROHIBITED: &str = "201 Service available, posting prohibited";

pub const CLOSING: &str = "205 Connection closing";

pub const SEND_ARTICLE: &str = "340 Send article to be posted";
pub const ARTICLE_RECEIVED: &str = "240 Article received OK";
pub const POSTING_NOT_PERMITTED: &str = "440 Posting not permitted";
pub const POSTING_FAILED: &str = "441 Posting failed";

pub const AUTH_ACCEPTED: &str = "281 Authentication accepted";
pub const PASSWORD_REQUIRED: &str = "381 Password required";
pub const AUTH_REQUIRED: &str = "480 Authentication required";
pub const AUTH_REJECTED: &str = "481 Authentication failed";
pub const AUTH_OUT_OF_SEQUENCE: &str = "482 Authentication commands issued out of sequence";
pub const ALREADY_AUTHENTICATED: &str = "502 Command unavailable";

pub const NO_SUCH_GROUP: &str = "411 No such newsgroup";
pub const NO_GROUP_SELECTED: &str = "412 No newsgroup selected";
pub const NO_CURRENT_ARTICLE: &str = "420 Current article number is invalid";
pub const NO_NEXT_ARTICLE: &str = "421 No next article in this group";
pub const NO_PREVIOUS_ARTICLE: &str = "422 No previous article in this group";
pub const NO_SUCH_ARTICLE_NUMBER: &str = "423 No article with that number";
pub const NO_SUCH_ARTICLE: &str = "430 No article with that message-id";

pub const UNKNOWN_COMMAND: &str = "500 Unknown command";
pub const SYNTAX_ERROR: &str = "501 Syntax error";
pub const SERVER_OFFLINE: &str = "403 Archive server temporarily offline";

pub const COMPRESSION_ENABLED: &str = "290 feature enabled";

pub const CONTINUE_WITH_TLS: &str = "382 Continue with TLS negotiation";
pub const TLS_NOT_AVAILABLE: &str = "502 Command unavailable";

pub const MODE_READER_POSTING_ALLOWED: &str = "200 Posting allowed";
pub const MODE_READER_POSTING_PROHIBITED: &str = "201 Posting prohibited";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_texts() {
        for (code, text) in [
            (200u16, GREETING_POSTING_ALLOWED),
            (201, GREETING_POSTING_PROHIBITED),
            (205, CLOSING),
            (240, ARTICLE_RECEIVED),
            (281, AUTH_ACCEPTED),
            (290, COMPRESSION_ENABLED),
            (340, SEND_ARTICLE),
            (381, PASSWORD_REQUIRED),
            (382, CONTINUE_WITH_TLS),
            (403, SERVER_OFFLINE),
            (411, NO_SUCH_GROUP),
            (412, NO_GROUP_SELECTED),
            (420, NO_CURRENT_ARTICLE),
            (421, NO_NEXT_ARTICLE),
            (422, NO_PREVIOUS_ARTICLE),
            (423, NO_SUCH_ARTICLE_NUMBER),
            (430, NO_SUCH_ARTICLE),
            (440, POSTING_NOT_PERMITTED),
            (441, POSTING_FAILED),
            (480, AUTH_REQUIRED),
            (481, AUTH_REJECTED),
            (482, AUTH_OUT_OF_SEQUENCE),
            (500, UNKNOWN_COMMAND),
            (501, SYNTAX_ERROR),
        ] {
            assert!(
                text.starts_with(&code.to_string()),
                "{text:?} should start with {code}"
            );
            assert!(!text.ends_with('\n'), "{text:?} must not embed CRLF");
        }
    }
}
