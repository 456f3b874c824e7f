//! Wait policies for the synchronous send path.

use serde::{Deserialize, Serialize};

/// How `send` decides it is done reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Read until a caller-supplied stop pattern appears or the timeout
    /// elapses. Timeout is a reported outcome, not an error.
    Keyword,
    /// Accumulate everything that arrives within the timeout window.
    Timeout,
    /// Fire and forget: the device's response lands in the async stream.
    None,
    /// Keyword with the standard AT terminators as a compound stop
    /// condition.
    AtCommand,
}

impl std::str::FromStr for WaitPolicy {
    type Err = crate::error::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "timeout" => Ok(Self::Timeout),
            "none" => Ok(Self::None),
            "at_command" => Ok(Self::AtCommand),
            other => Err(crate::error::EngineError::invalid_input(format!(
                "unsupported wait_policy '{other}', expected keyword, timeout, none or at_command"
            ))),
        }
    }
}

/// Terminators ending an AT command exchange, probed in order.
/// `"> "` is the prompt modems print when expecting a data payload.
pub const AT_TERMINATORS: [&str; 3] = ["OK\r\n", "ERROR\r\n", "> "];

/// Bytewise substring search; no protocol interpretation.
pub fn contains_pattern(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// First AT terminator present in the buffer, if any. "First" follows the
/// byte order of the response, not the probe order, so an `ERROR\r\n` before
/// a later `OK\r\n` is reported as the match.
pub fn match_at_terminator(buffer: &[u8]) -> Option<&'static str> {
    AT_TERMINATORS
        .iter()
        .filter_map(|term| {
            let needle = term.as_bytes();
            buffer
                .windows(needle.len())
                .position(|w| w == needle)
                .map(|pos| (pos, *term))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, term)| term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_from_wire_names() {
        assert_eq!("keyword".parse::<WaitPolicy>().unwrap(), WaitPolicy::Keyword);
        assert_eq!("TIMEOUT".parse::<WaitPolicy>().unwrap(), WaitPolicy::Timeout);
        assert_eq!("none".parse::<WaitPolicy>().unwrap(), WaitPolicy::None);
        assert_eq!(
            "at_command".parse::<WaitPolicy>().unwrap(),
            WaitPolicy::AtCommand
        );
        assert!("retry".parse::<WaitPolicy>().is_err());
    }

    #[test]
    fn pattern_search_is_bytewise() {
        assert!(contains_pattern(b"\r\n+CSQ: 22,99\r\n\r\nOK\r\n", b"OK"));
        assert!(!contains_pattern(b"ERROR\r\n", b"OK"));
        assert!(contains_pattern(b"abc", b"abc"));
        assert!(!contains_pattern(b"ab", b"abc"));
        assert!(!contains_pattern(b"abc", b""));
    }

    #[test]
    fn at_terminator_prefers_earliest_occurrence() {
        assert_eq!(match_at_terminator(b"ATE0\r\nOK\r\n"), Some("OK\r\n"));
        assert_eq!(match_at_terminator(b"AT+X\r\nERROR\r\n"), Some("ERROR\r\n"));
        assert_eq!(match_at_terminator(b"AT+CMGS=5\r\n> "), Some("> "));
        assert_eq!(
            match_at_terminator(b"junk ERROR\r\n then OK\r\n"),
            Some("ERROR\r\n")
        );
        assert_eq!(match_at_terminator(b"no terminator yet"), None);
    }

    #[test]
    fn bare_ok_without_crlf_is_not_a_terminator() {
        assert_eq!(match_at_terminator(b"OK"), None);
    }
}
