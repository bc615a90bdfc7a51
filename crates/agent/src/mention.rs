//! `@mention` parsing.
//!
//! A message is routable only when it addresses exactly one distinct agent.
//! `@user` (in any casing) is the terminal sentinel and never counts as an
//! agent key. Tokens are matched with `@(\w+)` anywhere in the text, so the
//! domain part of an e-mail address (`bob@example.com`) reads as a mention.

use huddle_core::message::USER_SENDER;
use regex::Regex;
use std::sync::LazyLock;

/// Pre-compiled regex for @mention tokens (e.g., "@analyst check this")
pub(crate) static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("MENTION_REGEX is a compile-time constant"));

/// The routing decision for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMention {
    /// Exactly one agent addressed.
    Routed {
        agent_key: String,
        /// Text with every `@agent_key` token removed, outer whitespace trimmed
        content: String,
    },

    /// Several distinct agents addressed; nobody is picked.
    Ambiguous { keys: Vec<String> },

    /// No agent addressed.
    Terminal { user_mentioned: bool },
}

impl ParsedMention {
    /// `(agent_key, content)` when routable.
    pub fn into_route(self) -> Option<(String, String)> {
        match self {
            Self::Routed { agent_key, content } => Some((agent_key, content)),
            _ => None,
        }
    }
}

/// Whether a mention token is the `@user` sentinel.
pub fn is_user_token(token: &str) -> bool {
    token.eq_ignore_ascii_case(USER_SENDER)
}

/// All mention tokens in order of appearance, without the `@`.
pub fn mentions(text: &str) -> Vec<&str> {
    MENTION_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Whether the text mentions `@user`.
pub fn mentions_user(text: &str) -> bool {
    mentions(text).into_iter().any(is_user_token)
}

/// Distinct agent keys mentioned, in order of first appearance.
pub fn agent_mentions(text: &str) -> Vec<&str> {
    let mut keys: Vec<&str> = Vec::new();
    for token in mentions(text) {
        if !is_user_token(token) && !keys.contains(&token) {
            keys.push(token);
        }
    }
    keys
}

/// Parse a message for its addressed agent.
pub fn parse(text: &str) -> ParsedMention {
    let keys = agent_mentions(text);
    match keys.as_slice() {
        [] => ParsedMention::Terminal {
            user_mentioned: mentions_user(text),
        },
        [key] => ParsedMention::Routed {
            agent_key: key.to_string(),
            content: strip_mention(text, key),
        },
        _ => ParsedMention::Ambiguous {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        },
    }
}

/// Remove every `@key` token. Falls back to the original text when nothing
/// else is left, so the agent never receives an empty turn.
fn strip_mention(text: &str, key: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in MENTION_REGEX.captures_iter(text) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if token.as_str() == key {
            out.push_str(&text[last..whole.start()]);
            last = whole.end();
        }
    }
    out.push_str(&text[last..]);

    let stripped = out.trim();
    if stripped.is_empty() {
        text.trim().to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mention_routes() {
        assert_eq!(
            parse("@agent_1 Hello world").into_route(),
            Some(("agent_1".into(), "Hello world".into()))
        );
    }

    #[test]
    fn repeated_mention_is_fully_stripped() {
        assert_eq!(
            parse("@a do this @a then that").into_route(),
            Some(("a".into(), "do this  then that".into()))
        );
    }

    #[test]
    fn distinct_mentions_are_ambiguous() {
        let parsed = parse("@a do this @b then that");
        assert_eq!(
            parsed,
            ParsedMention::Ambiguous {
                keys: vec!["a".into(), "b".into()]
            }
        );
        assert!(parsed.into_route().is_none());
    }

    #[test]
    fn user_only_is_terminal() {
        assert_eq!(
            parse("All done @user"),
            ParsedMention::Terminal { user_mentioned: true }
        );
        assert_eq!(
            parse("Thanks @User!"),
            ParsedMention::Terminal { user_mentioned: true }
        );
    }

    #[test]
    fn no_mention_is_terminal() {
        assert_eq!(
            parse("just chatting"),
            ParsedMention::Terminal { user_mentioned: false }
        );
    }

    #[test]
    fn user_mention_does_not_block_routing() {
        // @user next to one agent still routes; the sentinel stays in the text
        assert_eq!(
            parse("@writer summarise for @user").into_route(),
            Some(("writer".into(), "summarise for @user".into()))
        );
    }

    #[test]
    fn token_ends_at_punctuation() {
        assert_eq!(
            parse("ping @analyst, please").into_route(),
            Some(("analyst".into(), "ping , please".into()))
        );
    }

    #[test]
    fn longer_key_is_not_stripped_by_prefix() {
        // "@ab" is its own key, so this is ambiguous rather than "@a"
        assert!(matches!(parse("@a and @ab"), ParsedMention::Ambiguous { .. }));
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert!(matches!(
            parse("@Writer and @writer"),
            ParsedMention::Ambiguous { .. }
        ));
    }

    #[test]
    fn email_domain_reads_as_mention() {
        assert_eq!(
            parse("mail bob@example.com").into_route(),
            Some(("example".into(), "mail bob.com".into()))
        );
    }

    #[test]
    fn bare_mention_keeps_original_text() {
        assert_eq!(
            parse("  @writer  ").into_route(),
            Some(("writer".into(), "@writer".into()))
        );
    }

    #[test]
    fn parse_is_pure() {
        let text = "@a do this @a then that";
        assert_eq!(parse(text), parse(text));
        assert_eq!(mentions(text), vec!["a", "a"]);
    }
}
