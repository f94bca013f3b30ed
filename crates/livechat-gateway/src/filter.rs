use regex::Regex;
use tracing::warn;

use livechat::message::{ChatEvent, Source};

use crate::config::FilterConfig;

#[derive(Debug, Clone)]
enum Matcher {
    Pattern { raw: String, regex: Regex },
    /// Compared against lower-cased text.
    Literal { raw: String, lowered: String },
}

impl Matcher {
    fn parse(entry: &str) -> Option<Self> {
        if entry.is_empty() {
            return None;
        }
        if let Some(inner) = entry
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .filter(|inner| !inner.is_empty())
        {
            match Regex::new(inner) {
                Ok(regex) => {
                    return Some(Matcher::Pattern {
                        raw: entry.to_string(),
                        regex,
                    })
                }
                Err(err) => {
                    warn!(target: "livechat::filter", entry, %err, "invalid blocked word pattern, matching literally");
                }
            }
        }
        Some(Matcher::Literal {
            raw: entry.to_string(),
            lowered: entry.to_lowercase(),
        })
    }

    fn matches(&self, text: &str, lowered: &str) -> bool {
        match self {
            Matcher::Pattern { regex, .. } => regex.is_match(text),
            Matcher::Literal { lowered: word, .. } => lowered.contains(word.as_str()),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Matcher::Pattern { raw, .. } | Matcher::Literal { raw, .. } => raw,
        }
    }
}

/// Drops chat events whose text contains a blocked word. Application lines
/// are never filtered.
#[derive(Debug, Clone, Default)]
pub struct BlockedWordFilter {
    matchers: Vec<Matcher>,
}

impl BlockedWordFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            matchers: config
                .blocked_words
                .iter()
                .filter_map(|entry| Matcher::parse(entry))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// The entry that blocks `event`, if any.
    pub fn blocked_by(&self, event: &ChatEvent) -> Option<&str> {
        if event.source == Source::App || self.matchers.is_empty() {
            return None;
        }
        let text = event.plain_text(true);
        let lowered = text.to_lowercase();
        self.matchers
            .iter()
            .find(|matcher| matcher.matches(&text, &lowered))
            .map(Matcher::describe)
    }

    /// Splits `events` into (kept, suppressed), preserving order in both.
    pub fn partition(&self, events: Vec<ChatEvent>) -> (Vec<ChatEvent>, Vec<ChatEvent>) {
        events
            .into_iter()
            .partition(|event| self.blocked_by(event).is_none())
    }
}
