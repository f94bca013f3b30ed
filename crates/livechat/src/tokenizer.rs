use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::debug;

use crate::message::{Emote, MessageSegment};

const PLACEHOLDER_TEMPLATE: &str =
    "https://static-cdn.jtvnw.net/emoticons/v2/{{id}}/default/dark/3.0";

/// Emote id to the raw `start-end` ranges Twitch reports for it. Positions are
/// inclusive code point indices into the message.
pub type EmoteRangeMap = BTreeMap<String, Vec<String>>;

/// Parses the IRC `emotes` tag, e.g. `25:0-4,12-16/1902:6-10`.
pub fn parse_emotes_tag(tag: &str) -> EmoteRangeMap {
    let mut map = EmoteRangeMap::new();
    for emote in tag.split('/') {
        let Some((id, ranges)) = emote.split_once(':') else {
            continue;
        };
        if id.is_empty() {
            continue;
        }
        let entry = map.entry(id.to_string()).or_insert_with(Vec::new);
        entry.extend(
            ranges
                .split(',')
                .filter(|range| !range.is_empty())
                .map(str::to_string),
        );
    }
    map
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixEmoteResponse {
    pub data: Vec<HelixEmote>,
    pub template: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixEmote {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub format: Vec<String>,
    #[serde(default)]
    pub scale: Vec<String>,
    #[serde(default)]
    pub theme_mode: Vec<String>,
}

/// Emotes known for a channel (global plus channel specific).
#[derive(Debug, Default, Clone)]
pub struct EmoteCache {
    emotes: HashMap<String, Emote>,
}

impl EmoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, emote: Emote) {
        self.emotes.insert(emote.id.clone(), emote);
    }

    pub fn get(&self, id: &str) -> Option<&Emote> {
        self.emotes.get(id)
    }

    pub fn len(&self) -> usize {
        self.emotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emotes.is_empty()
    }

    /// Adds every emote of a Helix `chat/emotes` response, returning how many
    /// were registered.
    pub fn extend_from_helix(&mut self, response: &HelixEmoteResponse) -> usize {
        for emote in &response.data {
            self.insert(helix_emote(&response.template, emote));
        }
        response.data.len()
    }
}

fn helix_emote(template: &str, emote: &HelixEmote) -> Emote {
    let theme = if emote.theme_mode.iter().any(|mode| mode == "dark") {
        "dark"
    } else {
        emote
            .theme_mode
            .first()
            .map(String::as_str)
            .unwrap_or("dark")
    };
    let scale = emote.scale.last().map(String::as_str).unwrap_or("3.0");
    let render = |format: &str| {
        template
            .replace("{{id}}", &emote.id)
            .replace("{{format}}", format)
            .replace("{{theme_mode}}", theme)
            .replace("{{scale}}", scale)
    };
    let animated_url = emote
        .format
        .iter()
        .any(|format| format == "animated")
        .then(|| render("animated"));
    Emote {
        id: emote.id.clone(),
        name: emote.name.clone(),
        url: render("static"),
        animated_url,
    }
}

pub fn placeholder_emote(id: &str, name: &str) -> Emote {
    Emote {
        id: id.to_string(),
        name: name.to_string(),
        url: PLACEHOLDER_TEMPLATE.replace("{{id}}", id),
        animated_url: None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub segments: Vec<MessageSegment>,
    /// Ranges dropped for being malformed, out of bounds or overlapping.
    pub skipped: usize,
    /// Emotes that were not in the cache and got a CDN placeholder.
    pub placeholders: usize,
}

// Byte span, end exclusive.
#[derive(Debug, Clone)]
struct Span<'a> {
    start: usize,
    end: usize,
    emote_id: Option<&'a str>,
}

/// Splits `message` into text and emote segments. Concatenating the raw text
/// of the result reproduces `message` for every range that was kept.
pub fn tokenize(message: &str, ranges: &EmoteRangeMap, cache: &EmoteCache) -> Tokenized {
    let mut result = Tokenized::default();
    if ranges.is_empty() {
        if !message.is_empty() {
            result.segments.push(MessageSegment::text(message));
        }
        return result;
    }

    let offsets: Vec<usize> = message
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(message.len()))
        .collect();

    // sentinels bracket the message so every gap has two neighbours
    let mut spans = vec![
        Span {
            start: 0,
            end: 0,
            emote_id: None,
        },
        Span {
            start: message.len(),
            end: message.len(),
            emote_id: None,
        },
    ];
    for (emote_id, list) in ranges {
        for raw in list {
            match byte_range(raw, &offsets) {
                Some((start, end)) => spans.push(Span {
                    start,
                    end,
                    emote_id: Some(emote_id),
                }),
                None => {
                    debug!(target: "livechat::tokenizer", range = %raw, emote = %emote_id, "skipping invalid emote range");
                    result.skipped += 1;
                }
            }
        }
    }
    spans.sort_by_key(|span| (span.start, span.end));

    let mut kept: Vec<Span> = Vec::with_capacity(spans.len());
    let mut last_end = 0usize;
    for span in spans {
        if span.emote_id.is_some() && span.start < last_end {
            debug!(target: "livechat::tokenizer", start = span.start, "skipping overlapping emote range");
            result.skipped += 1;
            continue;
        }
        last_end = last_end.max(span.end);
        kept.push(span);
    }

    let mut entries: Vec<(usize, MessageSegment)> = Vec::with_capacity(kept.len() * 2);
    for pair in kept.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start > prev.end {
            entries.push((
                prev.end,
                MessageSegment::text(&message[prev.end..next.start]),
            ));
        }
    }
    for span in &kept {
        let Some(id) = span.emote_id else {
            continue;
        };
        let covered = &message[span.start..span.end];
        let emote = match cache.get(id) {
            Some(known) => Emote {
                name: covered.to_string(),
                ..known.clone()
            },
            None => {
                result.placeholders += 1;
                placeholder_emote(id, covered)
            }
        };
        entries.push((span.start, MessageSegment::Emote(emote)));
    }
    entries.sort_by_key(|(start, _)| *start);

    result.segments = entries
        .into_iter()
        .map(|(_, segment)| segment)
        .filter(|segment| !matches!(segment, MessageSegment::Text(text) if text.is_empty()))
        .collect();
    result
}

fn byte_range(raw: &str, offsets: &[usize]) -> Option<(usize, usize)> {
    let (start, end) = raw.split_once('-')?;
    let start = start.trim().parse::<usize>().ok()?;
    let end = end.trim().parse::<usize>().ok()?;
    // offsets has one trailing entry for the message end
    let char_count = offsets.len() - 1;
    if start > end || end >= char_count {
        return None;
    }
    Some((offsets[start], offsets[end + 1]))
}
