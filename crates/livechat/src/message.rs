use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cheer::CheermoteTier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    YouTube,
    Twitch,
    App,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::YouTube => "youtube",
            Source::Twitch => "twitch",
            Source::App => "app",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum YouTubeKind {
    Normal,
    SuperChat {
        amount: String,
        color: Option<String>,
    },
    SuperSticker {
        amount: String,
        color: Option<String>,
        sticker_url: Option<String>,
    },
    Membership {
        header: Option<String>,
    },
    MembershipGift {
        count: Option<u32>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TwitchKind {
    Normal,
    Cheer { bits: u32 },
    Sub { prime: bool, months: Option<u32> },
    SubGift { count: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppLevel {
    Info,
    Error,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    YouTube(YouTubeKind),
    Twitch(TwitchKind),
    App(AppLevel),
}

impl EventKind {
    pub fn source(&self) -> Source {
        match self {
            EventKind::YouTube(_) => Source::YouTube,
            EventKind::Twitch(_) => Source::Twitch,
            EventKind::App(_) => Source::App,
        }
    }

    /// Paid amount as the provider renders it (currency string or bit count).
    pub fn amount(&self) -> Option<String> {
        match self {
            EventKind::YouTube(YouTubeKind::SuperChat { amount, .. })
            | EventKind::YouTube(YouTubeKind::SuperSticker { amount, .. }) => Some(amount.clone()),
            EventKind::Twitch(TwitchKind::Cheer { bits }) => Some(bits.to_string()),
            _ => None,
        }
    }

    pub fn gift_count(&self) -> Option<u32> {
        match self {
            EventKind::YouTube(YouTubeKind::MembershipGift { count }) => *count,
            EventKind::Twitch(TwitchKind::SubGift { count }) => Some(*count),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Emote {
    pub id: String,
    pub name: String,
    pub url: String,
    pub animated_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheerToken {
    pub bits: u32,
    /// The token as typed in chat, e.g. `Cheer100`.
    pub text: String,
    pub tier: CheermoteTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageSegment {
    Text(String),
    Emote(Emote),
    Cheer(CheerToken),
}

impl MessageSegment {
    pub fn text(value: impl Into<String>) -> Self {
        MessageSegment::Text(value.into())
    }

    /// The original characters this segment covers.
    pub fn raw(&self) -> &str {
        match self {
            MessageSegment::Text(s) => s,
            MessageSegment::Emote(emote) => &emote.name,
            MessageSegment::Cheer(token) => &token.text,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Badge {
    pub id: String,
    pub label: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: Option<String>,
    pub name: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub icon_url: Option<String>,
    pub badges: Vec<Badge>,
    pub is_owner: bool,
    pub is_moderator: bool,
    pub is_member: bool,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name shown to viewers; falls back to the login name.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEvent {
    pub id: Uuid,
    pub source: Source,
    pub kind: EventKind,
    pub channel: String,
    pub author: Author,
    pub timestamp_ms: i64,
    pub segments: Vec<MessageSegment>,
    pub provider_message_id: Option<String>,
}

impl ChatEvent {
    pub fn new(
        kind: EventKind,
        channel: impl Into<String>,
        author: Author,
        timestamp_ms: i64,
        segments: Vec<MessageSegment>,
        provider_message_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: kind.source(),
            kind,
            channel: channel.into(),
            author,
            timestamp_ms,
            segments,
            provider_message_id,
        }
    }

    /// Application-originated line, stamped with the current time.
    pub fn app(level: AppLevel, text: impl Into<String>) -> Self {
        Self::new(
            EventKind::App(level),
            "",
            Author::named("livechat"),
            chrono::Utc::now().timestamp_millis(),
            vec![MessageSegment::text(text)],
            None,
        )
    }

    pub fn dedupe_key(&self) -> Option<(Source, &str)> {
        self.provider_message_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| (self.source, id))
    }

    /// Message text with emote names either kept inline or dropped.
    pub fn plain_text(&self, include_emotes: bool) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                MessageSegment::Emote(_) if !include_emotes => {}
                other => out.push_str(other.raw()),
            }
        }
        out
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{source}]#{channel} {user}: {content}",
            source = self.source,
            channel = self.channel,
            user = self.author.label(),
            content = self.plain_text(true),
        )
    }
}

/// Live stream details refreshed on a timer. Absent fields are left untouched
/// when merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub viewers: Option<u64>,
    pub likes: Option<u64>,
    pub category: Option<String>,
    pub started_at: Option<String>,
}

impl LiveMetadata {
    pub fn merge(&mut self, update: LiveMetadata) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field;
                })*
            };
        }
        take!(title, description, viewers, likes, category, started_at);
    }
}
