//! YouTube live chat as served by the web client's `get_live_chat` endpoint.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::message::{
    Author, Badge, ChatEvent, Emote, EventKind, LiveMetadata, MessageSegment, YouTubeKind,
};

const MIN_CONTINUATION_LENGTH: usize = 50;

lazy_static::lazy_static! {
    static ref CONTINUATION_RE: Regex =
        Regex::new(r#""continuation"\s*:\s*"([^"]+)""#).unwrap();
    static ref API_KEY_RE: Regex =
        Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).unwrap();
    static ref CLIENT_VERSION_RE: Regex =
        Regex::new(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#).unwrap();
    static ref CANONICAL_RE: Regex = Regex::new(
        r#"<link rel="canonical" href="https://www\.youtube\.com/watch\?v=([A-Za-z0-9_-]{6,})""#
    )
    .unwrap();
}

/// First continuation token long enough to address the chat stream.
pub fn extract_continuation(html: &str) -> Option<String> {
    CONTINUATION_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|token| token.len() > MIN_CONTINUATION_LENGTH)
        .map(str::to_string)
}

pub fn extract_api_key(html: &str) -> Option<String> {
    API_KEY_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_client_version(html: &str) -> Option<String> {
    CLIENT_VERSION_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Video id of the stream a channel's `/live` page redirects to.
pub fn extract_live_video_id(html: &str) -> Option<String> {
    CANONICAL_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatResponse {
    pub continuation_contents: Option<ContinuationContents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationContents {
    pub live_chat_continuation: Option<LiveChatContinuation>,
}

/// Items stay raw until [`parse_chat_response`] so one malformed entry
/// cannot sink the page.
#[derive(Debug, Deserialize)]
pub struct LiveChatContinuation {
    #[serde(default)]
    pub actions: Vec<JsonValue>,
    #[serde(default)]
    pub continuations: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAction {
    pub add_chat_item_action: Option<AddChatItemAction>,
}

#[derive(Debug, Deserialize)]
pub struct AddChatItemAction {
    pub item: ChatItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatItem {
    pub live_chat_text_message_renderer: Option<MessageRenderer>,
    pub live_chat_paid_message_renderer: Option<MessageRenderer>,
    pub live_chat_paid_sticker_renderer: Option<MessageRenderer>,
    pub live_chat_membership_item_renderer: Option<MessageRenderer>,
    pub live_chat_sponsorships_gift_purchase_announcement_renderer: Option<GiftRenderer>,
}

/// Fields shared by the text, paid, sticker and membership renderers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRenderer {
    pub id: String,
    pub message: Option<Runs>,
    pub author_name: Option<Text>,
    pub author_photo: Option<Thumbnails>,
    pub author_external_channel_id: Option<String>,
    pub timestamp_usec: Option<String>,
    #[serde(default)]
    pub author_badges: Vec<AuthorBadge>,
    pub purchase_amount_text: Option<Text>,
    pub body_background_color: Option<i64>,
    pub background_color: Option<i64>,
    pub sticker: Option<Thumbnails>,
    pub header_sub_text: Option<Text>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftRenderer {
    pub id: String,
    pub timestamp_usec: Option<String>,
    pub author_external_channel_id: Option<String>,
    pub header: GiftHeader,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftHeader {
    pub live_chat_sponsorships_header_renderer: Option<GiftHeaderRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftHeaderRenderer {
    pub author_name: Option<Text>,
    pub author_photo: Option<Thumbnails>,
    pub primary_text: Option<Text>,
    #[serde(default)]
    pub author_badges: Vec<AuthorBadge>,
}

#[derive(Debug, Deserialize)]
pub struct Runs {
    #[serde(default)]
    pub runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
pub struct Run {
    pub text: Option<String>,
    pub emoji: Option<RunEmoji>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEmoji {
    pub emoji_id: String,
    #[serde(default)]
    pub shortcuts: Vec<String>,
    pub image: Thumbnails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub simple_text: Option<String>,
    #[serde(default)]
    pub runs: Vec<Run>,
}

impl Text {
    pub fn text(&self) -> String {
        match &self.simple_text {
            Some(text) => text.clone(),
            None => self.runs.iter().filter_map(|run| run.text.as_deref()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
}

impl Thumbnails {
    fn largest(&self) -> Option<String> {
        self.thumbnails.last().map(|thumb| normalize_url(&thumb.url))
    }
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorBadge {
    pub live_chat_author_badge_renderer: Option<BadgeRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeRenderer {
    pub custom_thumbnail: Option<Thumbnails>,
    pub icon: Option<BadgeIcon>,
    pub tooltip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeIcon {
    pub icon_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Continuation {
    pub invalidation_continuation_data: Option<ContinuationData>,
    pub timed_continuation_data: Option<ContinuationData>,
    pub reload_continuation_data: Option<ContinuationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationData {
    pub continuation: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPoll {
    pub continuation: String,
    /// Wait the server asked for before the next request.
    pub timeout_ms: Option<u64>,
}

/// One polled page: new chat events plus where to continue.
#[derive(Debug, Clone, Default)]
pub struct ChatPage {
    pub events: Vec<ChatEvent>,
    /// `None` once the stream has ended.
    pub next: Option<NextPoll>,
    /// Actions that could not be read and were dropped.
    pub skipped: usize,
}

pub fn parse_chat_response(response: LiveChatResponse, live_id: &str) -> ChatPage {
    let Some(chat) = response
        .continuation_contents
        .and_then(|contents| contents.live_chat_continuation)
    else {
        return ChatPage::default();
    };

    let next = chat.continuations.into_iter().find_map(|raw| {
        let cont: Continuation = serde_json::from_value(raw)
            .map_err(|err| debug!(target: "livechat::youtube", %err, "unreadable continuation"))
            .ok()?;
        cont.invalidation_continuation_data
            .or(cont.timed_continuation_data)
            .or(cont.reload_continuation_data)
            .map(|data| NextPoll {
                continuation: data.continuation,
                timeout_ms: data.timeout_ms,
            })
    });

    let mut events = Vec::with_capacity(chat.actions.len());
    let mut skipped = 0;
    for raw in chat.actions {
        match serde_json::from_value::<ChatAction>(raw) {
            Ok(action) => {
                if let Some(event) = action
                    .add_chat_item_action
                    .and_then(|add| parse_chat_item(add.item, live_id))
                {
                    events.push(event);
                }
            }
            Err(err) => {
                skipped += 1;
                debug!(target: "livechat::youtube", %err, "skipping malformed chat action");
            }
        }
    }
    ChatPage {
        events,
        next,
        skipped,
    }
}

fn parse_chat_item(item: ChatItem, live_id: &str) -> Option<ChatEvent> {
    if let Some(msg) = item.live_chat_text_message_renderer {
        return Some(message_event(msg, YouTubeKind::Normal, live_id));
    }
    if let Some(msg) = item.live_chat_paid_message_renderer {
        let kind = YouTubeKind::SuperChat {
            amount: msg.purchase_amount_text.as_ref().map(Text::text).unwrap_or_default(),
            color: msg.body_background_color.map(argb_to_hex),
        };
        return Some(message_event(msg, kind, live_id));
    }
    if let Some(msg) = item.live_chat_paid_sticker_renderer {
        let kind = YouTubeKind::SuperSticker {
            amount: msg.purchase_amount_text.as_ref().map(Text::text).unwrap_or_default(),
            color: msg.background_color.map(argb_to_hex),
            sticker_url: msg.sticker.as_ref().and_then(Thumbnails::largest),
        };
        return Some(message_event(msg, kind, live_id));
    }
    if let Some(msg) = item.live_chat_membership_item_renderer {
        let kind = YouTubeKind::Membership {
            header: msg.header_sub_text.as_ref().map(Text::text),
        };
        return Some(message_event(msg, kind, live_id));
    }
    if let Some(gift) = item.live_chat_sponsorships_gift_purchase_announcement_renderer {
        return gift_event(gift, live_id);
    }
    debug!(target: "livechat::youtube", "ignoring unsupported chat item");
    None
}

fn message_event(msg: MessageRenderer, kind: YouTubeKind, live_id: &str) -> ChatEvent {
    let segments = msg.message.map(|runs| runs_to_segments(runs.runs)).unwrap_or_default();
    let mut author = author_from_badges(&msg.author_badges);
    author.id = msg.author_external_channel_id;
    author.name = msg.author_name.as_ref().map(Text::text).unwrap_or_default();
    author.icon_url = msg.author_photo.as_ref().and_then(Thumbnails::largest);
    ChatEvent::new(
        EventKind::YouTube(kind),
        live_id,
        author,
        parse_timestamp(msg.timestamp_usec.as_deref()),
        segments,
        Some(msg.id),
    )
}

fn gift_event(gift: GiftRenderer, live_id: &str) -> Option<ChatEvent> {
    let header = gift.header.live_chat_sponsorships_header_renderer?;
    let primary = header.primary_text.as_ref().map(Text::text);
    let count = header.primary_text.as_ref().and_then(|text| {
        text.runs
            .iter()
            .filter_map(|run| run.text.as_deref())
            .find_map(|run| run.trim().parse::<u32>().ok())
    });
    let mut author = author_from_badges(&header.author_badges);
    author.id = gift.author_external_channel_id;
    author.name = header.author_name.as_ref().map(Text::text).unwrap_or_default();
    author.icon_url = header.author_photo.as_ref().and_then(Thumbnails::largest);
    Some(ChatEvent::new(
        EventKind::YouTube(YouTubeKind::MembershipGift { count }),
        live_id,
        author,
        parse_timestamp(gift.timestamp_usec.as_deref()),
        primary.map(MessageSegment::text).into_iter().collect(),
        Some(gift.id),
    ))
}

fn runs_to_segments(runs: Vec<Run>) -> Vec<MessageSegment> {
    let mut segments: Vec<MessageSegment> = Vec::with_capacity(runs.len());
    for run in runs {
        if let Some(emoji) = run.emoji {
            let name = emoji
                .shortcuts
                .first()
                .cloned()
                .unwrap_or_else(|| emoji.emoji_id.clone());
            segments.push(MessageSegment::Emote(Emote {
                url: emoji.image.largest().unwrap_or_default(),
                id: emoji.emoji_id,
                name,
                animated_url: None,
            }));
        } else if let Some(text) = run.text.filter(|text| !text.is_empty()) {
            // adjacent text runs (links, mentions) collapse into one segment
            match segments.last_mut() {
                Some(MessageSegment::Text(prev)) => prev.push_str(&text),
                _ => segments.push(MessageSegment::Text(text)),
            }
        }
    }
    segments
}

fn author_from_badges(badges: &[AuthorBadge]) -> Author {
    let mut author = Author::default();
    for badge in badges
        .iter()
        .filter_map(|badge| badge.live_chat_author_badge_renderer.as_ref())
    {
        let icon = badge.icon.as_ref().map(|icon| icon.icon_type.as_str());
        match icon {
            Some("OWNER") => author.is_owner = true,
            Some("MODERATOR") => author.is_moderator = true,
            _ => {}
        }
        if badge.custom_thumbnail.is_some() {
            author.is_member = true;
        }
        author.badges.push(Badge {
            id: icon.unwrap_or("MEMBER").to_ascii_lowercase(),
            label: badge.tooltip.clone(),
            url: badge.custom_thumbnail.as_ref().and_then(Thumbnails::largest),
        });
    }
    author
}

fn parse_timestamp(usec: Option<&str>) -> i64 {
    usec.and_then(|value| value.parse::<i64>().ok())
        .map(|value| value / 1_000)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

fn argb_to_hex(argb: i64) -> String {
    format!("#{:06X}", argb & 0x00FF_FFFF)
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

/// Reads the `updated_metadata` response. Unknown actions are ignored.
pub fn parse_metadata(value: &JsonValue) -> LiveMetadata {
    let mut meta = LiveMetadata::default();
    let Some(actions) = value.get("actions").and_then(JsonValue::as_array) else {
        return meta;
    };
    for action in actions {
        if let Some(count) = action
            .pointer("/updateViewershipAction/viewCount/videoViewCountRenderer/originalViewCount")
            .and_then(JsonValue::as_str)
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            meta.viewers = Some(count);
        }
        if let Some(title) = action.pointer("/updateTitleAction/title") {
            meta.title = Some(json_text(title));
        }
        if let Some(description) = action.pointer("/updateDescriptionAction/description") {
            meta.description = Some(json_text(description));
        }
        if let Some(date) = action
            .pointer("/updateDateTextAction/dateText/simpleText")
            .and_then(JsonValue::as_str)
        {
            meta.started_at = Some(date.to_string());
        }
        if let Some(likes) = action
            .pointer("/updateToggleButtonTextAction/defaultText/simpleText")
            .and_then(JsonValue::as_str)
            .and_then(parse_count)
        {
            meta.likes = Some(likes);
        }
    }
    meta
}

fn json_text(value: &JsonValue) -> String {
    if let Some(text) = value.get("simpleText").and_then(JsonValue::as_str) {
        return text.to_string();
    }
    value
        .get("runs")
        .and_then(JsonValue::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|run| run.get("text").and_then(JsonValue::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}
