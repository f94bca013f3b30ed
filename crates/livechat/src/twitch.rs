use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

use crate::cheer::CheerResolver;
use crate::error::{ChatError, ChatResult};
use crate::message::{Author, Badge, ChatEvent, EventKind, TwitchKind};
use crate::tokenizer::{parse_emotes_tag, tokenize, EmoteCache};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ChatCommand {
    Privmsg,
    UserNotice,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TwitchChatMessage {
    pub command: ChatCommand,
    pub channel: String,
    pub login: String,
    pub message: String,
    pub raw_tags: HashMap<String, String>,
}

/// What the adapter needs to know about one line from the chat server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwitchLine {
    Ping(String),
    Chat(TwitchChatMessage),
    RoomState {
        channel: String,
        room_id: Option<String>,
    },
    Notice {
        channel: String,
        message: String,
    },
    Reconnect,
    Other(String),
}

pub fn parse_line(line: &str) -> ChatResult<TwitchLine> {
    if let Some(token) = parse_ping(line) {
        return Ok(TwitchLine::Ping(token));
    }
    let msg = parse_irc_message(line)?;
    let channel = msg
        .params
        .first()
        .map(|param| param.trim_start_matches('#').to_string())
        .unwrap_or_default();
    let parsed = match msg.command.as_str() {
        "PRIVMSG" | "USERNOTICE" => {
            let command = if msg.command == "PRIVMSG" {
                if msg.params.len() < 2 {
                    return Err(ChatError::Parse("PRIVMSG missing params".into()));
                }
                ChatCommand::Privmsg
            } else {
                ChatCommand::UserNotice
            };
            let login = msg
                .tags
                .get("login")
                .filter(|value| !value.is_empty())
                .cloned()
                .or_else(|| {
                    msg.prefix
                        .as_ref()
                        .map(|p| p.split('!').next().unwrap_or(p).to_string())
                })
                .unwrap_or_else(|| "unknown".to_string());
            TwitchLine::Chat(TwitchChatMessage {
                command,
                channel,
                login,
                message: msg.params.get(1).cloned().unwrap_or_default(),
                raw_tags: msg.tags,
            })
        }
        "ROOMSTATE" => TwitchLine::RoomState {
            channel,
            room_id: msg.tags.get("room-id").filter(|v| !v.is_empty()).cloned(),
        },
        "NOTICE" => TwitchLine::Notice {
            channel,
            message: msg.params.get(1).cloned().unwrap_or_default(),
        },
        "RECONNECT" => TwitchLine::Reconnect,
        other => TwitchLine::Other(other.to_string()),
    };
    Ok(parsed)
}

/// Server notices that mean the token was rejected.
pub fn is_auth_failure(notice: &str) -> bool {
    notice.contains("Login authentication failed") || notice.contains("Improperly formatted auth")
}

impl TwitchChatMessage {
    fn tag(&self, key: &str) -> Option<&str> {
        self.raw_tags
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn tag_u32(&self, key: &str) -> Option<u32> {
        self.tag(key).and_then(|value| value.parse::<u32>().ok())
    }

    pub fn kind(&self) -> Option<TwitchKind> {
        match self.command {
            ChatCommand::Privmsg => Some(match self.tag_u32("bits") {
                Some(bits) if bits > 0 => TwitchKind::Cheer { bits },
                _ => TwitchKind::Normal,
            }),
            ChatCommand::UserNotice => match self.tag("msg-id")? {
                "sub" | "resub" => Some(TwitchKind::Sub {
                    prime: self.tag("msg-param-sub-plan") == Some("Prime"),
                    months: self.tag_u32("msg-param-cumulative-months"),
                }),
                // part of a community gift already announced by submysterygift
                "subgift" if self.tag("msg-param-community-gift-id").is_some() => None,
                "subgift" => Some(TwitchKind::SubGift { count: 1 }),
                "submysterygift" => Some(TwitchKind::SubGift {
                    count: self.tag_u32("msg-param-mass-gift-count").unwrap_or(1),
                }),
                _ => None,
            },
        }
    }

    pub fn author(&self) -> Author {
        let badges: Vec<Badge> = self
            .tag("badges")
            .map(|raw| {
                raw.split(',')
                    .filter(|badge| !badge.is_empty())
                    .map(|badge| Badge {
                        id: badge.to_string(),
                        label: None,
                        url: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let has_badge = |name: &str| {
            badges
                .iter()
                .any(|badge| badge.id.split('/').next() == Some(name))
        };
        let is_owner = has_badge("broadcaster");
        let is_moderator = self.tag("mod") == Some("1") || has_badge("moderator");
        let is_member = self.tag("subscriber") == Some("1") || has_badge("subscriber");
        Author {
            id: self.tag("user-id").map(str::to_string),
            name: self.login.clone(),
            display_name: self.tag("display-name").map(unescape_tag_value),
            color: self.tag("color").map(str::to_string),
            icon_url: None,
            badges,
            is_owner,
            is_moderator,
            is_member,
        }
    }

    /// Builds the chat event, or `None` for notices that are not chat activity.
    pub fn to_event(&self, emotes: &EmoteCache, cheers: &CheerResolver) -> Option<ChatEvent> {
        let kind = self.kind()?;
        let ranges = self.tag("emotes").map(parse_emotes_tag).unwrap_or_default();
        let mut segments = tokenize(&self.message, &ranges, emotes).segments;
        if matches!(kind, TwitchKind::Cheer { .. }) {
            segments = cheers.expand(segments);
        }
        let timestamp_ms = self
            .tag("tmi-sent-ts")
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Some(ChatEvent::new(
            EventKind::Twitch(kind),
            self.channel.clone(),
            self.author(),
            timestamp_ms,
            segments,
            self.tag("id").map(str::to_string),
        ))
    }
}

/// Undoes IRCv3 tag escaping (`\s`, `\:`, `\\`, `\r`, `\n`).
pub fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Strips the `oauth:` / `Bearer ` prefixes and URL fragment wrapping users
/// tend to paste along with a token.
pub fn normalize_token(raw: &str) -> Option<String> {
    let mut token = raw.trim();
    if let Some(fragment) = token.strip_prefix('#') {
        token = fragment;
    }
    if token.contains("access_token=") {
        token = token
            .split('&')
            .find_map(|pair| pair.strip_prefix("access_token="))
            .unwrap_or_default();
    }
    let lowered = token.to_ascii_lowercase();
    if lowered.starts_with("oauth:") {
        token = &token[6..];
    } else if lowered.starts_with("bearer ") {
        token = &token[7..];
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Lines sent right after the socket opens.
pub fn login_lines(login: &str, token: &str, channel: &str) -> Vec<String> {
    vec![
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        format!("PASS oauth:{token}"),
        format!("NICK {}", login.to_ascii_lowercase()),
        format!("JOIN #{}", channel.to_ascii_lowercase()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawIrcMessage {
    tags: HashMap<String, String>,
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
}

pub(crate) fn parse_irc_message(line: &str) -> ChatResult<RawIrcMessage> {
    let mut rest = line.trim_end_matches('\n').trim_end_matches('\r');
    let mut tags = HashMap::new();
    if rest.starts_with('@') {
        let Some(idx) = rest.find(' ') else {
            return Err(ChatError::Parse("invalid IRC tags segment".into()));
        };
        let (raw_tags, remainder) = rest.split_at(idx);
        rest = remainder.trim_start();
        for tag in raw_tags.trim_start_matches('@').split(';') {
            let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
            tags.insert(key.to_string(), value.to_string());
        }
    }

    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let Some(idx) = stripped.find(' ') else {
            return Err(ChatError::Parse("invalid IRC prefix segment".into()));
        };
        prefix = Some(stripped[..idx].to_string());
        rest = stripped[idx + 1..].trim_start();
    }

    let (command, params_part) = rest.split_once(' ').unwrap_or((rest, ""));
    if command.is_empty() {
        return Err(ChatError::Parse("missing IRC command".into()));
    }

    let mut params = Vec::new();
    let mut remaining = params_part;
    while !remaining.is_empty() {
        if let Some(trailing) = remaining.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        match remaining.split_once(' ') {
            Some((param, tail)) => {
                if !param.is_empty() {
                    params.push(param.to_string());
                }
                remaining = tail;
            }
            None => {
                params.push(remaining.to_string());
                break;
            }
        }
    }

    Ok(RawIrcMessage {
        tags,
        prefix,
        command: command.to_string(),
        params,
    })
}

lazy_static::lazy_static! {
    static ref PING_RE: Regex = Regex::new(r"^PING :?(?P<token>.+)").unwrap();
}

pub fn parse_ping(line: &str) -> Option<String> {
    PING_RE
        .captures(line.trim())
        .and_then(|caps| caps.name("token").map(|m| m.as_str().to_string()))
}
