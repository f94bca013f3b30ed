use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ChatError, ChatResult};
use crate::message::Source;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum YouTubeTarget {
    LiveId(String),
    ChannelId(String),
    /// `/c/<name>` or `/@handle` (the handle keeps its `@`).
    CustomChannelId(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceTarget {
    YouTube(YouTubeTarget),
    Twitch { channel: String },
}

impl SourceTarget {
    pub fn source(&self) -> Source {
        match self {
            SourceTarget::YouTube(_) => Source::YouTube,
            SourceTarget::Twitch { .. } => Source::Twitch,
        }
    }
}

impl fmt::Display for SourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTarget::YouTube(YouTubeTarget::LiveId(id)) => write!(f, "youtube live {id}"),
            SourceTarget::YouTube(YouTubeTarget::ChannelId(id)) => {
                write!(f, "youtube channel {id}")
            }
            SourceTarget::YouTube(YouTubeTarget::CustomChannelId(name)) => {
                write!(f, "youtube channel {name}")
            }
            SourceTarget::Twitch { channel } => write!(f, "twitch #{channel}"),
        }
    }
}

/// Maps a user supplied URL onto the provider that serves it.
pub fn classify(input: &str) -> ChatResult<SourceTarget> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ChatError::UrlUnsupported("empty url".into()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|err| ChatError::UrlUnsupported(format!("{trimmed}: {err}")))?;
    let host = url
        .host_str()
        .map(|host| host.to_ascii_lowercase())
        .ok_or_else(|| ChatError::UrlUnsupported(trimmed.to_string()))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();

    let target = if host == "youtu.be" {
        segments
            .first()
            .map(|id| SourceTarget::YouTube(YouTubeTarget::LiveId(id.to_string())))
    } else if host_matches(&host, "youtube.com") {
        youtube_target(&url, &segments).map(SourceTarget::YouTube)
    } else if host_matches(&host, "twitch.tv") {
        segments
            .first()
            .filter(|name| is_twitch_login(name))
            .map(|name| SourceTarget::Twitch {
                channel: name.to_ascii_lowercase(),
            })
    } else {
        None
    };
    target.ok_or_else(|| ChatError::UrlUnsupported(trimmed.to_string()))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |rest| rest.ends_with('.'))
}

fn youtube_target(url: &Url, segments: &[&str]) -> Option<YouTubeTarget> {
    match segments {
        ["watch", ..] => url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty())
            .map(YouTubeTarget::LiveId),
        ["live", id, ..] => Some(YouTubeTarget::LiveId(id.to_string())),
        ["channel", id, ..] => Some(YouTubeTarget::ChannelId(id.to_string())),
        ["c", name, ..] => Some(YouTubeTarget::CustomChannelId(name.to_string())),
        [handle, ..] if handle.starts_with('@') && handle.len() > 1 => {
            Some(YouTubeTarget::CustomChannelId(handle.to_string()))
        }
        _ => None,
    }
}

fn is_twitch_login(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube(target: YouTubeTarget) -> SourceTarget {
        SourceTarget::YouTube(target)
    }

    #[test]
    fn youtube_forms() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc123XYZ_-&t=10").unwrap(),
            youtube(YouTubeTarget::LiveId("abc123XYZ_-".into()))
        );
        assert_eq!(
            classify("https://youtu.be/abc123").unwrap(),
            youtube(YouTubeTarget::LiveId("abc123".into()))
        );
        assert_eq!(
            classify("https://m.youtube.com/live/xyz").unwrap(),
            youtube(YouTubeTarget::LiveId("xyz".into()))
        );
        assert_eq!(
            classify("https://www.youtube.com/channel/UC123").unwrap(),
            youtube(YouTubeTarget::ChannelId("UC123".into()))
        );
        assert_eq!(
            classify("https://www.youtube.com/c/SomeName").unwrap(),
            youtube(YouTubeTarget::CustomChannelId("SomeName".into()))
        );
        assert_eq!(
            classify("youtube.com/@handle").unwrap(),
            youtube(YouTubeTarget::CustomChannelId("@handle".into()))
        );
    }

    #[test]
    fn twitch_channel_is_lowercased() {
        assert_eq!(
            classify("https://www.twitch.tv/SomeStreamer").unwrap(),
            SourceTarget::Twitch {
                channel: "somestreamer".into()
            }
        );
        assert_eq!(
            classify("twitch.tv/foo_bar/videos").unwrap().source(),
            Source::Twitch
        );
    }

    #[test]
    fn unsupported_inputs() {
        for input in [
            "",
            "https://example.com/watch?v=1",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/",
            "https://twitch.tv/",
            "https://notyoutube.com/watch?v=1",
        ] {
            assert!(
                matches!(classify(input), Err(ChatError::UrlUnsupported(_))),
                "{input} should be rejected"
            );
        }
    }
}
