use std::time::Duration;

use serde::Deserialize;

const MIN_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub twitch: TwitchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YouTubeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_youtube_metadata_interval_secs")]
    pub metadata_interval_secs: u64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitchConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub oauth_token: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_twitch_metadata_interval_secs")]
    pub metadata_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_youtube_metadata_interval_secs() -> u64 {
    10
}

fn default_twitch_metadata_interval_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".into()
}

fn default_location() -> String {
    "US".into()
}

fn default_redirect_uri() -> String {
    "http://localhost:50930/twitch_redirect".into()
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            metadata_interval_secs: default_youtube_metadata_interval_secs(),
            language: default_language(),
            location: default_location(),
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            oauth_token: None,
            redirect_uri: default_redirect_uri(),
            metadata_interval_secs: default_twitch_metadata_interval_secs(),
        }
    }
}

impl YouTubeConfig {
    /// Configured poll interval, never below one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn metadata_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_interval_secs.max(1))
    }
}

impl TwitchConfig {
    pub fn metadata_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_interval_secs.max(1))
    }
}
