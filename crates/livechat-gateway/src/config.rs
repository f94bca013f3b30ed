use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// Plain substrings, or `/pattern/` for a regular expression.
    #[serde(default)]
    pub blocked_words: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_relay_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TtsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub include_emotes: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: f32,
    #[serde(default)]
    pub templates: TtsTemplates,
}

/// Utterance templates. `$(Name)`, `$(Message)`, `$(Amount)` and `$(GiftNum)`
/// are substituted per event.
#[derive(Debug, Deserialize, Clone)]
pub struct TtsTemplates {
    #[serde(default = "default_normal_template")]
    pub youtube_normal: String,
    #[serde(default = "default_superchat_template")]
    pub youtube_superchat: String,
    #[serde(default = "default_supersticker_template")]
    pub youtube_supersticker: String,
    #[serde(default = "default_membership_template")]
    pub youtube_membership: String,
    #[serde(default = "default_membership_gift_template")]
    pub youtube_membership_gift: String,
    #[serde(default = "default_normal_template")]
    pub twitch_normal: String,
    #[serde(default = "default_cheer_template")]
    pub twitch_cheer: String,
    #[serde(default = "default_sub_template")]
    pub twitch_sub: String,
    #[serde(default = "default_prime_sub_template")]
    pub twitch_prime_sub: String,
    #[serde(default = "default_sub_gift_template")]
    pub twitch_sub_gift: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: default_relay_capacity(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_tts_endpoint(),
            timeout_secs: Some(15),
            include_emotes: false,
            queue_capacity: default_queue_capacity(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            templates: TtsTemplates::default(),
        }
    }
}

impl Default for TtsTemplates {
    fn default() -> Self {
        Self {
            youtube_normal: default_normal_template(),
            youtube_superchat: default_superchat_template(),
            youtube_supersticker: default_supersticker_template(),
            youtube_membership: default_membership_template(),
            youtube_membership_gift: default_membership_gift_template(),
            twitch_normal: default_normal_template(),
            twitch_cheer: default_cheer_template(),
            twitch_sub: default_sub_template(),
            twitch_prime_sub: default_prime_sub_template(),
            twitch_sub_gift: default_sub_gift_template(),
        }
    }
}

fn default_log_capacity() -> usize {
    500
}

fn default_relay_capacity() -> usize {
    256
}

fn default_queue_capacity() -> usize {
    256
}

fn default_rate_limit_per_sec() -> f32 {
    1.5
}

fn default_tts_endpoint() -> String {
    "http://127.0.0.1:50080/talk".to_string()
}

fn default_normal_template() -> String {
    "$(Message)".into()
}

fn default_superchat_template() -> String {
    "$(Name) sent $(Amount) Super Chat. $(Message)".into()
}

fn default_supersticker_template() -> String {
    "$(Name) sent a $(Amount) Super Sticker".into()
}

fn default_membership_template() -> String {
    "$(Name) became a member. $(Message)".into()
}

fn default_membership_gift_template() -> String {
    "$(Name) gifted $(GiftNum) memberships".into()
}

fn default_cheer_template() -> String {
    "$(Name) cheered $(Amount) bits. $(Message)".into()
}

fn default_sub_template() -> String {
    "$(Name) subscribed. $(Message)".into()
}

fn default_prime_sub_template() -> String {
    "$(Name) subscribed with Prime. $(Message)".into()
}

fn default_sub_gift_template() -> String {
    "$(Name) gifted $(GiftNum) subs".into()
}
