use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use livechat::message::{ChatEvent, EventKind, TwitchKind, YouTubeKind};

use crate::config::{TtsConfig, TtsTemplates};

#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub name: &'a str,
    pub message: &'a str,
    pub amount: &'a str,
    pub gift_num: &'a str,
}

pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    template
        .replace("$(Name)", vars.name)
        .replace("$(Message)", vars.message)
        .replace("$(Amount)", vars.amount)
        .replace("$(GiftNum)", vars.gift_num)
}

/// Turns chat events into text for the speech engine.
#[derive(Debug, Clone)]
pub struct UtteranceBuilder {
    templates: TtsTemplates,
    include_emotes: bool,
}

impl UtteranceBuilder {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            templates: config.templates.clone(),
            include_emotes: config.include_emotes,
        }
    }

    fn template(&self, kind: &EventKind) -> Option<&str> {
        let t = &self.templates;
        let template = match kind {
            EventKind::YouTube(YouTubeKind::Normal) => &t.youtube_normal,
            EventKind::YouTube(YouTubeKind::SuperChat { .. }) => &t.youtube_superchat,
            EventKind::YouTube(YouTubeKind::SuperSticker { .. }) => &t.youtube_supersticker,
            EventKind::YouTube(YouTubeKind::Membership { .. }) => &t.youtube_membership,
            EventKind::YouTube(YouTubeKind::MembershipGift { .. }) => &t.youtube_membership_gift,
            EventKind::Twitch(TwitchKind::Normal) => &t.twitch_normal,
            EventKind::Twitch(TwitchKind::Cheer { .. }) => &t.twitch_cheer,
            EventKind::Twitch(TwitchKind::Sub { prime: true, .. }) => &t.twitch_prime_sub,
            EventKind::Twitch(TwitchKind::Sub { prime: false, .. }) => &t.twitch_sub,
            EventKind::Twitch(TwitchKind::SubGift { .. }) => &t.twitch_sub_gift,
            EventKind::App(_) => return None,
        };
        Some(template)
    }

    /// `None` for application lines and for utterances that are blank after
    /// substitution.
    pub fn utterance(&self, event: &ChatEvent) -> Option<String> {
        let template = self.template(&event.kind)?;
        let message = event.plain_text(self.include_emotes);
        let amount = event.kind.amount().unwrap_or_default();
        let gift_num = event
            .kind
            .gift_count()
            .map(|count| count.to_string())
            .unwrap_or_default();
        let text = render_template(
            template,
            &TemplateVars {
                name: event.author.label(),
                message: message.trim(),
                amount: &amount,
                gift_num: &gift_num,
            },
        );
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Playback commands understood by the speech daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechControl {
    Pause,
    Resume,
    Skip,
    Clear,
}

impl SpeechControl {
    pub fn as_str(self) -> &'static str {
        match self {
            SpeechControl::Pause => "pause",
            SpeechControl::Resume => "resume",
            SpeechControl::Skip => "skip",
            SpeechControl::Clear => "clear",
        }
    }
}

impl fmt::Display for SpeechControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    async fn control(&self, command: SpeechControl) -> Result<()>;
}

/// Local speech daemon that takes `GET <endpoint>?text=<utterance>`.
/// Controls live beside the talk path (`/talk` -> `/pause`, `/skip`, ...).
#[derive(Clone)]
pub struct HttpSpeechSink {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpSpeechSink {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http = builder.build()?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            http,
        })
    }

    pub fn request_url(&self, text: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}text={}",
            self.endpoint,
            separator,
            urlencoding::encode(text)
        )
    }

    pub fn control_url(&self, command: SpeechControl) -> Result<String> {
        let talk = Url::parse(&self.endpoint)
            .with_context(|| format!("invalid speech endpoint {}", self.endpoint))?;
        let url = talk.join(command.as_str())?;
        Ok(url.to_string())
    }

    async fn get(&self, url: String) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| "failed to send speech request")?;
        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!(
                "speech server returned status {}",
                response.status()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSink for HttpSpeechSink {
    async fn speak(&self, text: &str) -> Result<()> {
        self.get(self.request_url(text)).await
    }

    async fn control(&self, command: SpeechControl) -> Result<()> {
        let url = self.control_url(command)?;
        tracing::debug!(target: "livechat::tts", %command, "speech control");
        self.get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livechat::message::{AppLevel, Author, Emote, MessageSegment};

    fn event(kind: EventKind, segments: Vec<MessageSegment>) -> ChatEvent {
        ChatEvent::new(
            kind,
            "chan",
            Author {
                name: "fan".into(),
                display_name: Some("Fan".into()),
                ..Author::default()
            },
            0,
            segments,
            None,
        )
    }

    fn builder(include_emotes: bool) -> UtteranceBuilder {
        UtteranceBuilder::new(&TtsConfig {
            include_emotes,
            ..TtsConfig::default()
        })
    }

    #[test]
    fn template_substitution() {
        let vars = TemplateVars {
            name: "A",
            message: "hi",
            amount: "$5",
            gift_num: "3",
        };
        assert_eq!(
            render_template("$(Name):$(Message):$(Amount):$(GiftNum):$(Name)", &vars),
            "A:hi:$5:3:A"
        );
    }

    #[test]
    fn utterances_per_kind() {
        let b = builder(false);
        let cheer = event(
            EventKind::Twitch(TwitchKind::Cheer { bits: 100 }),
            vec![MessageSegment::text("gg")],
        );
        assert_eq!(b.utterance(&cheer).unwrap(), "Fan cheered 100 bits. gg");

        let gift = event(EventKind::Twitch(TwitchKind::SubGift { count: 5 }), vec![]);
        assert_eq!(b.utterance(&gift).unwrap(), "Fan gifted 5 subs");

        let app = event(EventKind::App(AppLevel::Info), vec![MessageSegment::text("x")]);
        assert!(b.utterance(&app).is_none());
    }

    #[test]
    fn emote_only_message_is_silent_without_emotes() {
        let emote = MessageSegment::Emote(Emote {
            id: "25".into(),
            name: "Kappa".into(),
            url: "u".into(),
            animated_url: None,
        });
        let normal = event(
            EventKind::YouTube(YouTubeKind::Normal),
            vec![emote, MessageSegment::text("  ")],
        );
        assert!(builder(false).utterance(&normal).is_none());
        assert_eq!(builder(true).utterance(&normal).unwrap(), "Kappa");
    }

    #[test]
    fn request_url_encodes_text() {
        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: "http://127.0.0.1:50080/talk".into(),
            ..TtsConfig::default()
        })
        .unwrap();
        assert_eq!(
            sink.request_url("hello world&more"),
            "http://127.0.0.1:50080/talk?text=hello%20world%26more"
        );
    }

    #[tokio::test]
    async fn http_sink_sends_text() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET)
                .path("/talk")
                .query_param("text", "hello there");
            then.status(200);
        });

        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: format!("{}/talk", server.base_url()),
            timeout_secs: Some(5),
            ..TtsConfig::default()
        })
        .unwrap();

        sink.speak("hello there").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_sink_reports_failure_status() {
        let server = httpmock::MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/talk");
            then.status(500);
        });
        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: format!("{}/talk", server.base_url()),
            ..TtsConfig::default()
        })
        .unwrap();
        assert!(sink.speak("x").await.is_err());
    }

    #[test]
    fn control_urls_sit_beside_talk() {
        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: "http://127.0.0.1:50080/talk".into(),
            ..TtsConfig::default()
        })
        .unwrap();
        assert_eq!(
            sink.control_url(SpeechControl::Pause).unwrap(),
            "http://127.0.0.1:50080/pause"
        );
        assert_eq!(
            sink.control_url(SpeechControl::Clear).unwrap(),
            "http://127.0.0.1:50080/clear"
        );
    }

    #[tokio::test]
    async fn http_sink_sends_controls() {
        let server = httpmock::MockServer::start_async().await;
        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: format!("{}/talk", server.base_url()),
            timeout_secs: Some(5),
            ..TtsConfig::default()
        })
        .unwrap();

        for command in [
            SpeechControl::Pause,
            SpeechControl::Resume,
            SpeechControl::Skip,
            SpeechControl::Clear,
        ] {
            let mock = server.mock(|when, then| {
                when.method(httpmock::Method::GET)
                    .path(format!("/{}", command.as_str()));
                then.status(200);
            });
            sink.control(command).await.unwrap();
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn control_failure_is_reported() {
        let server = httpmock::MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/skip");
            then.status(503);
        });
        let sink = HttpSpeechSink::new(&TtsConfig {
            endpoint: format!("{}/talk", server.base_url()),
            ..TtsConfig::default()
        })
        .unwrap();
        assert!(sink.control(SpeechControl::Skip).await.is_err());
    }

    #[test]
    fn control_names_deserialize() {
        let command: SpeechControl = serde_json::from_str("\"resume\"").unwrap();
        assert_eq!(command, SpeechControl::Resume);
        assert!(serde_json::from_str::<SpeechControl>("\"louder\"").is_err());
    }
}
