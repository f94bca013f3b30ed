use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::time::Instant;
use tracing::{debug, info};

use livechat::youtube::{
    extract_api_key, extract_client_version, extract_continuation, extract_live_video_id,
    parse_chat_response, parse_metadata, ChatPage, LiveChatResponse,
};
use livechat::{ChatError, ChatResult, LiveMetadata, SourceTarget, YouTubeConfig, YouTubeTarget};

use crate::adapter::{AdapterEvent, AdapterEventSender, AdapterWorker, SourceAdapter};

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const FALLBACK_CLIENT_VERSION: &str = "2.20240101.00.00";
const MAX_SERVER_WAIT: Duration = Duration::from_secs(30);

/// Everything needed to keep polling one live chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub live_id: String,
    pub continuation: String,
    pub api_key: Option<String>,
    pub client_version: String,
}

#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// Turns a channel or handle into the id of its current broadcast.
    async fn resolve_live_id(&self, target: &YouTubeTarget) -> ChatResult<String>;

    async fn open_chat(&self, live_id: &str) -> ChatResult<ChatSession>;

    async fn fetch_chat(&self, session: &ChatSession) -> ChatResult<ChatPage>;

    async fn fetch_metadata(&self, session: &ChatSession) -> ChatResult<LiveMetadata>;
}

fn transport(err: reqwest::Error) -> ChatError {
    ChatError::Transport(err.to_string())
}

/// Talks to the web player's internal endpoints.
pub struct InnerTubeClient {
    http: reqwest::Client,
    base_url: String,
    language: String,
    location: String,
}

impl InnerTubeClient {
    pub fn new(config: &YouTubeConfig) -> anyhow::Result<Self> {
        Self::with_base_url(config, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(config: &YouTubeConfig, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36")
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: config.language.clone(),
            location: config.location.clone(),
        })
    }

    fn context(&self, client_version: &str) -> JsonValue {
        json!({
            "client": {
                "clientName": "WEB",
                "clientVersion": client_version,
                "hl": self.language,
                "gl": self.location,
            }
        })
    }

    fn endpoint(&self, path: &str, session: &ChatSession) -> String {
        match &session.api_key {
            Some(key) => format!("{}/youtubei/v1/{path}?key={key}&prettyPrint=false", self.base_url),
            None => format!("{}/youtubei/v1/{path}?prettyPrint=false", self.base_url),
        }
    }

    async fn get_page(&self, url: &str) -> ChatResult<String> {
        let response = self
            .http
            .get(url)
            .header("Accept-Language", self.language.as_str())
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(ChatError::Connection(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response.text().await.map_err(transport)
    }

    async fn post_json(&self, url: &str, body: JsonValue) -> ChatResult<reqwest::Response> {
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(ChatError::Transport(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl YouTubeApi for InnerTubeClient {
    async fn resolve_live_id(&self, target: &YouTubeTarget) -> ChatResult<String> {
        let page_url = match target {
            YouTubeTarget::LiveId(id) => return Ok(id.clone()),
            YouTubeTarget::ChannelId(id) => format!("{}/channel/{id}/live", self.base_url),
            YouTubeTarget::CustomChannelId(name) if name.starts_with('@') => {
                format!("{}/{name}/live", self.base_url)
            }
            YouTubeTarget::CustomChannelId(name) => format!("{}/c/{name}/live", self.base_url),
        };
        let html = self.get_page(&page_url).await?;
        extract_live_video_id(&html)
            .ok_or_else(|| ChatError::Connection(format!("no live stream found at {page_url}")))
    }

    async fn open_chat(&self, live_id: &str) -> ChatResult<ChatSession> {
        let url = format!("{}/live_chat?is_popout=1&v={live_id}", self.base_url);
        let html = self.get_page(&url).await?;
        let continuation = extract_continuation(&html)
            .ok_or_else(|| ChatError::Connection(format!("live chat unavailable for {live_id}")))?;
        Ok(ChatSession {
            live_id: live_id.to_string(),
            continuation,
            api_key: extract_api_key(&html),
            client_version: extract_client_version(&html)
                .unwrap_or_else(|| FALLBACK_CLIENT_VERSION.to_string()),
        })
    }

    async fn fetch_chat(&self, session: &ChatSession) -> ChatResult<ChatPage> {
        let url = self.endpoint("live_chat/get_live_chat", session);
        let body = json!({
            "context": self.context(&session.client_version),
            "continuation": session.continuation,
        });
        let response = self.post_json(&url, body).await?;
        let parsed: LiveChatResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Parse(err.to_string()))?;
        Ok(parse_chat_response(parsed, &session.live_id))
    }

    async fn fetch_metadata(&self, session: &ChatSession) -> ChatResult<LiveMetadata> {
        let url = self.endpoint("updated_metadata", session);
        let body = json!({
            "context": self.context(&session.client_version),
            "videoId": session.live_id,
        });
        let response = self.post_json(&url, body).await?;
        let value: JsonValue = response
            .json()
            .await
            .map_err(|err| ChatError::Parse(err.to_string()))?;
        Ok(parse_metadata(&value))
    }
}

#[derive(Debug, Clone)]
pub struct YouTubePollOptions {
    pub poll_interval: Duration,
    pub metadata_interval: Duration,
}

impl From<&YouTubeConfig> for YouTubePollOptions {
    fn from(config: &YouTubeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            metadata_interval: config.metadata_interval(),
        }
    }
}

pub struct YouTubeAdapter {
    target: SourceTarget,
    api: Arc<dyn YouTubeApi>,
    options: YouTubePollOptions,
    worker: Option<AdapterWorker>,
}

impl YouTubeAdapter {
    pub fn new(target: YouTubeTarget, api: Arc<dyn YouTubeApi>, options: YouTubePollOptions) -> Self {
        Self {
            target: SourceTarget::YouTube(target),
            api,
            options,
            worker: None,
        }
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    fn target(&self) -> &SourceTarget {
        &self.target
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    fn start(&mut self, events: AdapterEventSender) {
        if self.is_running() {
            debug!(target: "livechat::youtube", target_url = %self.target, "already polling");
            return;
        }
        let SourceTarget::YouTube(target) = self.target.clone() else {
            return;
        };
        let api = self.api.clone();
        let options = self.options.clone();
        self.worker = Some(AdapterWorker::spawn(events, move |_cancel, events| {
            poll_chat(api, target, options, events)
        }));
    }

    async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
    }
}

async fn poll_chat(
    api: Arc<dyn YouTubeApi>,
    target: YouTubeTarget,
    options: YouTubePollOptions,
    events: AdapterEventSender,
) -> ChatResult<()> {
    let live_id = api.resolve_live_id(&target).await?;
    let mut session = api.open_chat(&live_id).await?;
    info!(target: "livechat::youtube", %live_id, "live chat opened");
    let _ = events.send(AdapterEvent::Started {
        live_id: live_id.clone(),
    });

    let mut is_first = true;
    let mut next_metadata = Instant::now();
    loop {
        let page = api.fetch_chat(&session).await?;
        if page.skipped > 0 {
            debug!(target: "livechat::youtube", skipped = page.skipped, "dropped unreadable chat actions");
        }
        // history only counts as delivered once a page actually carried items
        if !page.events.is_empty() {
            debug!(target: "livechat::youtube", count = page.events.len(), is_first, "chat page");
            let _ = events.send(AdapterEvent::ChatBatch {
                events: page.events,
                is_first,
            });
            is_first = false;
        }

        let Some(next) = page.next else {
            info!(target: "livechat::youtube", %live_id, "live chat ended");
            return Ok(());
        };
        session.continuation = next.continuation;

        if Instant::now() >= next_metadata {
            match api.fetch_metadata(&session).await {
                Ok(metadata) => {
                    let _ = events.send(AdapterEvent::MetadataUpdated(metadata));
                }
                Err(err) => debug!(target: "livechat::youtube", %err, "metadata refresh failed"),
            }
            next_metadata = Instant::now() + options.metadata_interval;
        }

        let server_wait = Duration::from_millis(next.timeout_ms.unwrap_or(0)).min(MAX_SERVER_WAIT);
        tokio::time::sleep(options.poll_interval.max(server_wait)).await;
    }
}
