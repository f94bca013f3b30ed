use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livechat::cheer::HelixCheermoteResponse;
use livechat::tokenizer::HelixEmoteResponse;
use livechat::twitch::{is_auth_failure, login_lines, normalize_token, parse_line, TwitchLine};
use livechat::{
    ChatError, ChatResult, CheerResolver, CheermoteTable, EmoteCache, LiveMetadata, SourceTarget,
};

use crate::adapter::{AdapterEvent, AdapterEventSender, AdapterWorker, SourceAdapter};
use crate::irc::TwitchChatConnector;

const ID_BASE_URL: &str = "https://id.twitch.tv";
const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Last accepted OAuth token, shared by every Twitch connection.
pub type TokenStore = Arc<RwLock<Option<String>>>;

pub fn token_store(initial: Option<&str>) -> TokenStore {
    Arc::new(RwLock::new(initial.and_then(normalize_token)))
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub login: String,
    pub user_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[async_trait]
pub trait TokenDelegate: Send + Sync {
    /// Obtains a fresh user token, possibly by waiting on the user.
    async fn acquire_token(&self, client_id: &str) -> ChatResult<String>;
}

/// Hands out the token from the config file and nothing else.
pub struct StaticTokenDelegate {
    token: Option<String>,
}

impl StaticTokenDelegate {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenDelegate for StaticTokenDelegate {
    async fn acquire_token(&self, _client_id: &str) -> ChatResult<String> {
        self.token
            .clone()
            .ok_or_else(|| ChatError::Token("no twitch token configured".into()))
    }
}

/// Implicit-grant flow: logs the authorize URL and waits until the redirect
/// page posts the token back through [`RedirectTokenDelegate::deliver`].
/// Every connection waiting at that moment receives the same token.
pub struct RedirectTokenDelegate {
    redirect_uri: String,
    pending: Mutex<Vec<oneshot::Sender<String>>>,
}

impl RedirectTokenDelegate {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn authorize_url(&self, client_id: &str) -> ChatResult<Url> {
        Url::parse_with_params(
            &format!("{ID_BASE_URL}/oauth2/authorize"),
            &[
                ("client_id", client_id),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "token"),
                ("scope", "chat:read"),
            ],
        )
        .map_err(|err| ChatError::Token(err.to_string()))
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.lock().iter().any(|tx| !tx.is_closed())
    }

    /// Returns false when nobody is waiting or the token is empty.
    pub fn deliver(&self, raw: &str) -> bool {
        let Some(token) = normalize_token(raw) else {
            return false;
        };
        let waiters = std::mem::take(&mut *self.pending.lock());
        let mut delivered = 0;
        for tx in waiters {
            if tx.send(token.clone()).is_ok() {
                delivered += 1;
            }
        }
        if delivered > 1 {
            debug!(target: "livechat::twitch", delivered, "token shared with every waiting connection");
        }
        delivered > 0
    }
}

#[async_trait]
impl TokenDelegate for RedirectTokenDelegate {
    async fn acquire_token(&self, client_id: &str) -> ChatResult<String> {
        if client_id.is_empty() {
            return Err(ChatError::Token("twitch client_id is not configured".into()));
        }
        let url = self.authorize_url(client_id)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            pending.retain(|waiting| !waiting.is_closed());
            pending.push(tx);
        }
        info!(target: "livechat::twitch", %url, "authorize twitch chat access in a browser");
        rx.await
            .map_err(|_| ChatError::Token("authorization was abandoned".into()))
    }
}

#[async_trait]
pub trait TwitchHelix: Send + Sync {
    async fn validate_token(&self, token: &str) -> ChatResult<TokenInfo>;

    /// Global emotes plus the channel's own.
    async fn emotes(&self, token: &str, broadcaster_id: &str) -> ChatResult<EmoteCache>;

    async fn cheermotes(&self, token: &str, broadcaster_id: &str) -> ChatResult<CheermoteTable>;

    async fn stream_metadata(&self, token: &str, channel: &str) -> ChatResult<LiveMetadata>;
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    data: Vec<StreamData>,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    game_name: Option<String>,
    #[serde(default)]
    viewer_count: Option<u64>,
    #[serde(default)]
    started_at: Option<String>,
}

pub struct HelixClient {
    http: reqwest::Client,
    client_id: String,
    id_base: String,
    api_base: String,
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_base_urls(client_id, ID_BASE_URL, HELIX_BASE_URL)
    }

    pub fn with_base_urls(
        client_id: impl Into<String>,
        id_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            id_base: id_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_helix<T>(&self, token: &str, path: &str, query: &[(&str, &str)]) -> ChatResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{path}", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .header("Client-Id", self.client_id.as_str())
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ChatError::Token(format!("{path} rejected the token"))),
            status if !status.is_success() => {
                Err(ChatError::Transport(format!("{path} returned {status}")))
            }
            _ => response
                .json::<T>()
                .await
                .map_err(|err| ChatError::Parse(err.to_string())),
        }
    }
}

#[async_trait]
impl TwitchHelix for HelixClient {
    async fn validate_token(&self, token: &str) -> ChatResult<TokenInfo> {
        let response = self
            .http
            .get(format!("{}/oauth2/validate", self.id_base))
            .header("Authorization", format!("OAuth {token}"))
            .send()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ChatError::Token("token is invalid or expired".into())),
            status if !status.is_success() => {
                Err(ChatError::Transport(format!("token validation returned {status}")))
            }
            _ => response
                .json::<TokenInfo>()
                .await
                .map_err(|err| ChatError::Parse(err.to_string())),
        }
    }

    async fn emotes(&self, token: &str, broadcaster_id: &str) -> ChatResult<EmoteCache> {
        let mut cache = EmoteCache::new();
        let global: HelixEmoteResponse = self.get_helix(token, "chat/emotes/global", &[]).await?;
        cache.extend_from_helix(&global);
        let channel: HelixEmoteResponse = self
            .get_helix(token, "chat/emotes", &[("broadcaster_id", broadcaster_id)])
            .await?;
        cache.extend_from_helix(&channel);
        Ok(cache)
    }

    async fn cheermotes(&self, token: &str, broadcaster_id: &str) -> ChatResult<CheermoteTable> {
        let response: HelixCheermoteResponse = self
            .get_helix(token, "bits/cheermotes", &[("broadcaster_id", broadcaster_id)])
            .await?;
        Ok(CheermoteTable::from_helix(&response))
    }

    async fn stream_metadata(&self, token: &str, channel: &str) -> ChatResult<LiveMetadata> {
        let response: StreamsResponse = self
            .get_helix(token, "streams", &[("user_login", channel)])
            .await?;
        // an offline channel has no entry
        let Some(stream) = response.data.into_iter().next() else {
            return Ok(LiveMetadata::default());
        };
        Ok(LiveMetadata {
            title: stream.title,
            viewers: stream.viewer_count,
            category: stream.game_name,
            started_at: stream.started_at,
            ..LiveMetadata::default()
        })
    }
}

/// Collaborators shared by every Twitch adapter.
#[derive(Clone)]
pub struct TwitchDeps {
    pub client_id: String,
    pub helix: Arc<dyn TwitchHelix>,
    pub irc: Arc<dyn TwitchChatConnector>,
    pub delegate: Arc<dyn TokenDelegate>,
    pub tokens: TokenStore,
    pub metadata_interval: Duration,
}

pub struct TwitchAdapter {
    target: SourceTarget,
    channel: String,
    deps: TwitchDeps,
    worker: Option<AdapterWorker>,
}

impl TwitchAdapter {
    pub fn new(channel: impl Into<String>, deps: TwitchDeps) -> Self {
        let channel = channel.into().to_ascii_lowercase();
        Self {
            target: SourceTarget::Twitch {
                channel: channel.clone(),
            },
            channel,
            deps,
            worker: None,
        }
    }
}

#[async_trait]
impl SourceAdapter for TwitchAdapter {
    fn target(&self) -> &SourceTarget {
        &self.target
    }

    fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    fn start(&mut self, events: AdapterEventSender) {
        if self.is_running() {
            debug!(target: "livechat::twitch", channel = %self.channel, "already connected");
            return;
        }
        let channel = self.channel.clone();
        let deps = self.deps.clone();
        self.worker = Some(AdapterWorker::spawn(events, move |cancel, events| {
            read_chat(channel, deps, cancel, events)
        }));
    }

    async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
    }
}

/// A stored token is reused while it validates; otherwise the delegate is
/// asked for a new one.
async fn authorize(deps: &TwitchDeps, events: &AdapterEventSender) -> ChatResult<(String, TokenInfo)> {
    let stored = deps.tokens.read().clone();
    if let Some(token) = stored {
        match deps.helix.validate_token(&token).await {
            Ok(info) => return Ok((token, info)),
            Err(ChatError::Token(reason)) => {
                info!(target: "livechat::twitch", %reason, "stored token rejected, requesting a new one");
                deps.tokens.write().take();
            }
            Err(err) => return Err(err),
        }
    }

    let raw = deps.delegate.acquire_token(&deps.client_id).await?;
    let token = normalize_token(&raw).ok_or_else(|| ChatError::Token("received an empty token".into()))?;
    let info = deps.helix.validate_token(&token).await?;
    *deps.tokens.write() = Some(token.clone());
    let _ = events.send(AdapterEvent::TokenAcquired(token.clone()));
    Ok((token, info))
}

async fn read_chat(
    channel: String,
    deps: TwitchDeps,
    cancel: CancellationToken,
    events: AdapterEventSender,
) -> ChatResult<()> {
    let (token, account) = authorize(&deps, &events).await?;
    let mut conn = deps.irc.connect().await?;
    for line in login_lines(&account.login, &token, &channel) {
        conn.send_line(&line).await?;
    }

    let metadata_cancel = cancel.child_token();
    let _metadata_guard = metadata_cancel.clone().drop_guard();
    let mut emotes = EmoteCache::new();
    let mut cheers = CheerResolver::default();
    let mut joined = false;

    loop {
        let Some(line) = conn.next_line().await? else {
            info!(target: "livechat::twitch", %channel, "chat server closed the connection");
            return Ok(());
        };
        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(target: "livechat::twitch", %err, "skipping unparsable line");
                continue;
            }
        };
        match parsed {
            TwitchLine::Ping(payload) => conn.send_line(&format!("PONG :{payload}")).await?,
            TwitchLine::RoomState { room_id, .. } if !joined => {
                joined = true;
                info!(target: "livechat::twitch", %channel, "joined channel");
                let _ = events.send(AdapterEvent::Started {
                    live_id: channel.clone(),
                });
                if let Some(room_id) = room_id {
                    match deps.helix.emotes(&token, &room_id).await {
                        Ok(cache) => emotes = cache,
                        Err(err) => warn!(target: "livechat::twitch", %err, "emote list unavailable"),
                    }
                    match deps.helix.cheermotes(&token, &room_id).await {
                        Ok(table) => cheers = CheerResolver::new(table),
                        Err(err) => warn!(target: "livechat::twitch", %err, "cheermote list unavailable"),
                    }
                }
                tokio::spawn(refresh_metadata(
                    deps.helix.clone(),
                    token.clone(),
                    channel.clone(),
                    deps.metadata_interval,
                    events.clone(),
                    metadata_cancel.clone(),
                ));
            }
            TwitchLine::Chat(message) => {
                if let Some(event) = message.to_event(&emotes, &cheers) {
                    let _ = events.send(AdapterEvent::ChatBatch {
                        events: vec![event],
                        is_first: false,
                    });
                }
            }
            TwitchLine::Notice { message, .. } if is_auth_failure(&message) => {
                deps.tokens.write().take();
                return Err(ChatError::Token(message));
            }
            TwitchLine::Notice { message, .. } => {
                debug!(target: "livechat::twitch", %message, "notice");
            }
            TwitchLine::Reconnect => {
                info!(target: "livechat::twitch", %channel, "server requested reconnect");
                return Ok(());
            }
            TwitchLine::RoomState { .. } | TwitchLine::Other(_) => {}
        }
    }
}

async fn refresh_metadata(
    helix: Arc<dyn TwitchHelix>,
    token: String,
    channel: String,
    interval: Duration,
    events: AdapterEventSender,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = helix.stream_metadata(&token, &channel) => result,
        };
        match result {
            Ok(metadata) => {
                if events.send(AdapterEvent::MetadataUpdated(metadata)).is_err() {
                    break;
                }
            }
            Err(err) => debug!(target: "livechat::twitch", %err, "stream metadata refresh failed"),
        }
    }
    debug!(target: "livechat::twitch", %channel, "metadata refresh stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::IrcConnection;
    use httpmock::prelude::*;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    const ROOMSTATE: &str = "@emote-only=0;room-id=12345 :tmi.twitch.tv ROOMSTATE #streamer";
    const PRIVMSG: &str = "@badges=;color=#FF0000;display-name=Viewer;emotes=;id=msg-1;tmi-sent-ts=1700000000000;user-id=42 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #streamer :hello there";

    struct ScriptedConnection {
        lines: VecDeque<String>,
        sent: Arc<Mutex<Vec<String>>>,
        hang: bool,
    }

    #[async_trait]
    impl IrcConnection for ScriptedConnection {
        async fn next_line(&mut self) -> ChatResult<Option<String>> {
            match self.lines.pop_front() {
                Some(line) => Ok(Some(line)),
                None if self.hang => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn send_line(&mut self, line: &str) -> ChatResult<()> {
            self.sent.lock().push(line.to_string());
            Ok(())
        }
    }

    struct ScriptedConnector {
        lines: Vec<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
        hang: bool,
    }

    #[async_trait]
    impl TwitchChatConnector for ScriptedConnector {
        async fn connect(&self) -> ChatResult<Box<dyn IrcConnection>> {
            Ok(Box::new(ScriptedConnection {
                lines: self.lines.iter().map(|line| line.to_string()).collect(),
                sent: self.sent.clone(),
                hang: self.hang,
            }))
        }
    }

    struct FakeHelix;

    #[async_trait]
    impl TwitchHelix for FakeHelix {
        async fn validate_token(&self, token: &str) -> ChatResult<TokenInfo> {
            if token == "good" {
                Ok(TokenInfo {
                    login: "Reader".into(),
                    user_id: "7".into(),
                    client_id: None,
                })
            } else {
                Err(ChatError::Token("invalid".into()))
            }
        }

        async fn emotes(&self, _token: &str, _broadcaster_id: &str) -> ChatResult<EmoteCache> {
            Ok(EmoteCache::new())
        }

        async fn cheermotes(&self, _token: &str, _broadcaster_id: &str) -> ChatResult<CheermoteTable> {
            Err(ChatError::Transport("unavailable".into()))
        }

        async fn stream_metadata(&self, _token: &str, _channel: &str) -> ChatResult<LiveMetadata> {
            Ok(LiveMetadata {
                title: Some("speedrun".into()),
                ..LiveMetadata::default()
            })
        }
    }

    fn deps(lines: Vec<&'static str>, hang: bool, delegate_token: Option<&str>, stored: Option<&str>) -> (TwitchDeps, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let deps = TwitchDeps {
            client_id: "client".into(),
            helix: Arc::new(FakeHelix),
            irc: Arc::new(ScriptedConnector {
                lines,
                sent: sent.clone(),
                hang,
            }),
            delegate: Arc::new(StaticTokenDelegate::new(delegate_token.map(str::to_string))),
            tokens: token_store(stored),
            metadata_interval: Duration::from_secs(60),
        };
        (deps, sent)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<AdapterEvent>) -> AdapterEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("adapter went quiet")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn acquires_token_then_reads_chat() {
        let (deps, sent) = deps(
            vec![ROOMSTATE, "PING :tmi.twitch.tv", PRIVMSG],
            false,
            Some("oauth:good"),
            None,
        );
        let tokens = deps.tokens.clone();
        let mut adapter = TwitchAdapter::new("Streamer", deps);
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.start(tx);

        assert!(matches!(next_event(&mut rx).await, AdapterEvent::TokenAcquired(token) if token == "good"));
        assert!(matches!(next_event(&mut rx).await, AdapterEvent::Started { live_id } if live_id == "streamer"));

        let mut saw_chat = false;
        loop {
            match next_event(&mut rx).await {
                AdapterEvent::ChatBatch { events, is_first } => {
                    assert!(!is_first);
                    assert_eq!(events[0].plain_text(true), "hello there");
                    assert_eq!(events[0].author.label(), "Viewer");
                    saw_chat = true;
                }
                AdapterEvent::MetadataUpdated(meta) => {
                    assert_eq!(meta.title.as_deref(), Some("speedrun"));
                }
                AdapterEvent::Stopped => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(saw_chat);

        assert_eq!(tokens.read().as_deref(), Some("good"));
        let sent = sent.lock().clone();
        assert!(sent.contains(&"PASS oauth:good".to_string()));
        assert!(sent.contains(&"NICK reader".to_string()));
        assert!(sent.contains(&"JOIN #streamer".to_string()));
        assert!(sent.contains(&"PONG :tmi.twitch.tv".to_string()));
        adapter.stop().await;
    }

    #[tokio::test]
    async fn valid_stored_token_skips_delegate() {
        let (deps, _sent) = deps(vec![ROOMSTATE], true, None, Some("oauth:good"));
        let mut adapter = TwitchAdapter::new("streamer", deps);
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.start(tx);
        assert!(matches!(next_event(&mut rx).await, AdapterEvent::Started { .. }));
        adapter.stop().await;
        adapter.stop().await;
        let mut rest = Vec::new();
        while let Ok(event) = rx.try_recv() {
            rest.push(event);
        }
        assert!(rest.iter().all(|event| !matches!(event, AdapterEvent::TokenAcquired(_))));
        assert_eq!(
            rest.iter().filter(|event| matches!(event, AdapterEvent::Stopped)).count(),
            1
        );
    }

    #[tokio::test]
    async fn missing_token_is_a_token_error() {
        let (deps, sent) = deps(vec![ROOMSTATE], false, None, Some("expired"));
        let tokens = deps.tokens.clone();
        let mut adapter = TwitchAdapter::new("streamer", deps);
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.start(tx);
        let event = next_event(&mut rx).await;
        assert!(matches!(event, AdapterEvent::Error(ref err) if err.is_token()));
        assert!(tokens.read().is_none());
        assert!(sent.lock().is_empty());
        adapter.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn login_failure_notice_clears_token() {
        let (deps, _sent) = deps(
            vec![":tmi.twitch.tv NOTICE * :Login authentication failed"],
            true,
            Some("good"),
            None,
        );
        let tokens = deps.tokens.clone();
        let mut adapter = TwitchAdapter::new("streamer", deps);
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.start(tx);
        assert!(matches!(next_event(&mut rx).await, AdapterEvent::TokenAcquired(_)));
        assert!(matches!(next_event(&mut rx).await, AdapterEvent::Error(ChatError::Token(_))));
        assert!(tokens.read().is_none());
        adapter.stop().await;
    }

    #[tokio::test]
    async fn redirect_delegate_waits_for_delivery() {
        let delegate = Arc::new(RedirectTokenDelegate::new("http://localhost:50930/twitch_redirect"));
        assert!(!delegate.deliver("oauth:early"));

        let waiting = delegate.clone();
        let task = tokio::spawn(async move { waiting.acquire_token("client").await });
        while !delegate.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert!(!delegate.deliver("   "));
        assert!(delegate.deliver("#access_token=fresh&scope=chat%3Aread&token_type=bearer"));
        assert_eq!(task.await.unwrap().unwrap(), "fresh");
    }

    #[tokio::test]
    async fn one_delivery_serves_every_waiting_connection() {
        let delegate = Arc::new(RedirectTokenDelegate::new("http://localhost:50930/twitch_redirect"));
        let first = {
            let waiting = delegate.clone();
            tokio::spawn(async move { waiting.acquire_token("client").await })
        };
        let second = {
            let waiting = delegate.clone();
            tokio::spawn(async move { waiting.acquire_token("client").await })
        };
        while delegate.pending.lock().len() < 2 {
            tokio::task::yield_now().await;
        }

        assert!(delegate.deliver("oauth:shared"));
        assert_eq!(first.await.unwrap().unwrap(), "shared");
        assert_eq!(second.await.unwrap().unwrap(), "shared");
        assert!(!delegate.is_waiting());
        assert!(!delegate.deliver("oauth:late"));
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_block_delivery() {
        let delegate = Arc::new(RedirectTokenDelegate::new("http://localhost:50930/twitch_redirect"));
        let gone = {
            let waiting = delegate.clone();
            tokio::spawn(async move { waiting.acquire_token("client").await })
        };
        while !delegate.is_waiting() {
            tokio::task::yield_now().await;
        }
        gone.abort();
        let _ = gone.await;
        assert!(!delegate.is_waiting());

        let live = {
            let waiting = delegate.clone();
            tokio::spawn(async move { waiting.acquire_token("client").await })
        };
        while !delegate.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert_eq!(delegate.pending.lock().len(), 1);
        assert!(delegate.deliver("oauth:fresh"));
        assert_eq!(live.await.unwrap().unwrap(), "fresh");
    }

    #[test]
    fn authorize_url_carries_client_and_redirect() {
        let delegate = RedirectTokenDelegate::new("http://localhost:50930/twitch_redirect");
        let url = delegate.authorize_url("abc").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "abc".into())));
        assert!(pairs.contains(&("response_type".into(), "token".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:50930/twitch_redirect".into()
        )));
    }

    #[tokio::test]
    async fn redirect_delegate_needs_client_id() {
        let delegate = RedirectTokenDelegate::new("http://localhost/cb");
        let err = delegate.acquire_token("").await.unwrap_err();
        assert!(err.is_token());
    }

    #[tokio::test]
    async fn helix_validate_and_streams() {
        let server = MockServer::start();
        let validate = server.mock(|when, then| {
            when.method(GET)
                .path("/oauth2/validate")
                .header("Authorization", "OAuth good");
            then.status(200).json_body(serde_json::json!({
                "client_id": "client",
                "login": "reader",
                "user_id": "7",
                "expires_in": 3600
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/oauth2/validate").header("Authorization", "OAuth bad");
            then.status(401);
        });
        let streams = server.mock(|when, then| {
            when.method(GET)
                .path("/helix/streams")
                .query_param("user_login", "streamer")
                .header("Client-Id", "client");
            then.status(200).json_body(serde_json::json!({
                "data": [{
                    "title": "Any% attempts",
                    "game_name": "Celeste",
                    "viewer_count": 321,
                    "started_at": "2024-01-01T00:00:00Z"
                }]
            }));
        });

        let helix = HelixClient::with_base_urls(
            "client",
            server.base_url(),
            format!("{}/helix", server.base_url()),
        )
        .unwrap();
        let info = helix.validate_token("good").await.unwrap();
        assert_eq!(info.login, "reader");
        assert!(helix.validate_token("bad").await.unwrap_err().is_token());

        let meta = helix.stream_metadata("good", "streamer").await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Any% attempts"));
        assert_eq!(meta.viewers, Some(321));
        assert_eq!(meta.category.as_deref(), Some("Celeste"));
        validate.assert();
        streams.assert();
    }

    #[tokio::test]
    async fn helix_emotes_merge_global_and_channel() {
        let server = MockServer::start();
        let global = server.mock(|when, then| {
            when.method(GET)
                .path("/helix/chat/emotes/global")
                .header("Authorization", "Bearer good")
                .header("Client-Id", "client");
            then.status(200).json_body(serde_json::json!({
                "data": [{
                    "id": "25",
                    "name": "Kappa",
                    "format": ["static"],
                    "scale": ["1.0", "2.0", "3.0"],
                    "theme_mode": ["light", "dark"]
                }],
                "template": "https://cdn.test/{{id}}/{{format}}/{{theme_mode}}/{{scale}}"
            }));
        });
        let channel = server.mock(|when, then| {
            when.method(GET)
                .path("/helix/chat/emotes")
                .query_param("broadcaster_id", "12345");
            then.status(200).json_body(serde_json::json!({
                "data": [{
                    "id": "emotesv2_abc",
                    "name": "streamerHype",
                    "format": ["static", "animated"],
                    "scale": ["1.0"],
                    "theme_mode": ["dark"]
                }],
                "template": "https://cdn.test/{{id}}/{{format}}/{{theme_mode}}/{{scale}}"
            }));
        });

        let helix = HelixClient::with_base_urls(
            "client",
            server.base_url(),
            format!("{}/helix", server.base_url()),
        )
        .unwrap();
        let cache = helix.emotes("good", "12345").await.unwrap();
        assert_eq!(cache.len(), 2);
        let kappa = cache.get("25").unwrap();
        assert_eq!(kappa.name, "Kappa");
        assert_eq!(kappa.url, "https://cdn.test/25/static/dark/3.0");
        assert!(kappa.animated_url.is_none());
        let hype = cache.get("emotesv2_abc").unwrap();
        assert_eq!(
            hype.animated_url.as_deref(),
            Some("https://cdn.test/emotesv2_abc/animated/dark/1.0")
        );
        global.assert();
        channel.assert();
    }

    #[tokio::test]
    async fn helix_cheermotes_build_the_tier_table() {
        let server = MockServer::start();
        let cheermotes = server.mock(|when, then| {
            when.method(GET)
                .path("/helix/bits/cheermotes")
                .query_param("broadcaster_id", "12345");
            then.status(200).json_body(serde_json::json!({
                "data": [{
                    "prefix": "Cheer",
                    "tiers": [
                        {
                            "min_bits": 100,
                            "id": "100",
                            "color": "#9c3ee8",
                            "images": {"dark": {
                                "static": {"1": "s100-1", "4": "s100-4"},
                                "animated": {"1": "a100-1", "4": "a100-4"}
                            }}
                        },
                        {
                            "min_bits": 1,
                            "id": "1",
                            "color": "#979797",
                            "images": {"dark": {
                                "static": {"1": "s1-1", "4": "s1-4"},
                                "animated": {"1": "a1-1", "4": "a1-4"}
                            }}
                        }
                    ]
                }]
            }));
        });

        let helix = HelixClient::with_base_urls(
            "client",
            server.base_url(),
            format!("{}/helix", server.base_url()),
        )
        .unwrap();
        let table = helix.cheermotes("good", "12345").await.unwrap();
        let tiers = table.tiers("cheer").unwrap();
        let mins: Vec<u32> = tiers.iter().map(|tier| tier.min_bits).collect();
        assert_eq!(mins, vec![1, 100]);
        assert_eq!(tiers[1].color, "#9c3ee8");
        assert_eq!(tiers[1].static_url, "s100-4");
        assert_eq!(tiers[1].animated_url, "a100-4");
        cheermotes.assert();
    }

    #[tokio::test]
    async fn helix_unauthorized_maps_to_token_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/helix/bits/cheermotes");
            then.status(401);
        });
        let helix = HelixClient::with_base_urls(
            "client",
            server.base_url(),
            format!("{}/helix", server.base_url()),
        )
        .unwrap();
        let err = helix.cheermotes("stale", "12345").await.unwrap_err();
        assert!(err.is_token());
    }
}
