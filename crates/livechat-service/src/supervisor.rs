use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

use livechat::{classify, AppLevel, ChatError, ChatEvent, LiveMetadata, Source, SourceTarget};
use livechat_gateway::{AppendOptions, BlockedWordFilter, ChatLog, RelayPublisher};

use crate::adapter::{AdapterEvent, AdapterFactory, AdapterId, ConnectionState, SourceAdapter};

const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("unknown connection {0}")]
    UnknownId(AdapterId),
    #[error("connection {0} already exists")]
    DuplicateId(AdapterId),
    #[error("connection {0} is already running")]
    AlreadyRunning(AdapterId),
    #[error("connection {0} failed; stop it before starting again")]
    NeedsStop(AdapterId),
    #[error(transparent)]
    Url(#[from] ChatError),
    #[error("supervisor is not running")]
    Closed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSnapshot {
    pub id: AdapterId,
    pub url: String,
    pub source: Source,
    pub target: String,
    pub state: ConnectionState,
    pub live_id: Option<String>,
    pub metadata: LiveMetadata,
    pub last_error: Option<String>,
}

struct Connection {
    url: String,
    target: SourceTarget,
    adapter: Box<dyn SourceAdapter>,
    state: ConnectionState,
    live_id: Option<String>,
    metadata: LiveMetadata,
    last_error: Option<String>,
}

impl Connection {
    fn new(url: &str, target: SourceTarget, adapter: Box<dyn SourceAdapter>) -> Self {
        Self {
            url: url.to_string(),
            target,
            adapter,
            state: ConnectionState::Idle,
            live_id: None,
            metadata: LiveMetadata::default(),
            last_error: None,
        }
    }

    fn snapshot(&self, id: &AdapterId) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: id.clone(),
            url: self.url.clone(),
            source: self.target.source(),
            target: self.target.to_string(),
            state: self.state,
            live_id: self.live_id.clone(),
            metadata: self.metadata.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Owns every connection and is the only writer of the chat log. Adapter
/// events are applied one at a time, in the order each adapter sent them.
pub struct ConnectionSupervisor {
    factory: Arc<dyn AdapterFactory>,
    connections: HashMap<AdapterId, Connection>,
    order: Vec<AdapterId>,
    streams: StreamMap<AdapterId, UnboundedReceiverStream<AdapterEvent>>,
    log: ChatLog,
    filter: BlockedWordFilter,
    publisher: RelayPublisher,
    suppressed: u64,
}

impl ConnectionSupervisor {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        log: ChatLog,
        filter: BlockedWordFilter,
        publisher: RelayPublisher,
    ) -> Self {
        Self {
            factory,
            connections: HashMap::new(),
            order: Vec::new(),
            streams: StreamMap::new(),
            log,
            filter,
            publisher,
            suppressed: 0,
        }
    }

    /// Registers a connection in the idle state. Unsupported URLs are
    /// rejected before any adapter exists.
    pub fn add(&mut self, id: AdapterId, url: &str) -> Result<(), SupervisorError> {
        if self.connections.contains_key(&id) {
            return Err(SupervisorError::DuplicateId(id));
        }
        let target = classify(url)?;
        let adapter = self.factory.create(&target);
        info!(target: "livechat::supervisor", connection = %id, %url, "connection added");
        self.connections
            .insert(id.clone(), Connection::new(url, target, adapter));
        self.order.push(id);
        Ok(())
    }

    /// Swaps the URL of an existing connection, stopping it first. The new
    /// adapter starts idle.
    pub async fn change_url(&mut self, id: &AdapterId, url: &str) -> Result<(), SupervisorError> {
        if !self.connections.contains_key(id) {
            return Err(SupervisorError::UnknownId(id.clone()));
        }
        let target = classify(url)?;
        self.halt(id).await;
        let adapter = self.factory.create(&target);
        info!(target: "livechat::supervisor", connection = %id, %url, "connection url changed");
        self.connections
            .insert(id.clone(), Connection::new(url, target, adapter));
        Ok(())
    }

    pub fn start(&mut self, id: &AdapterId) -> Result<(), SupervisorError> {
        let conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| SupervisorError::UnknownId(id.clone()))?;
        match conn.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                return Err(SupervisorError::AlreadyRunning(id.clone()))
            }
            ConnectionState::Error => return Err(SupervisorError::NeedsStop(id.clone())),
            ConnectionState::Idle => {}
        }
        let (tx, rx) = mpsc::unbounded_channel();
        conn.state = ConnectionState::Connecting;
        conn.last_error = None;
        conn.live_id = None;
        conn.adapter.start(tx);
        info!(target: "livechat::supervisor", connection = %id, source = %conn.target, "connecting");
        self.streams
            .insert(id.clone(), UnboundedReceiverStream::new(rx));
        Ok(())
    }

    /// Stops the adapter and applies whatever it reported on the way down.
    /// Stopping an idle connection is a no-op.
    pub async fn stop(&mut self, id: &AdapterId) -> Result<(), SupervisorError> {
        if !self.connections.contains_key(id) {
            return Err(SupervisorError::UnknownId(id.clone()));
        }
        self.halt(id).await;
        Ok(())
    }

    pub async fn remove(&mut self, id: &AdapterId) -> Result<(), SupervisorError> {
        if !self.connections.contains_key(id) {
            return Err(SupervisorError::UnknownId(id.clone()));
        }
        self.halt(id).await;
        self.connections.remove(id);
        self.order.retain(|other| other != id);
        info!(target: "livechat::supervisor", connection = %id, "connection removed");
        Ok(())
    }

    pub fn clear(&mut self) {
        let dropped = self.log.clear();
        self.publisher.clear();
        info!(target: "livechat::supervisor", dropped, "chat log cleared");
    }

    pub fn reload(&self) {
        self.publisher.reload();
    }

    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.connections.get(id).map(|conn| conn.snapshot(id)))
            .collect()
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Next event from any running adapter, `None` when none is running.
    pub async fn next_event(&mut self) -> Option<(AdapterId, AdapterEvent)> {
        self.streams.next().await
    }

    pub fn handle_event(&mut self, id: &AdapterId, event: AdapterEvent) {
        let Some(conn) = self.connections.get_mut(id) else {
            debug!(target: "livechat::supervisor", connection = %id, "event for a removed connection");
            return;
        };
        let mut batch = None;
        let line = match event {
            AdapterEvent::Started { live_id } => {
                conn.state = ConnectionState::Connected;
                conn.last_error = None;
                let line = format!("{} connected ({live_id})", conn.target);
                conn.live_id = Some(live_id);
                Some((AppLevel::Info, line))
            }
            AdapterEvent::Stopped => {
                conn.state = ConnectionState::Idle;
                Some((AppLevel::Info, format!("{} disconnected", conn.target)))
            }
            AdapterEvent::Error(err) => {
                conn.state = ConnectionState::Error;
                conn.last_error = Some(err.to_string());
                Some((AppLevel::Error, format!("{}: {err}", conn.target)))
            }
            AdapterEvent::MetadataUpdated(update) => {
                conn.metadata.merge(update);
                None
            }
            AdapterEvent::TokenAcquired(_) => {
                Some((AppLevel::Info, "twitch authorization updated".to_string()))
            }
            AdapterEvent::ChatBatch { events, is_first } => {
                batch = Some((events, is_first));
                None
            }
        };
        if let Some((events, is_first)) = batch {
            self.ingest(id, events, is_first);
        }
        if let Some((level, text)) = line {
            self.push_app(level, text);
        }
    }

    fn ingest(&mut self, id: &AdapterId, events: Vec<ChatEvent>, is_first: bool) {
        let (kept, suppressed) = self.filter.partition(events);
        for event in &suppressed {
            info!(
                target: "livechat::filter",
                connection = %id,
                author = %event.author.label(),
                "message suppressed by blocked word"
            );
        }
        self.suppressed += suppressed.len() as u64;

        let outcome = self.log.append(kept, AppendOptions { dedupe: is_first });
        if outcome.duplicates > 0 {
            debug!(target: "livechat::supervisor", connection = %id, duplicates = outcome.duplicates, "dropped repeated history");
        }
        if is_first {
            // backlog from before we connected: logged, not announced
            return;
        }
        self.publisher.publish_batch(&outcome.appended);
    }

    fn push_app(&mut self, level: AppLevel, text: String) {
        match level {
            AppLevel::Error => warn!(target: "livechat::supervisor", "{text}"),
            _ => info!(target: "livechat::supervisor", "{text}"),
        }
        let event = ChatEvent::app(level, text);
        self.log.append(vec![event.clone()], AppendOptions::default());
        self.publisher.publish_app(&event);
    }

    async fn halt(&mut self, id: &AdapterId) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.adapter.stop().await;
        }
        if let Some(stream) = self.streams.remove(id) {
            let mut rx = stream.into_inner();
            rx.close();
            while let Ok(event) = rx.try_recv() {
                self.handle_event(id, event);
            }
        }
        if let Some(conn) = self.connections.get_mut(id) {
            conn.state = ConnectionState::Idle;
        }
    }

    async fn shutdown(&mut self) {
        for id in self.order.clone() {
            self.halt(&id).await;
        }
        info!(target: "livechat::supervisor", "all connections stopped");
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Add { id, url, reply } => {
                let _ = reply.send(self.add(id, &url));
            }
            Command::ChangeUrl { id, url, reply } => {
                let _ = reply.send(self.change_url(&id, &url).await);
            }
            Command::Start { id, reply } => {
                let _ = reply.send(self.start(&id));
            }
            Command::Stop { id, reply } => {
                let _ = reply.send(self.stop(&id).await);
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove(&id).await);
            }
            Command::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Command::Reload { reply } => {
                self.reload();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Log { reply } => {
                let _ = reply.send(self.log.snapshot());
            }
        }
    }

    /// Serves commands and adapter events until every handle is dropped,
    /// then stops all connections.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.execute(command).await,
                    None => break,
                },
                Some((id, event)) = self.streams.next(), if !self.streams.is_empty() => {
                    self.handle_event(&id, event);
                }
            }
        }
        self.shutdown().await;
    }

    pub fn spawn(self) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let task = tokio::spawn(self.run(rx));
        (SupervisorHandle { tx }, task)
    }
}

pub type Reply<T> = oneshot::Sender<T>;

pub enum Command {
    Add {
        id: AdapterId,
        url: String,
        reply: Reply<Result<(), SupervisorError>>,
    },
    ChangeUrl {
        id: AdapterId,
        url: String,
        reply: Reply<Result<(), SupervisorError>>,
    },
    Start {
        id: AdapterId,
        reply: Reply<Result<(), SupervisorError>>,
    },
    Stop {
        id: AdapterId,
        reply: Reply<Result<(), SupervisorError>>,
    },
    Remove {
        id: AdapterId,
        reply: Reply<Result<(), SupervisorError>>,
    },
    Clear {
        reply: Reply<()>,
    },
    Reload {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<Vec<ConnectionSnapshot>>,
    },
    Log {
        reply: Reply<Vec<ChatEvent>>,
    },
}

/// Cloneable front door to a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<Command>,
}

impl SupervisorHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    pub async fn add(&self, id: AdapterId, url: impl Into<String>) -> Result<(), SupervisorError> {
        let url = url.into();
        self.request(|reply| Command::Add { id, url, reply }).await?
    }

    pub async fn change_url(&self, id: AdapterId, url: impl Into<String>) -> Result<(), SupervisorError> {
        let url = url.into();
        self.request(|reply| Command::ChangeUrl { id, url, reply })
            .await?
    }

    pub async fn start(&self, id: AdapterId) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Start { id, reply }).await?
    }

    pub async fn stop(&self, id: AdapterId) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Stop { id, reply }).await?
    }

    pub async fn remove(&self, id: AdapterId) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    pub async fn clear(&self) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    pub async fn reload(&self) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Reload { reply }).await
    }

    pub async fn snapshot(&self) -> Result<Vec<ConnectionSnapshot>, SupervisorError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn log(&self) -> Result<Vec<ChatEvent>, SupervisorError> {
        self.request(|reply| Command::Log { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{youtube_chat, ScriptedFactory};
    use livechat::EventKind;
    use livechat_gateway::{BroadcastRelay, FilterConfig, RelayConfig, RelayRecord, RelayTag};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn supervisor(factory: Arc<ScriptedFactory>, blocked: &[&str]) -> (ConnectionSupervisor, broadcast::Receiver<RelayRecord>) {
        let relay = Arc::new(BroadcastRelay::new(&RelayConfig::default()));
        let rx = relay.subscribe();
        let filter = BlockedWordFilter::new(&FilterConfig {
            blocked_words: blocked.iter().map(|word| word.to_string()).collect(),
        });
        let sup = ConnectionSupervisor::new(
            factory,
            ChatLog::with_capacity(100),
            filter,
            RelayPublisher::new(relay, None),
        );
        (sup, rx)
    }

    async fn pump(sup: &mut ConnectionSupervisor, count: usize) {
        for _ in 0..count {
            let (id, event) = tokio::time::timeout(Duration::from_secs(2), sup.next_event())
                .await
                .expect("no adapter event")
                .expect("no running adapter");
            sup.handle_event(&id, event);
        }
    }

    fn drain(rx: &mut broadcast::Receiver<RelayRecord>) -> Vec<RelayRecord> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record);
        }
        out
    }

    fn texts(log: &ChatLog) -> Vec<String> {
        log.project().map(|event| event.plain_text(true)).collect()
    }

    #[tokio::test]
    async fn rejects_bad_urls_and_duplicate_ids() {
        let factory = Arc::new(ScriptedFactory::default());
        let (mut sup, _rx) = supervisor(factory.clone(), &[]);
        let err = sup.add("a".into(), "https://example.com/stream").unwrap_err();
        assert!(matches!(err, SupervisorError::Url(ChatError::UrlUnsupported(_))));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);

        sup.add("a".into(), "https://www.twitch.tv/streamer").unwrap();
        assert_eq!(
            sup.add("a".into(), "https://www.twitch.tv/other"),
            Err(SupervisorError::DuplicateId("a".into()))
        );
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(
            sup.start(&"missing".into()),
            Err(SupervisorError::UnknownId("missing".into()))
        );
    }

    #[tokio::test]
    async fn history_is_logged_but_only_live_chat_is_relayed() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![
            AdapterEvent::Started {
                live_id: "live123".into(),
            },
            AdapterEvent::ChatBatch {
                events: vec![
                    youtube_chat("m1", "first"),
                    youtube_chat("m2", "second"),
                    youtube_chat("m1", "first again"),
                    youtube_chat("m3", "third"),
                ],
                is_first: true,
            },
            AdapterEvent::ChatBatch {
                events: vec![youtube_chat("m4", "fresh")],
                is_first: false,
            },
        ]));
        let (mut sup, mut relay) = supervisor(factory, &[]);
        let id = AdapterId::from("yt");
        sup.add(id.clone(), "https://www.youtube.com/watch?v=live123").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 3).await;

        assert_eq!(
            texts(sup.log()),
            vec![
                "youtube live live123 connected (live123)",
                "first",
                "second",
                "third",
                "fresh"
            ]
        );
        let records = drain(&mut relay);
        let tags: Vec<RelayTag> = records.iter().map(|record| record.tag).collect();
        assert_eq!(tags, vec![RelayTag::App, RelayTag::YouTube, RelayTag::YouTubeList]);
        assert_eq!(records[1].payload["provider_message_id"], "m4");

        let snapshot = sup.snapshot();
        assert_eq!(snapshot[0].state, ConnectionState::Connected);
        assert_eq!(snapshot[0].live_id.as_deref(), Some("live123"));
    }

    #[tokio::test]
    async fn start_rules_follow_connection_state() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![AdapterEvent::Started {
            live_id: "streamer".into(),
        }]));
        let (mut sup, _relay) = supervisor(factory.clone(), &[]);
        let id = AdapterId::from("tw");
        sup.add(id.clone(), "https://www.twitch.tv/streamer").unwrap();
        sup.start(&id).unwrap();
        assert_eq!(sup.start(&id), Err(SupervisorError::AlreadyRunning(id.clone())));
        pump(&mut sup, 1).await;
        assert_eq!(sup.start(&id), Err(SupervisorError::AlreadyRunning(id.clone())));

        sup.stop(&id).await.unwrap();
        assert_eq!(sup.snapshot()[0].state, ConnectionState::Idle);

        factory.set_script(vec![AdapterEvent::Error(ChatError::Token("expired".into()))]);
        sup.change_url(&id, "https://www.twitch.tv/streamer").await.unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 1).await;
        let snap = &sup.snapshot()[0];
        assert_eq!(snap.state, ConnectionState::Error);
        assert_eq!(snap.last_error.as_deref(), Some("authorization failed: expired"));
        assert_eq!(sup.start(&id), Err(SupervisorError::NeedsStop(id.clone())));

        sup.stop(&id).await.unwrap();
        assert_eq!(sup.snapshot()[0].state, ConnectionState::Idle);
        assert!(sup.start(&id).is_ok());

        let errors = sup
            .log()
            .project()
            .filter(|event| event.kind == EventKind::App(AppLevel::Error))
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn stopping_twice_reports_one_disconnect() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![AdapterEvent::Started {
            live_id: "streamer".into(),
        }]));
        let (mut sup, _relay) = supervisor(factory.clone(), &[]);
        let id = AdapterId::from("tw");
        sup.add(id.clone(), "twitch.tv/streamer").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 1).await;

        sup.stop(&id).await.unwrap();
        sup.stop(&id).await.unwrap();
        assert_eq!(factory.stops.load(Ordering::SeqCst), 2);
        let disconnects = texts(sup.log())
            .into_iter()
            .filter(|text| text.ends_with("disconnected"))
            .count();
        assert_eq!(disconnects, 1);
        assert!(tokio::time::timeout(Duration::from_millis(50), sup.next_event())
            .await
            .map(|event| event.is_none())
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn blocked_messages_never_reach_log_or_relay() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![AdapterEvent::ChatBatch {
            events: vec![
                youtube_chat("m1", "buy followers here"),
                youtube_chat("m2", "nice run"),
            ],
            is_first: false,
        }]));
        let (mut sup, mut relay) = supervisor(factory, &["followers"]);
        let id = AdapterId::from("yt");
        sup.add(id.clone(), "https://youtu.be/live123").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 1).await;

        assert_eq!(texts(sup.log()), vec!["nice run"]);
        assert_eq!(sup.suppressed(), 1);
        let records = drain(&mut relay);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload["provider_message_id"], "m2");
    }

    #[tokio::test]
    async fn metadata_updates_merge_into_snapshot() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![
            AdapterEvent::MetadataUpdated(LiveMetadata {
                title: Some("launch day".into()),
                viewers: Some(10),
                ..LiveMetadata::default()
            }),
            AdapterEvent::MetadataUpdated(LiveMetadata {
                viewers: Some(25),
                ..LiveMetadata::default()
            }),
        ]));
        let (mut sup, _relay) = supervisor(factory, &[]);
        let id = AdapterId::from("yt");
        sup.add(id.clone(), "https://youtu.be/live123").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 2).await;
        let meta = &sup.snapshot()[0].metadata;
        assert_eq!(meta.title.as_deref(), Some("launch day"));
        assert_eq!(meta.viewers, Some(25));
    }

    #[tokio::test]
    async fn clear_empties_log_and_notifies_overlays() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![AdapterEvent::Started {
            live_id: "streamer".into(),
        }]));
        let (mut sup, mut relay) = supervisor(factory, &[]);
        let id = AdapterId::from("tw");
        sup.add(id.clone(), "twitch.tv/streamer").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 1).await;
        assert_eq!(sup.log().len(), 1);

        sup.clear();
        sup.reload();
        assert!(sup.log().is_empty());
        let tags: Vec<RelayTag> = drain(&mut relay).into_iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![RelayTag::App, RelayTag::Clear, RelayTag::Reload]);
    }

    #[tokio::test]
    async fn remove_stops_and_forgets() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![AdapterEvent::Started {
            live_id: "streamer".into(),
        }]));
        let (mut sup, _relay) = supervisor(factory.clone(), &[]);
        let id = AdapterId::from("tw");
        sup.add(id.clone(), "twitch.tv/streamer").unwrap();
        sup.start(&id).unwrap();
        pump(&mut sup, 1).await;
        sup.remove(&id).await.unwrap();
        assert!(sup.snapshot().is_empty());
        assert_eq!(factory.stops.load(Ordering::SeqCst), 1);
        assert_eq!(sup.remove(&id).await, Err(SupervisorError::UnknownId(id)));
    }

    #[tokio::test]
    async fn handle_drives_spawned_supervisor() {
        let factory = Arc::new(ScriptedFactory::with_script(vec![
            AdapterEvent::Started {
                live_id: "streamer".into(),
            },
            AdapterEvent::ChatBatch {
                events: vec![youtube_chat("m1", "hello")],
                is_first: false,
            },
        ]));
        let (sup, _relay) = supervisor(factory, &[]);
        let (handle, task) = sup.spawn();
        handle.add("tw".into(), "twitch.tv/streamer").await.unwrap();
        handle.start("tw".into()).await.unwrap();

        let mut log = Vec::new();
        for _ in 0..50 {
            log = handle.log().await.unwrap();
            if log.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].plain_text(true), "hello");
        assert_eq!(handle.snapshot().await.unwrap()[0].state, ConnectionState::Connected);

        drop(handle);
        task.await.unwrap();
    }
}
