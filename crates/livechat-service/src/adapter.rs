use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use livechat::{ChatError, ChatEvent, ChatResult, LiveMetadata, SourceTarget};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterId(String);

impl AdapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// The provider accepted the connection.
    Started { live_id: String },
    /// The run ended normally, or was stopped.
    Stopped,
    ChatBatch {
        events: Vec<ChatEvent>,
        /// History delivered right after connecting.
        is_first: bool,
    },
    MetadataUpdated(LiveMetadata),
    TokenAcquired(String),
    /// Unrecoverable failure; the run is over and no `Stopped` follows.
    Error(ChatError),
}

pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

/// A provider connection. `start` returns at once; progress is reported on
/// the supplied channel.
#[async_trait]
pub trait SourceAdapter: Send {
    fn target(&self) -> &SourceTarget;

    fn is_running(&self) -> bool;

    fn start(&mut self, events: AdapterEventSender);

    /// Cancels the run and waits for it to wind down. Safe to call when
    /// already stopped.
    async fn stop(&mut self);
}

pub trait AdapterFactory: Send + Sync {
    fn create(&self, target: &SourceTarget) -> Box<dyn SourceAdapter>;
}

/// Background task behind one adapter run. The terminal event (`Stopped` or
/// `Error`) is sent exactly once, when the task finishes.
pub struct AdapterWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AdapterWorker {
    pub fn spawn<F, Fut>(events: AdapterEventSender, run: F) -> Self
    where
        F: FnOnce(CancellationToken, AdapterEventSender) -> Fut,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = run(cancel.clone(), events.clone());
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                outcome = task => outcome,
            };
            let terminal = match outcome {
                Ok(()) => AdapterEvent::Stopped,
                Err(err) => AdapterEvent::Error(err),
            };
            let _ = events.send(terminal);
        });
        Self { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(target: "livechat::adapter", %err, "adapter task ended abnormally");
        }
    }
}
