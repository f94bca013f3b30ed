use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;
use tracing::trace;

use livechat::message::{ChatEvent, Source};

use crate::config::RelayConfig;
use crate::queue::SpeechQueue;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum RelayTag {
    #[serde(rename = "youtube")]
    YouTube,
    #[serde(rename = "youtube-list")]
    YouTubeList,
    #[serde(rename = "twitch")]
    Twitch,
    #[serde(rename = "app")]
    App,
    #[serde(rename = "clear")]
    Clear,
    #[serde(rename = "reload")]
    Reload,
}

impl RelayTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayTag::YouTube => "youtube",
            RelayTag::YouTubeList => "youtube-list",
            RelayTag::Twitch => "twitch",
            RelayTag::App => "app",
            RelayTag::Clear => "clear",
            RelayTag::Reload => "reload",
        }
    }
}

/// One record pushed to overlay subscribers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelayRecord {
    pub tag: RelayTag,
    pub payload: JsonValue,
}

impl RelayRecord {
    pub fn event(event: &ChatEvent) -> Self {
        let tag = match event.source {
            Source::YouTube => RelayTag::YouTube,
            Source::Twitch => RelayTag::Twitch,
            Source::App => RelayTag::App,
        };
        Self {
            tag,
            payload: serde_json::to_value(event).unwrap_or(JsonValue::Null),
        }
    }

    pub fn youtube_list(events: &[&ChatEvent]) -> Self {
        Self {
            tag: RelayTag::YouTubeList,
            payload: serde_json::to_value(events).unwrap_or(JsonValue::Null),
        }
    }

    pub fn clear() -> Self {
        Self {
            tag: RelayTag::Clear,
            payload: json!({}),
        }
    }

    pub fn reload() -> Self {
        Self {
            tag: RelayTag::Reload,
            payload: json!({}),
        }
    }
}

pub trait RelaySink: Send + Sync {
    fn publish(&self, record: RelayRecord);
}

/// Fan-out to every connected overlay. Records published while nobody is
/// subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    tx: broadcast::Sender<RelayRecord>,
}

impl BroadcastRelay {
    pub fn new(config: &RelayConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayRecord> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl RelaySink for BroadcastRelay {
    fn publish(&self, record: RelayRecord) {
        if self.tx.send(record).is_err() {
            trace!(target: "livechat::relay", "no relay subscribers");
        }
    }
}

/// Forwards accepted events to the relay and, for chat, to speech.
#[derive(Clone)]
pub struct RelayPublisher {
    relay: Arc<dyn RelaySink>,
    speech: Option<SpeechQueue>,
}

impl RelayPublisher {
    pub fn new(relay: Arc<dyn RelaySink>, speech: Option<SpeechQueue>) -> Self {
        Self { relay, speech }
    }

    /// One record per event, then a single `youtube-list` record covering the
    /// YouTube events of the batch.
    pub fn publish_batch(&self, events: &[ChatEvent]) {
        for event in events {
            self.relay.publish(RelayRecord::event(event));
            if let Some(speech) = &self.speech {
                speech.enqueue(event);
            }
        }
        let youtube: Vec<&ChatEvent> = events
            .iter()
            .filter(|event| event.source == Source::YouTube)
            .collect();
        if !youtube.is_empty() {
            self.relay.publish(RelayRecord::youtube_list(&youtube));
        }
    }

    /// Application lines go to the relay only.
    pub fn publish_app(&self, event: &ChatEvent) {
        self.relay.publish(RelayRecord::event(event));
    }

    pub fn clear(&self) {
        self.relay.publish(RelayRecord::clear());
    }

    pub fn reload(&self) {
        self.relay.publish(RelayRecord::reload());
    }
}
