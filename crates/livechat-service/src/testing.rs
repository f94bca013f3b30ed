//! Scripted adapters for exercising the supervisor without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use livechat::{Author, ChatEvent, EventKind, MessageSegment, SourceTarget, YouTubeKind};

use crate::adapter::{AdapterEvent, AdapterEventSender, AdapterFactory, SourceAdapter};

pub(crate) struct ScriptedAdapter {
    target: SourceTarget,
    script: Vec<AdapterEvent>,
    events: Option<AdapterEventSender>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn target(&self) -> &SourceTarget {
        &self.target
    }

    fn is_running(&self) -> bool {
        self.events.is_some()
    }

    fn start(&mut self, events: AdapterEventSender) {
        let mut failed = false;
        for event in self.script.clone() {
            failed |= matches!(event, AdapterEvent::Error(_));
            let _ = events.send(event);
        }
        if !failed {
            self.events = Some(events);
        }
    }

    async fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = self.events.take() {
            let _ = events.send(AdapterEvent::Stopped);
        }
    }
}

/// Every adapter it creates replays the current script on `start`.
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    script: Mutex<Vec<AdapterEvent>>,
    pub created: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn with_script(script: Vec<AdapterEvent>) -> Self {
        let factory = Self::default();
        factory.set_script(script);
        factory
    }

    pub fn set_script(&self, script: Vec<AdapterEvent>) {
        *self.script.lock() = script;
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(&self, target: &SourceTarget) -> Box<dyn SourceAdapter> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedAdapter {
            target: target.clone(),
            script: self.script.lock().clone(),
            events: None,
            stops: self.stops.clone(),
        })
    }
}

pub(crate) fn youtube_chat(provider_id: &str, text: &str) -> ChatEvent {
    ChatEvent::new(
        EventKind::YouTube(YouTubeKind::Normal),
        "live123",
        Author::named("viewer"),
        0,
        vec![MessageSegment::text(text)],
        Some(provider_id.to_string()),
    )
}
