use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use livechat::message::ChatEvent;

use crate::config::TtsConfig;
use crate::tts::{SpeechSink, UtteranceBuilder};

/// Bounded hand-off from the supervisor to the speech worker. Enqueueing
/// never waits; when the worker falls behind new utterances are dropped.
#[derive(Clone)]
pub struct SpeechQueue {
    builder: UtteranceBuilder,
    tx: mpsc::Sender<String>,
}

impl SpeechQueue {
    pub fn new(config: &TtsConfig) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        (
            Self {
                builder: UtteranceBuilder::new(config),
                tx,
            },
            rx,
        )
    }

    pub fn enqueue(&self, event: &ChatEvent) -> bool {
        let Some(text) = self.builder.utterance(event) else {
            tracing::trace!(target: "livechat::tts", event = %event.id, "nothing to speak");
            return false;
        };
        match self.tx.try_send(text) {
            Ok(()) => {
                tracing::trace!(target: "livechat::tts", channel = %event.channel, "enqueued utterance");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(target: "livechat::tts", "speech queue full, dropping utterance");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    last_emit: Option<Instant>,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f32) -> Self {
        let interval = if rate_per_sec <= 0.0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs_f32(1.0 / rate_per_sec)
        };
        Self {
            last_emit: None,
            interval,
        }
    }

    pub async fn throttle(&mut self) {
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

/// Drains the queue into `sink` at most `rate_per_sec` utterances a second.
/// Sink failures are logged and the worker moves on.
pub fn spawn_speech_worker(
    mut rx: mpsc::Receiver<String>,
    sink: Arc<dyn SpeechSink>,
    rate_per_sec: f32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut limiter = RateLimiter::new(rate_per_sec);
        while let Some(text) = rx.recv().await {
            limiter.throttle().await;
            if let Err(err) = sink.speak(&text).await {
                tracing::warn!(target: "livechat::tts", %err, "speech request failed");
            }
        }
        tracing::debug!(target: "livechat::tts", "speech worker stopped");
    })
}
