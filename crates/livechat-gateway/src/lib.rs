pub mod config;
pub mod filter;
pub mod log;
pub mod queue;
pub mod relay;
pub mod tts;

pub use config::{FilterConfig, GatewayConfig, LogConfig, RelayConfig, TtsConfig, TtsTemplates};
pub use filter::BlockedWordFilter;
pub use log::{AppendOptions, AppendOutcome, ChatLog};
pub use queue::{spawn_speech_worker, RateLimiter, SpeechQueue};
pub use relay::{BroadcastRelay, RelayPublisher, RelayRecord, RelaySink, RelayTag};
pub use tts::{render_template, HttpSpeechSink, SpeechControl, SpeechSink, UtteranceBuilder};
