pub mod cheer;
pub mod config;
pub mod error;
pub mod message;
pub mod target;
pub mod tokenizer;
pub mod twitch;
pub mod youtube;

pub use cheer::{CheerResolver, CheermoteTable, CheermoteTier};
pub use config::{SourceConfig, TwitchConfig, YouTubeConfig};
pub use error::{ChatError, ChatResult};
pub use message::{
    AppLevel, Author, Badge, ChatEvent, CheerToken, Emote, EventKind, LiveMetadata,
    MessageSegment, Source, TwitchKind, YouTubeKind,
};
pub use target::{classify, SourceTarget, YouTubeTarget};
pub use tokenizer::{tokenize, EmoteCache, EmoteRangeMap, Tokenized};
