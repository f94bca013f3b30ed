use std::sync::Arc;

use anyhow::Result;

use livechat::{SourceConfig, SourceTarget};

use crate::adapter::{AdapterFactory, SourceAdapter};
use crate::irc::TcpIrcConnector;
use crate::twitch::{HelixClient, TokenDelegate, TokenStore, TwitchAdapter, TwitchDeps};
use crate::youtube::{InnerTubeClient, YouTubeAdapter, YouTubeApi, YouTubePollOptions};

/// Builds the real network adapters for a classified target.
pub struct ProviderFactory {
    youtube: Arc<dyn YouTubeApi>,
    youtube_options: YouTubePollOptions,
    twitch: TwitchDeps,
}

impl ProviderFactory {
    pub fn new(
        config: &SourceConfig,
        tokens: TokenStore,
        delegate: Arc<dyn TokenDelegate>,
    ) -> Result<Self> {
        let client_id = config.twitch.client_id.clone().unwrap_or_default();
        Ok(Self {
            youtube: Arc::new(InnerTubeClient::new(&config.youtube)?),
            youtube_options: YouTubePollOptions::from(&config.youtube),
            twitch: TwitchDeps {
                helix: Arc::new(HelixClient::new(client_id.clone())?),
                client_id,
                irc: Arc::new(TcpIrcConnector::from_env()),
                delegate,
                tokens,
                metadata_interval: config.twitch.metadata_interval(),
            },
        })
    }
}

impl AdapterFactory for ProviderFactory {
    fn create(&self, target: &SourceTarget) -> Box<dyn SourceAdapter> {
        match target {
            SourceTarget::YouTube(target) => Box::new(YouTubeAdapter::new(
                target.clone(),
                self.youtube.clone(),
                self.youtube_options.clone(),
            )),
            SourceTarget::Twitch { channel } => {
                Box::new(TwitchAdapter::new(channel.clone(), self.twitch.clone()))
            }
        }
    }
}
