pub mod adapter;
pub mod config;
pub mod factory;
pub mod http;
pub mod irc;
pub mod supervisor;
pub mod twitch;
pub mod youtube;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{AdapterEvent, AdapterFactory, AdapterId, ConnectionState, SourceAdapter};
pub use config::ServiceConfig;
pub use factory::ProviderFactory;
pub use http::{build_router, AppState};
pub use supervisor::{ConnectionSnapshot, ConnectionSupervisor, SupervisorError, SupervisorHandle};
pub use twitch::{token_store, RedirectTokenDelegate, StaticTokenDelegate, TokenDelegate, TokenStore};
