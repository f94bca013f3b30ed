use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use livechat_gateway::{
    spawn_speech_worker, BlockedWordFilter, BroadcastRelay, ChatLog, HttpSpeechSink,
    RelayPublisher, SpeechQueue, SpeechSink,
};
use livechat_service::{
    build_router, token_store, AdapterId, AppState, ConnectionSupervisor, ProviderFactory,
    RedirectTokenDelegate, ServiceConfig, StaticTokenDelegate, TokenDelegate,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Collects YouTube and Twitch live chat into one log for overlays and speech"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Logging level (error|warn|info|debug|trace) or a full filter directive
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let config = ServiceConfig::load(cli.config.as_deref())?;
    info!(
        target: "livechat::service",
        capacity = config.gateway.log.capacity,
        blocked_words = config.gateway.filter.blocked_words.len(),
        tts = config.gateway.tts.enabled,
        "configuration loaded"
    );

    let relay = BroadcastRelay::new(&config.gateway.relay);
    let (speech, speech_sink) = if config.gateway.tts.enabled {
        let (queue, rx) = SpeechQueue::new(&config.gateway.tts);
        let sink: Arc<dyn SpeechSink> = Arc::new(HttpSpeechSink::new(&config.gateway.tts)?);
        spawn_speech_worker(rx, sink.clone(), config.gateway.tts.rate_limit_per_sec);
        info!(target: "livechat::tts", endpoint = %config.gateway.tts.endpoint, "speech forwarding enabled");
        (Some(queue), Some(sink))
    } else {
        (None, None)
    };
    let publisher = RelayPublisher::new(Arc::new(relay.clone()), speech);

    let twitch = &config.sources.twitch;
    let tokens = token_store(twitch.oauth_token.as_deref());
    let redirect = Arc::new(RedirectTokenDelegate::new(twitch.redirect_uri.clone()));
    let delegate: Arc<dyn TokenDelegate> = if twitch.client_id.is_some() {
        redirect.clone()
    } else {
        Arc::new(StaticTokenDelegate::new(twitch.oauth_token.clone()))
    };
    let factory = ProviderFactory::new(&config.sources, tokens, delegate)?;

    let supervisor = ConnectionSupervisor::new(
        Arc::new(factory),
        ChatLog::new(&config.gateway.log),
        BlockedWordFilter::new(&config.gateway.filter),
        publisher,
    );
    let (handle, supervisor_task) = supervisor.spawn();

    for url in &config.urls {
        let id = AdapterId::generate();
        if let Err(err) = handle.add(id.clone(), url.as_str()).await {
            warn!(target: "livechat::service", %url, %err, "skipping configured url");
            continue;
        }
        if config.autostart {
            if let Err(err) = handle.start(id).await {
                warn!(target: "livechat::service", %url, %err, "failed to start configured url");
            }
        }
    }

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::WARN));

    let app = build_router(AppState {
        supervisor: handle,
        relay,
        redirect,
        speech: speech_sink,
    })
    .layer(trace_layer);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .context("bind_addr must be in host:port format")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(target: "livechat::service", %addr, "relay ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // the router owned the last supervisor handle; the task now stops every adapter
    supervisor_task
        .await
        .context("supervisor task panicked")?;
    info!(target: "livechat::service", "shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new(format!("livechat={level}")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("failed to initialise tracing subscriber: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target: "livechat::service", %err, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(target: "livechat::service", %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "livechat::service", "shutdown signal received");
}
