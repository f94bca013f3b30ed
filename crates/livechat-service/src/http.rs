use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use livechat::ChatEvent;
use livechat_gateway::{BroadcastRelay, SpeechControl, SpeechSink};

use crate::adapter::AdapterId;
use crate::supervisor::{ConnectionSnapshot, SupervisorError, SupervisorHandle};
use crate::twitch::RedirectTokenDelegate;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: SupervisorHandle,
    pub relay: BroadcastRelay,
    pub redirect: Arc<RedirectTokenDelegate>,
    /// `None` while speech output is disabled.
    pub speech: Option<Arc<dyn SpeechSink>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddConnectionRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    /// Start right after registering.
    #[serde(default)]
    pub start: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeUrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddConnectionResponse {
    pub id: AdapterId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

type ApiError = (StatusCode, String);

fn api_error(err: SupervisorError) -> ApiError {
    let status = match &err {
        SupervisorError::UnknownId(_) => StatusCode::NOT_FOUND,
        SupervisorError::DuplicateId(_)
        | SupervisorError::AlreadyRunning(_)
        | SupervisorError::NeedsStop(_) => StatusCode::CONFLICT,
        SupervisorError::Url(_) => StatusCode::BAD_REQUEST,
        SupervisorError::Closed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, err.to_string())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api", get(relay_handler))
        .route("/api/log", get(log_handler))
        .route(
            "/api/connections",
            get(list_connections).post(add_connection),
        )
        .route(
            "/api/connections/:id",
            put(change_url).delete(remove_connection),
        )
        .route("/api/connections/:id/start", post(start_connection))
        .route("/api/connections/:id/stop", post(stop_connection))
        .route("/api/clear", post(clear_handler))
        .route("/api/reload", post(reload_handler))
        .route("/api/speech/:command", post(speech_control))
        .route("/api/twitch/token", post(token_handler))
        .route("/twitch_redirect", get(redirect_page))
        .layer(cors)
        .with_state(state)
}

/// Relay records as server-sent events; a subscriber that falls behind skips
/// what it missed.
async fn relay_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(target: "livechat::service", subscribers = state.relay.subscriber_count() + 1, "overlay subscribed");
    let records = BroadcastStream::new(state.relay.subscribe()).filter_map(|record| match record {
        Ok(record) => Some(Ok(Event::default()
            .event(record.tag.as_str())
            .data(record.payload.to_string()))),
        Err(err) => {
            debug!(target: "livechat::service", %err, "relay subscriber lagged");
            None
        }
    });
    Sse::new(records).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn log_handler(State(state): State<AppState>) -> Result<Json<Vec<ChatEvent>>, ApiError> {
    state.supervisor.log().await.map(Json).map_err(api_error)
}

async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionSnapshot>>, ApiError> {
    state.supervisor.snapshot().await.map(Json).map_err(api_error)
}

async fn add_connection(
    State(state): State<AppState>,
    Json(payload): Json<AddConnectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = payload
        .id
        .filter(|id| !id.trim().is_empty())
        .map(AdapterId::new)
        .unwrap_or_else(AdapterId::generate);
    state
        .supervisor
        .add(id.clone(), payload.url)
        .await
        .map_err(api_error)?;
    if payload.start {
        state
            .supervisor
            .start(id.clone())
            .await
            .map_err(api_error)?;
    }
    Ok((StatusCode::CREATED, Json(AddConnectionResponse { id })))
}

async fn change_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ChangeUrlRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .supervisor
        .change_url(AdapterId::new(id), payload.url)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .supervisor
        .start(AdapterId::new(id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn stop_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .supervisor
        .stop(AdapterId::new(id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .supervisor
        .remove(AdapterId::new(id))
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.supervisor.clear().await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.supervisor.reload().await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn speech_control(
    State(state): State<AppState>,
    Path(command): Path<SpeechControl>,
) -> Result<StatusCode, ApiError> {
    let Some(sink) = state.speech.as_ref() else {
        return Err((StatusCode::NOT_FOUND, "speech output is disabled".into()));
    };
    sink.control(command).await.map_err(|err| {
        warn!(target: "livechat::tts", %command, error = %format!("{err:#}"), "speech control failed");
        (StatusCode::BAD_GATEWAY, format!("{err:#}"))
    })?;
    info!(target: "livechat::tts", %command, "speech control sent");
    Ok(StatusCode::NO_CONTENT)
}

async fn token_handler(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<StatusCode, ApiError> {
    if state.redirect.deliver(&payload.token) {
        info!(target: "livechat::service", "twitch token received");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::CONFLICT,
            "no twitch connection is waiting for a token".into(),
        ))
    }
}

async fn redirect_page() -> Html<&'static str> {
    Html(REDIRECT_HTML)
}

// The implicit grant returns the token in the fragment, which only the
// browser can see, so the page posts it back.
const REDIRECT_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>livechat</title></head>
<body>
  <p id="status">Sending token...</p>
  <script>
    const status = document.getElementById("status");
    fetch("/api/twitch/token", {
      method: "POST",
      headers: { "content-type": "application/json" },
      body: JSON.stringify({ token: window.location.hash }),
    })
      .then((res) => {
        status.textContent = res.ok
          ? "Twitch authorization complete. You can close this tab."
          : "No connection was waiting for authorization.";
      })
      .catch((err) => { status.textContent = "Failed: " + err; });
  </script>
</body>
</html>"#;
