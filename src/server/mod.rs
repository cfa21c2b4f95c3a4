// Token-issuance HTTP API.
//
// LiveKit creates rooms when the first participant joins, so both POST
// routes reduce to signing a join token for a (possibly generated) room.


use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, LiveKitConfig};
use crate::livekit::{AccessToken, VideoGrants, generate_room_name};
use crate::{RagError, Result};

const SERVICE_NAME: &str = "LiveKit RAG Agent API";

#[derive(Debug, Clone)]
pub struct AppState {
    livekit: Arc<LiveKitConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub room_name: Option<String>,
    pub participant_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub room_name: String,
    pub ws_url: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

/// Sign a join token, generating a room name when none was supplied.
#[inline]
pub fn issue_token(livekit: &LiveKitConfig, request: &CreateRoomRequest) -> Result<TokenResponse> {
    let room_name = request
        .room_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(generate_room_name, str::to_string);

    info!(
        "Issuing token for room {room_name}, participant {}",
        request.participant_name
    );

    let token = AccessToken::new(livekit)
        .with_identity(&request.participant_name)
        .with_name(&request.participant_name)
        .with_grants(VideoGrants::join_room(&room_name))
        .to_jwt()?;

    Ok(TokenResponse {
        token,
        room_name,
        ws_url: livekit.ws_url.clone(),
    })
}

async fn root() -> &'static str {
    "LiveKit RAG Agent API is running"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

async fn get_token(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> std::result::Result<Json<TokenResponse>, (StatusCode, String)> {
    issue_token(&state.livekit, &request).map(Json).map_err(|e| {
        error!("Failed to generate token: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to generate token: {e}"),
        )
    })
}

#[inline]
pub fn build_router(livekit: Arc<LiveKitConfig>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/get-token", post(get_token))
        .route("/create-room-and-token", post(get_token))
        .with_state(AppState { livekit })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind and serve the token API until the process is stopped.
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let livekit = config
        .require_livekit()
        .map_err(|e| RagError::Config(e.to_string()))?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| RagError::Config(format!("Invalid server address: {e}")))?;

    let router = build_router(Arc::new(livekit.clone()));

    info!("Starting token service on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Server error: {e}")))?;

    Ok(())
}
