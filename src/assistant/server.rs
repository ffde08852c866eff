use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use super::{AssistantClient, ChatReply, ChatRequest};
use crate::error::Error;

#[derive(Clone)]
struct AppState {
    client: Arc<AssistantClient>,
}

/// The proxy's routes: `POST /api/ai-assistant`
pub fn router(client: AssistantClient) -> Router {
    let state = AppState {
        client: Arc::new(client),
    };

    Router::new()
        .route("/api/ai-assistant", post(ai_assistant))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the proxy on an already bound listener until the process exits.
pub async fn serve(listener: TcpListener, client: AssistantClient) -> Result<(), Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("AI proxy listening on {}", addr);
    }
    axum::serve(listener, router(client)).await?;
    Ok(())
}

async fn ai_assistant(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    match state.client.complete(&request.messages).await {
        Ok(message) => Json(ChatReply { message }).into_response(),
        Err(err) => {
            error!("completion failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}
