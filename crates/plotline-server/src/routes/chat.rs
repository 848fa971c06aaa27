use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use plotline::{
    agent::Agent,
    events::{TurnError, TurnResult},
    models::message::Message,
    providers::factory,
    toolserver::HttpToolServer,
};
use serde::Deserialize;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default, alias = "priorMessages")]
    messages: Vec<IncomingMessage>,
    query: String,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

// Custom SSE response type carrying pre-framed event strings
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

// Convert incoming history to our internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => messages.push(Message::user().with_text(msg.content)),
            "assistant" => messages.push(Message::assistant().with_text(msg.content)),
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

/// Build the per-turn agent: a fresh provider and a fresh tool-server
/// connection, both owned by this turn only
fn build_agent(state: &AppState) -> Result<Agent, StatusCode> {
    let provider = factory::get_provider(state.provider_config.clone())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let tools = HttpToolServer::new(&state.tool_server_url)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Agent::new(provider, Box::new(tools)).with_config(state.agent_config.clone()))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnResult>, (StatusCode, Json<TurnError>)> {
    let agent = build_agent(&state).map_err(|status| {
        (
            status,
            Json(TurnError {
                error: "Failed to process chat request".to_string(),
                details: "Could not initialize the turn".to_string(),
            }),
        )
    })?;

    let messages = convert_messages(request.messages);
    match agent.chat(messages, request.query).await {
        Ok(result) => Ok(Json(result)),
        Err(error) => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(error))),
    }
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, StatusCode> {
    let agent = build_agent(&state)?;
    let messages = convert_messages(request.messages);
    let query = request.query;

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    // Spawn task to drive the turn and frame its events
    tokio::spawn(async move {
        let mut events = agent.reply(messages, query);

        loop {
            tokio::select! {
                event = timeout(Duration::from_millis(500), events.next()) => {
                    match event {
                        Ok(Some(event)) => {
                            let frame = format!(
                                "event: {}\ndata: {}\n\n",
                                event.name(),
                                event.payload()
                            );
                            if tx.send(frame).await.is_err() {
                                // Consumer went away; dropping the stream
                                // releases the turn's connections
                                break;
                            }
                        }
                        Ok(None) => {
                            break;
                        }
                        Err(_) => { // Heartbeat, used to detect disconnected clients
                            if tx.is_closed() {
                                break;
                            }
                            continue;
                        }
                    }
                }
            }
        }
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .with_state(state)
}
