//! HTTP ingress for interaction events
//!
//! `POST /interactions` accepts one event, routes it through the engine and
//! answers with everything the handler sent. `GET /health` reports the size
//! of the loaded registry.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::command::CapabilitySet;
use crate::context::{CommandOption, InvocationContext, Invoker, SuggestionContext};
use crate::dispatch::{DispatchOutcome, InboundEvent};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::response::{BufferedResponseChannel, BufferedSuggestionSink, SentResponse, SuggestionChoice};

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    /// `command`, `autocomplete`, or any other kind (ignored)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub invoker: Invoker,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub executor_capabilities: Option<CapabilitySet>,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub responses: Vec<SentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<SuggestionChoice>>,
}

#[derive(Debug, Serialize)]
struct HealthStatusResponse {
    ok: bool,
    commands: usize,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/interactions", post(interaction_handler))
        .with_state(engine)
}

pub async fn serve(engine: Arc<Engine>, bind_addr: &str) -> EngineResult<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| EngineError::Generic(format!("Gateway bind error: {}", e)))?;
    info!("[Gateway] Listening on {}", bind_addr);
    axum::serve(listener, router(engine).into_make_service())
        .await
        .map_err(|e| EngineError::Generic(format!("Gateway server error: {}", e)))?;
    Ok(())
}

async fn health_handler(State(engine): State<Arc<Engine>>) -> Json<HealthStatusResponse> {
    Json(HealthStatusResponse {
        ok: true,
        commands: engine.registry().len(),
    })
}

async fn interaction_handler(
    State(engine): State<Arc<Engine>>,
    Json(payload): Json<InteractionRequest>,
) -> Result<Json<InteractionResponse>, StatusCode> {
    debug!("[Gateway] Received {} event", payload.kind);

    let command = match (payload.kind.as_str(), payload.command) {
        ("command" | "autocomplete", Some(command)) => command,
        ("command" | "autocomplete", None) => return Err(StatusCode::BAD_REQUEST),
        (kind, _) => {
            let outcome = engine
                .handle_event(InboundEvent::Unsupported {
                    kind: kind.to_string(),
                })
                .await;
            return Ok(Json(InteractionResponse {
                outcome,
                responses: Vec::new(),
                choices: None,
            }));
        }
    };

    if payload.kind == "autocomplete" {
        let sink = Arc::new(BufferedSuggestionSink::new());
        let mut ctx = SuggestionContext::new(command, payload.invoker, sink.clone())
            .with_options(payload.options);
        ctx.scope = payload.scope;

        let outcome = engine.handle_event(InboundEvent::Suggestion(ctx)).await;
        return Ok(Json(InteractionResponse {
            outcome,
            responses: Vec::new(),
            choices: sink.choices(),
        }));
    }

    let channel = Arc::new(BufferedResponseChannel::new());
    let mut ctx = InvocationContext::new(command, payload.invoker, channel.clone())
        .with_options(payload.options);
    ctx.scope = payload.scope;
    ctx.executor_capabilities = payload.executor_capabilities;

    let outcome = engine.handle_event(InboundEvent::Invocation(ctx)).await;
    Ok(Json(InteractionResponse {
        outcome,
        responses: channel.sent(),
        choices: None,
    }))
}
