//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use super::{
    protocol::{Command, CommandError, CommandResponse},
    responses::{HealthResponse, StatusResponse},
};
use crate::{
    services::{EngineEvent, Snapshot},
    state::{AppState, TimerState},
};

fn status_for(error: &CommandError) -> StatusCode {
    if error.is_transport() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_REQUEST
    }
}

fn reply(result: Result<TimerState, CommandError>) -> (StatusCode, Json<CommandResponse>) {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    (status, Json(CommandResponse::from(result)))
}

/// Handle POST /command - Run one command against the engine
pub async fn command_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<CommandResponse>) {
    let command = match body {
        Ok(Json(value)) => Command::from_json(value),
        Err(rejection) => Err(CommandError::InvalidRequest(rejection.body_text())),
    };

    let command = match command {
        Ok(command) => command,
        Err(e) => {
            warn!("Rejected command request: {}", e);
            return reply(Err(e));
        }
    };

    debug!("Command endpoint called: {}", command.name());
    let result = state.engine.call(command).await;
    if let Err(e) = &result {
        error!("Command failed: {}", e);
    }
    reply(result)
}

/// Handle GET /state - Current timer snapshot
pub async fn state_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<CommandResponse>) {
    reply(state.engine.call(Command::GetState).await)
}

/// Handle GET /status - Timer plus server metadata
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let snapshot = match state.engine.call_snapshot(Command::GetState).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to get timer state: {}", e);
            return Err(status_for(&e));
        }
    };

    Ok(Json(StatusResponse {
        state: snapshot.state,
        revision: snapshot.revision,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        timestamp: Utc::now(),
    }))
}

fn state_event(snapshot: &Snapshot) -> Result<Event, axum::Error> {
    Event::default()
        .event("state")
        .id(snapshot.revision.to_string())
        .json_data(&snapshot.state)
}

fn engine_event(event: &EngineEvent) -> Result<Event, axum::Error> {
    let name = match event {
        EngineEvent::PhaseComplete { .. } => "phaseComplete",
    };
    Event::default().event(name).json_data(event)
}

/// Handle GET /events - Server-sent stream of state writes and phase events
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let feed = state.engine.feed();

    let mut states = feed.watch();
    let initial = states.borrow_and_update().clone();
    let state_stream = stream::once(async move { state_event(&initial) }).chain(stream::unfold(
        states,
        |mut rx| async move {
            rx.changed().await.ok()?;
            let snapshot = rx.borrow_and_update().clone();
            Some((state_event(&snapshot), rx))
        },
    ));

    let event_stream = stream::unfold(feed.events(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((engine_event(&event), rx)),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event stream lagged, {} events dropped", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream::select(state_stream, event_stream)).keep_alive(KeepAlive::default())
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
