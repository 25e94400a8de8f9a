//! Upgrade handlers for the persistent-session routes.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use super::connection::Connection;
use super::session::{Scope, Session};
use super::transport::{WsSink, WsSource};
use crate::server::AppState;

/// `GET /ws/echo`
pub async fn echo_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, state, Scope::Direct)
}

/// `GET /ws/broadcast`
pub async fn broadcast_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let scope = Scope::Global(Arc::clone(&state.broadcast));
    upgrade(ws, state, scope)
}

/// `GET /ws/chat/{room}`
///
/// The room is checked before the upgrade so a blank label is refused with a
/// plain 400 even when the request is a valid handshake.
pub async fn room_ws(
    Path(room): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if room.trim().is_empty() {
        return missing_room().await;
    }
    match ws {
        Ok(ws) => {
            let scope = Scope::Audience {
                registry: Arc::clone(&state.rooms),
                label: room,
            };
            upgrade(ws, state, scope)
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// `GET /ws/chat` with no room.
pub async fn missing_room() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Room parameter is required" })),
    )
        .into_response()
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, scope: Scope) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let (sink, source) = socket.split();
            let conn = Arc::new(Connection::new(
                WsSink::new(sink),
                state.config.write_timeout,
            ));
            debug!(conn_id = %conn.id(), scope = scope.name(), "upgraded");
            Session::new(
                conn,
                WsSource::new(source),
                scope,
                Arc::clone(&state.clock),
                state.shutdown.token(),
            )
            .serve()
            .await;
        })
}
