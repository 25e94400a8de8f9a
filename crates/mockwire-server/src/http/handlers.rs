//! Stateless single-shot responders.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{MatchedPath, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::debug;

use crate::health::{self, HealthResponse};
use crate::metrics::render as render_metrics;
use crate::server::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.len() + state.rooms.len();
    Json(health::health_check(
        state.start_time,
        state.clock.now(),
        connections,
        state.rooms.audience_count(),
    ))
}

/// `GET /echo`: request line, query and headers.
pub async fn echo_get(
    State(state): State<AppState>,
    method: Method,
    path: MatchedPath,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Json<Value> {
    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        query.entry(key).or_default().push(value);
    }
    Json(json!({
        "method": method.as_str(),
        "path": path.as_str(),
        "query": query,
        "headers": first_values(&headers),
        "timestamp": state.clock.now(),
    }))
}

/// `POST /echo`: headers plus the body, parsed when it is JSON.
///
/// A body that does not parse still gets a 200, with the decoder's complaint
/// under `json_parse_error`.
pub async fn echo_post(
    State(state): State<AppState>,
    method: Method,
    path: MatchedPath,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let raw = String::from_utf8_lossy(&body).into_owned();
    let mut response = json!({
        "method": method.as_str(),
        "path": path.as_str(),
        "headers": first_values(&headers),
        "timestamp": state.clock.now(),
        "body": Value::Null,
        "body_raw": "",
    });
    if raw.trim().is_empty() {
        return Json(response);
    }
    response["body_raw"] = Value::String(raw);
    match serde_json::from_slice::<Value>(&body) {
        Ok(parsed) => response["body"] = parsed,
        Err(e) => {
            debug!(error = %e, "echo body is not JSON");
            response["json_parse_error"] = json!({
                "error": "Invalid JSON format",
                "details": e.to_string(),
                "position": format!("line {}, column {}", e.line(), e.column()),
            });
        }
    }
    Json(response)
}

/// `GET /delay/{seconds}`
pub async fn delay(State(state): State<AppState>, Path(provided): Path<String>) -> Response {
    let max = state.config.max_delay_secs;
    let Some(seconds) = provided.parse::<u64>().ok().filter(|s| *s <= max) else {
        return bad_request(
            format!("Invalid delay parameter. Must be 0-{max} seconds"),
            &provided,
            state.clock.now(),
        );
    };
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    Json(json!({
        "message": "Response after delay",
        "delay_seconds": seconds,
        "timestamp": state.clock.now(),
    }))
    .into_response()
}

/// `GET /status/{code}`: respond with the requested status.
///
/// Informational codes are refused: a 1xx head cannot carry the JSON body.
pub async fn status(State(state): State<AppState>, Path(provided): Path<String>) -> Response {
    let code = provided
        .parse::<u16>()
        .ok()
        .filter(|c| (200..=599).contains(c))
        .and_then(|c| StatusCode::from_u16(c).ok());
    let Some(code) = code else {
        return bad_request(
            "Invalid status code. Must be 200-599".into(),
            &provided,
            state.clock.now(),
        );
    };
    let message = code
        .canonical_reason()
        .map_or_else(|| format!("Status code {}", code.as_u16()), str::to_owned);
    (
        code,
        Json(json!({
            "status_code": code.as_u16(),
            "message": message,
            "timestamp": state.clock.now(),
        })),
    )
        .into_response()
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> String {
    render_metrics(state.metrics.as_ref())
}

fn bad_request(error: String, provided: &str, now: i64) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": error,
            "provided": provided,
            "timestamp": now,
        })),
    )
        .into_response()
}

fn first_values(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        if let Some(value) = headers.get(name) {
            let _ = out.insert(
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
    }
    out
}
