//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the server runs.
    pub status: String,
    /// Unix seconds at response time.
    pub timestamp: i64,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connections registered for fan-out (broadcast and rooms).
    pub connections: usize,
    /// Rooms with at least one member.
    pub rooms: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, now: i64, connections: usize, rooms: usize) -> HealthResponse {
    HealthResponse {
        status: "healthy".into(),
        timestamp: now,
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        rooms,
    }
}
