//! Hooklens Common - shared wire types for the webhook capture backend
//!
//! This crate contains the request-event envelope, its codec, and the
//! control API payload shapes used by the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Codec errors for inbound event envelopes
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// An immutable snapshot of one received webhook call
///
/// Records are produced by the backend and never mutated client-side; the
/// backend-assigned `id` is the only lookup key. The `method` is free-form
/// so unknown verbs decode instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,

    /// HTTP verb as sent by the caller
    pub method: String,

    /// Path portion of the request URL
    pub url: String,

    /// Header name to value; order is not meaningful
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Query parameter name to value; order is not meaningful
    #[serde(default)]
    pub query_params: HashMap<String, String>,

    /// Raw request body as text; may be empty, may or may not be JSON
    #[serde(default)]
    pub body: String,

    /// When the backend received the request
    pub timestamp: DateTime<Utc>,
}

/// Decode a single wire-format event payload into a [`RequestRecord`]
///
/// `id`, `method`, `url` and `timestamp` are required; `headers`,
/// `queryParams` and `body` default to empty when absent. An empty body or
/// empty maps are valid payloads.
pub fn decode_event(raw: &str) -> Result<RequestRecord, DecodeError> {
    let record: RequestRecord = serde_json::from_str(raw)?;
    if record.id.is_empty() {
        return Err(DecodeError::EmptyField("id"));
    }
    Ok(record)
}

/// Request body for starting a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub port: u16,
    pub enable_tunnel: bool,
}

/// Backend response to start and tunnel-toggle calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Where the capture port is reachable; a tunnel URL when one is active
    pub public_url: String,
    pub port: u16,
}

/// Session status as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_running: bool,
    #[serde(default)]
    pub public_url: String,
    pub port: u16,
}

/// Endpoint paths on the backend control surface
pub mod endpoints {
    /// Start a capture session
    pub const START: &str = "/api/webhook/start";

    /// Stop the running capture session
    pub const STOP: &str = "/api/webhook/stop";

    /// Current session status
    pub const STATUS: &str = "/api/webhook/status";

    /// Enable the public tunnel for the running session
    pub const TUNNEL_ENABLE: &str = "/api/webhook/tunnel/enable";

    /// Disable the public tunnel for the running session
    pub const TUNNEL_DISABLE: &str = "/api/webhook/tunnel/disable";

    /// Live request-event feed (WebSocket)
    pub const EVENTS: &str = "/api/webhook/events";
}
