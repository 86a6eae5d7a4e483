//! Public tracking handlers
//!
//! These endpoints are reached from recipients' mail clients and browsers,
//! so they carry no authentication. The token is the only key.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use phishsim_common::types::{token_prefix, EventMetadata, SubmitMetadata, VisitMetadata};
use phishsim_core::RecordError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use crate::auth::AppState;
use crate::error::{api_error, from_record_error, ApiError};

/// 1x1 transparent GIF
pub const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

pub const DISCLOSURE_MESSAGE: &str = "This was a security awareness test";

pub const DISCLOSURE_DETAILS: &str = "You have submitted credentials to a simulated phishing page. \
In a real attack, your credentials would now be compromised. Please be cautious of suspicious \
emails and always verify the URL before entering sensitive information.";

/// Decoy form submission
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Fixed educational answer to every accepted submission
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    pub details: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = header_str(headers, header::HeaderName::from_static("x-forwarded-for")) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return Some(first.to_string());
        }
    }

    header_str(headers, header::HeaderName::from_static("x-real-ip"))
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn visit_metadata(headers: &HeaderMap, peer: Option<SocketAddr>) -> VisitMetadata {
    VisitMetadata {
        ip: client_ip(headers, peer),
        user_agent: header_str(headers, header::USER_AGENT).map(String::from),
        referer: header_str(headers, header::REFERER).map(String::from),
    }
}

fn peer_addr(connect: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    connect.map(|ConnectInfo(addr)| addr)
}

fn note_unresolved(state: &AppState, endpoint: &str) {
    state
        .metrics
        .tracking_unresolved
        .with_label_values(&[endpoint])
        .inc();
}

fn tracking_pixel() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRACKING_PIXEL,
    )
        .into_response()
}

/// Record an open and return the beacon image.
///
/// The response is identical whether or not the token resolves.
///
/// GET /open/:token
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let metadata = EventMetadata::Open(visit_metadata(&headers, peer_addr(connect)));

    match state.recorder.record(&token, metadata).await {
        Ok(_) => {}
        Err(RecordError::TokenNotFound) => note_unresolved(&state, "open"),
        Err(e) => error!(token = token_prefix(&token), error = %e, "Failed to record open"),
    }

    tracking_pixel()
}

/// Record a click and redirect to the landing page
///
/// GET /t/:token
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let metadata = EventMetadata::Click(visit_metadata(&headers, peer_addr(connect)));

    let event = state.recorder.record(&token, metadata).await;
    if let Err(RecordError::TokenNotFound) = &event {
        note_unresolved(&state, "click");
    }
    event.map_err(from_record_error)?;

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, format!("/landing/{}", token))],
    )
        .into_response())
}

/// Serve the decoy credential page
///
/// GET /landing/:token
pub async fn landing_page(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let target = state.recorder.resolve(&token).await.map_err(|e| {
        if matches!(e, RecordError::TokenNotFound) {
            note_unresolved(&state, "landing");
        }
        from_record_error(e)
    })?;

    let html = state.landing.render(&target).map_err(|e| {
        error!(target_id = %target.id, error = %e, "Failed to render landing page");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Failed to render page",
        )
    })?;

    Ok(Html(html))
}

/// Record a decoy form submission.
///
/// Only the password length is kept. The answer never depends on the
/// submitted credentials.
///
/// POST /submit
pub async fn track_submit(
    State(state): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(input): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let SubmitRequest {
        token,
        username,
        password,
    } = input;
    let visit = visit_metadata(&headers, peer_addr(connect));
    let metadata = EventMetadata::Submit(SubmitMetadata::new(visit, username, &password));

    let event = state.recorder.record(&token, metadata).await;
    if let Err(RecordError::TokenNotFound) = &event {
        note_unresolved(&state, "submit");
    }
    event.map_err(|e| match e {
        RecordError::TokenNotFound => {
            api_error(StatusCode::NOT_FOUND, "not_found", "Invalid token")
        }
        other => from_record_error(other),
    })?;

    Ok(Json(SubmitResponse {
        success: true,
        message: DISCLOSURE_MESSAGE.to_string(),
        details: DISCLOSURE_DETAILS.to_string(),
    }))
}
