//! HTTP front for the worker.
//!
//! Every request that isn't addressed to a `/__shellcache/` endpoint is
//! turned into a `FetchRequest` and offered to the worker. Requests the
//! worker doesn't intercept are forwarded to the network unchanged. Only the
//! scope's origin is reachable; absolute-form targets elsewhere are refused.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
    routing::{get, post},
};
use hyper::ext::ReasonPhrase;
use serde::Serialize;
use serde_json::{Value, json};
use shellcache_client::is_same_origin;
use shellcache_core::{CachedResponse, Error, FetchRequest, RequestMode, Scope};
use url::Url;

use crate::error::ServerError;
use crate::worker::{Interception, Worker, WorkerState};

/// Response header naming the layer that answered.
pub const SOURCE_HEADER: &str = "x-shellcache-source";

const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Framing headers are recomputed by the server for the outgoing body.
const FRAMING_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

pub fn router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/__shellcache/message", post(post_message))
        .route("/__shellcache/status", get(status))
        .fallback(fetch)
        .with_state(worker)
}

async fn post_message(
    State(worker): State<Arc<Worker>>, Json(message): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    let outcome = worker.post_message(&message).await?;
    Ok(Json(json!({ "outcome": outcome })))
}

#[derive(Debug, Serialize)]
struct StatusReport {
    state: WorkerState,
    version: String,
    serving_version: Option<String>,
    scope: String,
}

async fn status(State(worker): State<Arc<Worker>>) -> Json<StatusReport> {
    Json(StatusReport {
        state: worker.state(),
        version: worker.version().to_string(),
        serving_version: worker.serving_version().await,
        scope: worker.scope().root.to_string(),
    })
}

async fn fetch(State(worker): State<Arc<Worker>>, request: Request) -> Result<Response, ServerError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("failed to read request body: {e}")))?;
    let request = to_fetch_request(&parts.method, &parts.uri, &parts.headers, body, worker.scope())?;

    match worker.handle_fetch(&request).await {
        Interception::Respond { response, source } => into_http_response(response, source.as_str()),
        Interception::Passthrough => {
            tracing::debug!(method = %request.method, url = %request.url, "passing through");
            let response = worker.network().fetch(&request).await?;
            into_http_response(response, "passthrough")
        }
    }
}

fn to_fetch_request(
    method: &Method, uri: &Uri, headers: &HeaderMap, body: Bytes, scope: &Scope,
) -> Result<FetchRequest, ServerError> {
    let headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    Ok(FetchRequest {
        method: method.as_str().to_string(),
        url: target_url(uri, &scope.root)?,
        mode: request_mode(method, headers_ref(&headers)),
        headers,
        body,
        ..FetchRequest::get(scope.root.clone())
    })
}

fn headers_ref(headers: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
}

/// Origin-form paths are placed on the scope's origin. Absolute-form targets
/// keep their URL but must share that origin.
fn target_url(uri: &Uri, root: &Url) -> Result<Url, ServerError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        let url = Url::parse(&uri.to_string()).map_err(|e| ServerError::InvalidRequest(format!("{uri}: {e}")))?;
        if !is_same_origin(&url, root) {
            return Err(ServerError::ForbiddenTarget(url.to_string()));
        }
        return Ok(url);
    }

    let mut url = root.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

/// `Sec-Fetch-Mode: navigate` wins; otherwise a GET accepting HTML is a
/// navigation.
fn request_mode<'a>(method: &Method, headers: impl Iterator<Item = (&'a str, &'a str)>) -> RequestMode {
    let mut accepts_html = false;
    let mut fetch_mode = None;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("sec-fetch-mode") {
            fetch_mode = Some(value);
        } else if name.eq_ignore_ascii_case(header::ACCEPT.as_str()) && value.contains("text/html") {
            accepts_html = true;
        }
    }

    match fetch_mode {
        Some(mode) if mode.eq_ignore_ascii_case("navigate") => RequestMode::Navigate,
        Some(_) => RequestMode::Subresource,
        None if *method == Method::GET && accepts_html => RequestMode::Navigate,
        None => RequestMode::Subresource,
    }
}

fn into_http_response(response: CachedResponse, source: &'static str) -> Result<Response, ServerError> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| Error::CorruptEntry(format!("invalid status code {}", response.status)))?;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    if let Some(reason) = custom_reason(status, &response.status_text) {
        http.extensions_mut().insert(reason);
    }

    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if FRAMING_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "dropping invalid response header"),
        }
    }
    headers.insert(HeaderName::from_static(SOURCE_HEADER), HeaderValue::from_static(source));

    Ok(http)
}

/// Reason phrase to send when the stored one isn't the canonical text.
fn custom_reason(status: StatusCode, status_text: &str) -> Option<ReasonPhrase> {
    if status_text.is_empty() || status.canonical_reason() == Some(status_text) {
        return None;
    }
    match ReasonPhrase::try_from(status_text.as_bytes()) {
        Ok(reason) => Some(reason),
        Err(_) => {
            tracing::debug!(status = status.as_u16(), reason = status_text, "dropping invalid reason phrase");
            None
        }
    }
}
