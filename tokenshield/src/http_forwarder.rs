//! Transparent HTTP forwarding gateway (spec.md §4.6).
//!
//! A catch-all `axum` route: read the inbound request, tokenize-walk a
//! JSON body, forward it to the configured application endpoint through a
//! circuit-breaker-guarded `reqwest` client, then detokenize-walk the
//! response for the designated cards-listing endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rust_common::{build_http_client, CircuitBreaker, HttpConfig};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::{Config, TokenFormat};
use crate::error::TokenShieldError;
use crate::rewriter;
use crate::token_engine::TokenEngine;

/// Endpoints eligible for detokenize-on-response rewriting, per spec.md §6.
const DETOKENIZE_ALLOWLIST: [&str; 2] = ["/api/cards", "/my-cards"];

/// Shared state threaded into every forwarder request handler.
pub struct ForwarderState {
    engine: Arc<TokenEngine>,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    app_endpoint: String,
    token_format: TokenFormat,
    max_body_bytes: usize,
}

impl ForwarderState {
    /// Build forwarder state from `config` and a shared token engine.
    ///
    /// # Errors
    ///
    /// Returns [`TokenShieldError::Config`] if the outbound HTTP client
    /// cannot be built.
    pub fn new(config: &Config, engine: Arc<TokenEngine>) -> Result<Self, TokenShieldError> {
        let http_config = HttpConfig::default()
            .with_timeout(Duration::from_secs(30))
            .with_redirects_disabled();
        let client = build_http_client(&http_config)
            .map_err(|e| TokenShieldError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            engine,
            client,
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            app_endpoint: config.app_endpoint.trim_end_matches('/').to_string(),
            token_format: config.token_format,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Build the catch-all forwarding router.
#[must_use]
pub fn router(state: Arc<ForwarderState>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .fallback(forward)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn forward(State(state): State<Arc<ForwarderState>>, req: Request) -> Response {
    match forward_inner(&state, req).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "forwarder error");
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.to_string()).into_response()
        }
    }
}

async fn forward_inner(state: &ForwarderState, req: Request) -> Result<Response, TokenShieldError> {
    let (parts, body) = req.into_parts();

    let body_bytes = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| TokenShieldError::BodyRead(e.to_string()))?;

    let outbound_body = if is_json(&parts.headers) && !body_bytes.is_empty() {
        match tokenize_json_body(&body_bytes, &state.engine, state.token_format).await {
            Some(rewritten) => rewritten,
            None => body_bytes.to_vec(),
        }
    } else {
        body_bytes.to_vec()
    };

    if !state.breaker.allow_request().await {
        return Err(TokenShieldError::CircuitOpen);
    }

    let target_url = build_target_url(&state.app_endpoint, &parts.uri)?;
    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| TokenShieldError::Config(format!("invalid method: {e}")))?;
    let outbound_headers = copy_headers_except_content_length(&parts.headers);

    let response = state
        .client
        .request(method, target_url)
        .headers(outbound_headers)
        .body(outbound_body)
        .send()
        .await;

    let response = match response {
        Ok(r) => {
            state.breaker.record_success().await;
            r
        }
        Err(e) => {
            state.breaker.record_failure().await;
            return Err(TokenShieldError::Dispatch(e));
        }
    };

    let status = response.status();
    let response_headers = response.headers().clone();
    let response_bytes = response
        .bytes()
        .await
        .map_err(|e| TokenShieldError::ResponseRead(e.to_string()))?;

    let rewritten_body = if status == reqwest::StatusCode::OK && is_detokenize_eligible(parts.uri.path()) {
        rewrite_response_for_detokenize(&response_headers, &response_bytes, &state.engine, state.token_format).await
    } else {
        response_bytes.to_vec()
    };

    Ok(build_response(status, &response_headers, rewritten_body))
}

async fn tokenize_json_body(body: &[u8], engine: &TokenEngine, token_format: TokenFormat) -> Option<Vec<u8>> {
    let mut value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match rewriter::tokenize_walk(&mut value, engine, token_format, None).await {
        Ok(true) => serde_json::to_vec(&value).ok(),
        Ok(false) => None,
        Err(e) => {
            warn!(error = %e, "tokenize rewrite failed, forwarding original body");
            None
        }
    }
}

async fn rewrite_response_for_detokenize(
    headers: &reqwest::header::HeaderMap,
    body: &[u8],
    engine: &TokenEngine,
    token_format: TokenFormat,
) -> Vec<u8> {
    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return body.to_vec();
        };
        match rewriter::detokenize_walk(&mut value, engine, token_format, None).await {
            Ok(true) => serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec()),
            Ok(false) => body.to_vec(),
            Err(e) => {
                warn!(error = %e, "detokenize rewrite failed, forwarding original body");
                body.to_vec()
            }
        }
    } else if content_type.contains("text/html") {
        let Ok(text) = std::str::from_utf8(body) else {
            return body.to_vec();
        };
        match rewriter::detokenize_html(text, engine, token_format, None).await {
            Ok(rewritten) => rewritten.into_bytes(),
            Err(e) => {
                warn!(error = %e, "HTML detokenize fallback failed, forwarding original body");
                body.to_vec()
            }
        }
    } else {
        body.to_vec()
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
}

fn is_detokenize_eligible(path: &str) -> bool {
    DETOKENIZE_ALLOWLIST.contains(&path)
}

fn build_target_url(app_endpoint: &str, uri: &Uri) -> Result<String, TokenShieldError> {
    let path_and_query = uri.path_and_query().map_or_else(|| uri.path(), |pq| pq.as_str());
    Ok(format!("{app_endpoint}{path_and_query}"))
}

fn copy_headers_except_content_length(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in headers.iter() {
        if name == axum::http::header::CONTENT_LENGTH {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn build_response(status: reqwest::StatusCode, headers: &reqwest::header::HeaderMap, body: Vec<u8>) -> Response {
    let mut builder = axum::http::Response::builder().status(status.as_u16());
    if let Some(builder_headers) = builder.headers_mut() {
        for (name, value) in headers.iter() {
            if name == reqwest::header::CONTENT_LENGTH {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
                axum::http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                builder_headers.append(name, value);
            }
        }
        builder_headers.insert(axum::http::header::CONTENT_LENGTH, axum::http::HeaderValue::from(body.len()));
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detokenize_allowlist() {
        assert!(is_detokenize_eligible("/api/cards"));
        assert!(is_detokenize_eligible("/my-cards"));
        assert!(!is_detokenize_eligible("/checkout"));
    }

    #[test]
    fn test_build_target_url_preserves_query() {
        let uri: Uri = "/api/cards?page=2".parse().unwrap();
        let url = build_target_url("http://localhost:3000", &uri).unwrap();
        assert_eq!(url, "http://localhost:3000/api/cards?page=2");
    }

    #[test]
    fn test_build_target_url_no_query() {
        let uri: Uri = "/checkout".parse().unwrap();
        let url = build_target_url("http://localhost:3000", &uri).unwrap();
        assert_eq!(url, "http://localhost:3000/checkout");
    }
}
