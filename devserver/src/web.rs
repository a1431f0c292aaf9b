//! HTTP front end of the development server
//!
//! Every request lands in a single fallback handler that buffers the body,
//! runs the runner's `request` callback on a blocking thread and converts
//! the buffered response back into an axum response.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use runner::{BufferedRequest, BufferedResponse, RequestCallback};
use shared::{process_error, ProcessRole};

use crate::server::LocalServer;
use crate::state::ServerState;

/// Largest request body the server buffers
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Shared state handed to the fallback handler
#[derive(Clone)]
pub struct AppState {
    pub request: RequestCallback<LocalServer>,
    pub server: Arc<ServerState>,
}

/// Build the router: one fallback route behind tracing and a concurrency limit
pub fn build_router(app: AppState, max_conn: usize) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(ConcurrencyLimitLayer::new(max_conn))
                .into_inner(),
        )
        .with_state(app)
}

async fn dispatch(
    State(app): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let received_at = Instant::now();
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(e) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("Failed to read request body: {e}")).into_response();
        }
    };

    let mut raw = BufferedRequest::new(parts.method, parts.uri)
        .with_version(parts.version)
        .with_headers(parts.headers)
        .with_body(body.to_vec())
        .with_received_at(received_at);
    if let Some(ConnectInfo(addr)) = connect_info {
        raw = raw.with_remote_addr(addr);
    }

    let callback = Arc::clone(&app.request);
    let outcome = tokio::task::spawn_blocking(move || {
        let mut response = BufferedResponse::new();
        let result = callback(&raw, &mut response);
        (result, response)
    })
    .await;

    app.server.record_request();

    match outcome {
        Ok((Ok(()), response)) => into_http_response(response),
        Ok((Err(e), _)) => {
            process_error!(ProcessRole::current(), "Unhandled error in request callback: {}", error_chain(&e));
            internal_error()
        }
        Err(e) => {
            process_error!(ProcessRole::current(), "Request callback panicked: {}", e);
            internal_error()
        }
    }
}

/// Convert what the callback wrote into an axum response
pub fn into_http_response(response: BufferedResponse) -> Response {
    let (status, headers, body) = response.into_parts();
    let mut http_response = Response::new(Body::from(Bytes::from(body)));
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Render an error with its source chain
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
