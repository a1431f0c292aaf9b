//! Demo application served by the development server
//!
//! Answers `/health` with a status document and echoes every other request
//! back as JSON.

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use runner::services::RemoteAddr;
use runner::RequestHandler;

#[derive(Debug, Serialize)]
struct Echo<'a> {
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    headers: BTreeMap<&'a str, &'a str>,
    body: String,
    remote_addr: Option<String>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    pid: u32,
    uptime_secs: u64,
    requests: u64,
}

pub struct EchoHandler {
    started_at: Instant,
    requests: AtomicU64,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
        }
    }

    fn health(&self, requests: u64) -> anyhow::Result<Response<Bytes>> {
        json(
            StatusCode::OK,
            &Health {
                status: "ok",
                pid: std::process::id(),
                uptime_secs: self.started_at.elapsed().as_secs(),
                requests,
            },
        )
    }

    fn echo(&self, request: &Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        let headers = request
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
            .collect();

        let echo = Echo {
            method: request.method().as_str(),
            path: request.uri().path(),
            query: request.uri().query(),
            headers,
            body: String::from_utf8_lossy(request.body()).into_owned(),
            remote_addr: request
                .extensions()
                .get::<RemoteAddr>()
                .map(|RemoteAddr(addr)| addr.to_string()),
        };
        json(StatusCode::OK, &echo)
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for EchoHandler {
    fn handle(&self, request: Request<Bytes>) -> anyhow::Result<Response<Bytes>> {
        let requests = self.requests.fetch_add(1, Ordering::Relaxed) + 1;

        match (request.method(), request.uri().path()) {
            (&Method::GET, "/health") => self.health(requests),
            _ => self.echo(&request),
        }
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> anyhow::Result<Response<Bytes>> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}
