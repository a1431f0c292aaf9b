//! In-memory raw request/response pair
//!
//! Used by servers that receive the whole request before invoking the
//! `request` callback and send the response once the callback returns.

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use crate::traits::{RawRequest, RawResponse};

/// Fully buffered request
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Vec<u8>,
    received_at: Instant,
}

impl BufferedRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
            body: Vec::new(),
            received_at: Instant::now(),
        }
    }

    /// GET request for a path; falls back to `/` when the path is not a valid URI
    pub fn get(path: &str) -> Self {
        let uri = path.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(Method::GET, uri)
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_received_at(mut self, received_at: Instant) -> Self {
        self.received_at = received_at;
        self
    }
}

impl RawRequest for BufferedRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn received_at(&self) -> Option<Instant> {
        Some(self.received_at)
    }
}

/// Response collected in memory until the callback returns
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    chunks_written: usize,
    ended: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            chunks_written: 0,
            ended: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of `write`/`end` calls that carried data
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
        (self.status, self.headers, self.body)
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.ended {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "response already ended"))
        } else {
            Ok(())
        }
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl RawResponse for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn append_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers.append(name.clone(), value.clone());
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        if !chunk.is_empty() {
            self.body.extend_from_slice(chunk);
            self.chunks_written += 1;
        }
        Ok(())
    }

    fn end(&mut self, chunk: Option<&[u8]>) -> io::Result<()> {
        self.ensure_open()?;
        if let Some(chunk) = chunk.filter(|c| !c.is_empty()) {
            self.body.extend_from_slice(chunk);
            self.chunks_written += 1;
        }
        self.ended = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = BufferedRequest::get("/assets/app.js?v=2")
            .with_header("accept", "text/javascript")
            .with_header("bad header", "ignored")
            .with_body("payload");

        assert_eq!(*request.method(), Method::GET);
        assert_eq!(request.uri().path(), "/assets/app.js");
        assert_eq!(request.header("accept"), Some("text/javascript"));
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.body(), b"payload");
        assert!(request.received_at().is_some());
    }

    #[test]
    fn test_response_rejects_writes_after_end() {
        let mut response = BufferedResponse::new();
        response.write(b"hello ").unwrap();
        response.end(Some(&b"world"[..])).unwrap();

        assert_eq!(response.body(), b"hello world");
        assert_eq!(response.chunks_written(), 2);
        assert!(response.is_ended());
        assert!(response.write(b"!").is_err());
        assert!(response.end(None).is_err());
    }
}
