//! Static file short-circuit
//!
//! Serves files from one or more document roots before the application
//! handler runs. Only files whose extension appears in the MIME type map
//! are served; everything else falls through to the application.

use chrono::{DateTime, Utc};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use shared::{process_debug, process_warn, ProcessRole};

use crate::traits::{RawRequest, RawResponse, StaticResourceHandler};
use crate::types::StaticResourceResponse;

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Static file handler rooted at a set of document roots
#[derive(Debug, Clone)]
pub struct FileSystemStaticHandler {
    /// Directories searched in order
    document_roots: Vec<PathBuf>,

    /// MIME type mappings
    mime_types: HashMap<String, String>,

    /// Cache-Control values by extension
    cache_control: HashMap<String, String>,
}

impl FileSystemStaticHandler {
    /// Create a handler with the built-in MIME types and cache rules
    pub fn new<P: AsRef<Path>>(document_root: P) -> Self {
        Self::with_document_roots(vec![document_root.as_ref().to_path_buf()])
    }

    pub fn with_document_roots(document_roots: Vec<PathBuf>) -> Self {
        let mut mime_types = HashMap::new();
        for (extension, mime) in [
            ("html", "text/html; charset=utf-8"),
            ("htm", "text/html; charset=utf-8"),
            ("txt", "text/plain; charset=utf-8"),
            ("css", "text/css"),
            ("js", "application/javascript"),
            ("mjs", "application/javascript"),
            ("map", "application/json"),
            ("json", "application/json"),
            ("xml", "application/xml"),
            ("pdf", "application/pdf"),
            ("wasm", "application/wasm"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("webp", "image/webp"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
            ("woff", "font/woff"),
            ("woff2", "font/woff2"),
            ("ttf", "font/ttf"),
            ("mp4", "video/mp4"),
            ("mp3", "audio/mpeg"),
        ] {
            mime_types.insert(extension.to_string(), mime.to_string());
        }

        let mut cache_control = HashMap::new();
        cache_control.insert("html".to_string(), "no-cache".to_string());
        for extension in ["js", "mjs", "css"] {
            cache_control.insert(extension.to_string(), "public, max-age=3600".to_string()); // 1 hour
        }
        for extension in ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico"] {
            cache_control.insert(extension.to_string(), "public, max-age=86400".to_string()); // 1 day
        }
        for extension in ["woff", "woff2", "ttf"] {
            cache_control.insert(extension.to_string(), "public, max-age=604800".to_string()); // 1 week
        }

        Self {
            document_roots,
            mime_types,
            cache_control,
        }
    }

    /// Add or replace a MIME type mapping (fluent API)
    pub fn with_mime_type(mut self, extension: &str, mime: &str) -> Self {
        self.mime_types
            .insert(extension.trim_start_matches('.').to_lowercase(), mime.to_string());
        self
    }

    /// Add or replace a Cache-Control rule (fluent API)
    pub fn with_cache_control(mut self, extension: &str, value: &str) -> Self {
        self.cache_control
            .insert(extension.trim_start_matches('.').to_lowercase(), value.to_string());
        self
    }

    pub fn document_roots(&self) -> &[PathBuf] {
        &self.document_roots
    }

    fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Resolve a request path to a servable file, preventing directory traversal
    fn resolve_path(&self, request_path: &str) -> Option<PathBuf> {
        let clean_path = request_path.trim_start_matches('/');
        if clean_path.split('/').any(|segment| segment == "..") {
            return None;
        }

        for root in &self.document_roots {
            let canonical_root = match root.canonicalize() {
                Ok(path) => path,
                Err(e) => {
                    process_debug!(
                        ProcessRole::current(),
                        "Document root {} not accessible: {}",
                        root.display(),
                        e
                    );
                    continue;
                }
            };

            let mut candidate = canonical_root.join(clean_path);
            if candidate.is_dir() {
                candidate = candidate.join("index.html");
            }

            let canonical_path = match candidate.canonicalize() {
                Ok(path) => path,
                Err(_) => continue,
            };

            // Ensure the resolved path is within the document root
            if !canonical_path.starts_with(&canonical_root) || !canonical_path.is_file() {
                continue;
            }

            let servable = Self::extension_of(&canonical_path)
                .map(|ext| self.mime_types.contains_key(&ext))
                .unwrap_or(false);
            if servable {
                return Some(canonical_path);
            }
        }

        None
    }

    fn build_headers(&self, path: &Path, metadata: &fs::Metadata) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let extension = Self::extension_of(path).unwrap_or_default();

        if let Some(mime) = self.mime_types.get(&extension) {
            insert_header(&mut headers, header::CONTENT_TYPE, mime);
        }
        if let Some(cache) = self.cache_control.get(&extension) {
            insert_header(&mut headers, header::CACHE_CONTROL, cache);
        }

        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            insert_header(
                &mut headers,
                header::LAST_MODIFIED,
                &modified.format(HTTP_DATE_FORMAT).to_string(),
            );
        }

        insert_header(&mut headers, header::ETAG, &etag_for(metadata));
        headers
    }

    fn is_not_modified(request: &dyn RawRequest, headers: &HeaderMap) -> bool {
        if let Some(if_none_match) = request.header("if-none-match") {
            let etag = headers.get(header::ETAG).and_then(|v| v.to_str().ok());
            return match etag {
                Some(etag) => if_none_match
                    .split(',')
                    .map(str::trim)
                    .any(|candidate| candidate == "*" || candidate == etag),
                None => false,
            };
        }

        let if_modified_since = request
            .header("if-modified-since")
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok());
        let last_modified = headers
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok());

        match (if_modified_since, last_modified) {
            (Some(since), Some(modified)) => modified <= since,
            _ => false,
        }
    }

    fn send(
        response: &mut dyn RawResponse,
        outcome: &StaticResourceResponse,
        body: Option<&[u8]>,
    ) {
        response.set_status(outcome.status);
        for (name, value) in &outcome.headers {
            response.append_header(name, value);
        }
        if let Err(e) = response.end(body) {
            process_warn!(ProcessRole::current(), "Failed to send static response: {}", e);
        }
    }
}

impl Default for FileSystemStaticHandler {
    fn default() -> Self {
        Self::new("./public")
    }
}

impl StaticResourceHandler for FileSystemStaticHandler {
    fn process_static_resource(
        &self,
        request: &dyn RawRequest,
        response: &mut dyn RawResponse,
    ) -> Option<StaticResourceResponse> {
        let path = self.resolve_path(request.uri().path())?;
        let metadata = fs::metadata(&path).ok()?;
        let method = request.method();

        if *method == Method::OPTIONS {
            let mut outcome = StaticResourceResponse::new(StatusCode::OK);
            insert_header(&mut outcome.headers, header::ALLOW, ALLOWED_METHODS);
            Self::send(response, &outcome, None);
            return Some(outcome);
        }

        if *method != Method::GET && *method != Method::HEAD {
            let mut outcome = StaticResourceResponse::new(StatusCode::METHOD_NOT_ALLOWED);
            insert_header(&mut outcome.headers, header::ALLOW, ALLOWED_METHODS);
            Self::send(response, &outcome, None);
            return Some(outcome);
        }

        let headers = self.build_headers(&path, &metadata);

        if Self::is_not_modified(request, &headers) {
            let mut outcome = StaticResourceResponse::new(StatusCode::NOT_MODIFIED);
            outcome.headers = headers;
            Self::send(response, &outcome, None);
            return Some(outcome);
        }

        let mut outcome = StaticResourceResponse::new(StatusCode::OK);
        outcome.headers = headers;
        outcome.content_length = metadata.len();

        if *method == Method::HEAD {
            insert_header(
                &mut outcome.headers,
                header::CONTENT_LENGTH,
                &metadata.len().to_string(),
            );
            Self::send(response, &outcome, None);
            return Some(outcome);
        }

        match fs::read(&path) {
            Ok(content) => {
                outcome.content_length = content.len() as u64;
                outcome.send_content = true;
                Self::send(response, &outcome, Some(&content));

                process_debug!(
                    ProcessRole::current(),
                    "Served static file: {} ({} bytes)",
                    path.display(),
                    content.len()
                );
                Some(outcome)
            }
            Err(e) => {
                // Nothing has been written yet, let the application answer
                process_warn!(
                    ProcessRole::current(),
                    "Failed to read static file {}: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Weak validator built from size and modification time
fn etag_for(metadata: &fs::Metadata) -> String {
    let mtime = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("W/\"{:x}-{:x}\"", metadata.len(), mtime)
}
