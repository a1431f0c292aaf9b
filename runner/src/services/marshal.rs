//! Default request factory and error response generator

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::traits::{ErrorResponseFactory, RawRequest, RequestFactory};

/// Client address of the native connection, stored as a request extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Build an application request from a raw native request
pub fn marshal_request(raw: &dyn RawRequest) -> anyhow::Result<Request<Bytes>> {
    let mut builder = Request::builder()
        .method(raw.method().clone())
        .uri(raw.uri().clone())
        .version(raw.version());

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in raw.headers() {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut request = builder.body(Bytes::copy_from_slice(raw.body()))?;

    if let Some(addr) = raw.remote_addr() {
        request.extensions_mut().insert(RemoteAddr(addr));
    }

    Ok(request)
}

/// Plain-text `400 Bad Request` describing the error chain
pub fn error_response(error: &anyhow::Error) -> Response<Bytes> {
    let body = format!("Bad Request: {error:#}\n");
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub fn default_request_factory() -> RequestFactory {
    Arc::new(marshal_request)
}

pub fn default_error_response_factory() -> ErrorResponseFactory {
    Arc::new(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffered::BufferedRequest;
    use http::Method;

    #[test]
    fn test_marshal_copies_request_parts() {
        let addr: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        let raw = BufferedRequest::new(Method::POST, "/orders?page=2".parse().unwrap())
            .with_header("content-type", "application/json")
            .with_header("x-trace", "a")
            .with_header("x-trace", "b")
            .with_remote_addr(addr)
            .with_body("{}");

        let request = marshal_request(&raw).unwrap();

        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.uri().query(), Some("page=2"));
        assert_eq!(request.headers().get_all("x-trace").iter().count(), 2);
        assert_eq!(request.body().as_ref(), b"{}");
        assert_eq!(request.extensions().get::<RemoteAddr>(), Some(&RemoteAddr(addr)));
    }

    #[test]
    fn test_error_response_is_bad_request() {
        let error = anyhow::anyhow!("malformed cookie header");
        let response = error_response(&error);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(response.body()).contains("malformed cookie header"));
    }
}
