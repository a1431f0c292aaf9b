//! Writes application responses onto native response objects

use bytes::Bytes;
use http::Response;

use crate::error::{RunnerError, RunnerResult};
use crate::traits::RawResponse;

/// Bodies above this size are streamed in chunks of this size
pub const CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Response emitter bound to one native response
pub struct ResponseEmitter<'a> {
    target: &'a mut dyn RawResponse,
    chunk_size: usize,
}

impl<'a> ResponseEmitter<'a> {
    pub fn new(target: &'a mut dyn RawResponse) -> Self {
        Self {
            target,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunk size (fluent API)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Emit status line, every header value and the body
    pub fn emit(&mut self, response: &Response<Bytes>) -> RunnerResult<()> {
        self.target.set_status(response.status());

        for (name, value) in response.headers() {
            self.target.append_header(name, value);
        }

        let body = response.body();
        if body.len() <= self.chunk_size {
            return self
                .target
                .end(Some(body))
                .map_err(|e| RunnerError::emit(format!("failed to end response: {e}")));
        }

        for chunk in body.chunks(self.chunk_size) {
            self.target
                .write(chunk)
                .map_err(|e| RunnerError::emit(format!("failed to write body chunk: {e}")))?;
        }

        self.target
            .end(None)
            .map_err(|e| RunnerError::emit(format!("failed to end response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffered::BufferedResponse;
    use http::{header, StatusCode};

    #[test]
    fn test_emits_status_headers_and_body() {
        let response = Response::builder()
            .status(StatusCode::CREATED)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::SET_COOKIE, "a=1")
            .header(header::SET_COOKIE, "b=2")
            .body(Bytes::from_static(b"{\"ok\":true}"))
            .unwrap();

        let mut target = BufferedResponse::new();
        ResponseEmitter::new(&mut target).emit(&response).unwrap();

        assert_eq!(target.status(), StatusCode::CREATED);
        assert_eq!(target.headers().get_all(header::SET_COOKIE).iter().count(), 2);
        assert_eq!(target.body(), b"{\"ok\":true}");
        assert_eq!(target.chunks_written(), 1);
        assert!(target.is_ended());
    }

    #[test]
    fn test_large_body_is_chunked() {
        let body = Bytes::from(vec![b'x'; 10]);
        let response = Response::new(body);

        let mut target = BufferedResponse::new();
        ResponseEmitter::new(&mut target)
            .with_chunk_size(4)
            .emit(&response)
            .unwrap();

        assert_eq!(target.body().len(), 10);
        assert_eq!(target.chunks_written(), 3);
        assert!(target.is_ended());
    }

    #[test]
    fn test_emit_on_ended_response_fails() {
        let mut target = BufferedResponse::new();
        target.end(None).unwrap();

        let result = ResponseEmitter::new(&mut target).emit(&Response::new(Bytes::new()));
        assert!(matches!(result, Err(RunnerError::EmitFailed { .. })));
    }
}
