//! Tests for the FileSystemStaticHandler service

use http::{header, Method, StatusCode, Uri};
use std::fs;
use tempfile::TempDir;

use crate::buffered::{BufferedRequest, BufferedResponse};
use crate::services::FileSystemStaticHandler;
use crate::traits::StaticResourceHandler;

fn create_document_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();
    fs::write(dir.path().join("render.cgi"), "#!/bin/sh").unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs").join("index.html"), "<h1>docs</h1>").unwrap();
    dir
}

fn request(method: Method, path: &str) -> BufferedRequest {
    BufferedRequest::new(method, path.parse::<Uri>().unwrap())
}

mod file_system_static_handler_tests {
    use super::*;

    #[test]
    fn test_serves_known_extension() {
        // Arrange
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        // Act
        let outcome = handler
            .process_static_resource(&BufferedRequest::get("/style.css"), &mut response)
            .expect("css should be served");

        // Assert
        assert_eq!(outcome.status, StatusCode::OK);
        assert!(outcome.send_content);
        assert_eq!(outcome.body_size(), 20);
        assert!(response.is_ended());
        assert_eq!(response.body(), b"body { color: red; }");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
        assert!(response.headers().contains_key(header::ETAG));
        assert!(response.headers().contains_key(header::LAST_MODIFIED));
    }

    #[test]
    fn test_unknown_extension_falls_through() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler.process_static_resource(&BufferedRequest::get("/render.cgi"), &mut response);

        assert!(outcome.is_none());
        assert!(!response.is_ended());
    }

    #[test]
    fn test_missing_file_falls_through() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler.process_static_resource(&BufferedRequest::get("/missing.css"), &mut response);

        assert!(outcome.is_none());
        assert!(!response.is_ended());
    }

    #[test]
    fn test_directory_serves_index() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler
            .process_static_resource(&BufferedRequest::get("/docs/"), &mut response)
            .expect("directory index should be served");

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(response.body(), b"<h1>docs</h1>");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn test_rejects_directory_traversal() {
        // Arrange
        let outer = TempDir::new().unwrap();
        let public = outer.path().join("public");
        fs::create_dir(&public).unwrap();
        fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        let handler = FileSystemStaticHandler::new(&public);
        let mut response = BufferedResponse::new();

        // Act
        let outcome = handler.process_static_resource(&BufferedRequest::get("/../secret.txt"), &mut response);

        // Assert
        assert!(outcome.is_none());
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_second_document_root_is_searched() {
        let first = TempDir::new().unwrap();
        let second = create_document_root();
        let handler =
            FileSystemStaticHandler::with_document_roots(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        let mut response = BufferedResponse::new();

        let outcome = handler.process_static_resource(&BufferedRequest::get("/style.css"), &mut response);

        assert!(outcome.is_some());
    }

    #[test]
    fn test_head_sends_no_body() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler
            .process_static_resource(&request(Method::HEAD, "/style.css"), &mut response)
            .unwrap();

        assert_eq!(outcome.status, StatusCode::OK);
        assert!(!outcome.send_content);
        assert_eq!(outcome.body_size(), 0);
        assert!(response.body().is_empty());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "20");
    }

    #[test]
    fn test_options_answers_allow() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler
            .process_static_resource(&request(Method::OPTIONS, "/style.css"), &mut response)
            .unwrap();

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD, OPTIONS");
    }

    #[test]
    fn test_other_methods_are_not_allowed() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler
            .process_static_resource(&request(Method::POST, "/style.css"), &mut response)
            .unwrap();

        assert_eq!(outcome.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_matching_etag_is_not_modified() {
        // Arrange
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut first = BufferedResponse::new();
        handler
            .process_static_resource(&BufferedRequest::get("/style.css"), &mut first)
            .unwrap();
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        // Act
        let mut second = BufferedResponse::new();
        let outcome = handler
            .process_static_resource(
                &BufferedRequest::get("/style.css").with_header("if-none-match", &etag),
                &mut second,
            )
            .unwrap();

        // Assert
        assert_eq!(outcome.status, StatusCode::NOT_MODIFIED);
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert!(second.body().is_empty());
    }

    #[test]
    fn test_if_modified_since_in_future_is_not_modified() {
        let root = create_document_root();
        let handler = FileSystemStaticHandler::new(root.path());
        let mut response = BufferedResponse::new();

        let outcome = handler
            .process_static_resource(
                &BufferedRequest::get("/style.css").with_header("if-modified-since", "Fri, 01 Jan 2100 00:00:00 GMT"),
                &mut response,
            )
            .unwrap();

        assert_eq!(outcome.status, StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn test_custom_mime_type() {
        let root = create_document_root();
        fs::write(root.path().join("data.csv"), "a,b").unwrap();
        let handler = FileSystemStaticHandler::new(root.path()).with_mime_type(".csv", "text/csv");
        let mut response = BufferedResponse::new();

        let outcome = handler.process_static_resource(&BufferedRequest::get("/data.csv"), &mut response);

        assert!(outcome.is_some());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    }
}
