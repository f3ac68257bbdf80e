//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock supervisor injected, so conversions can be exercised without
//! ffmpeg, pandoc or xelatex installed.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use filemorph_core::{
    testing::MockSupervisor, Config, ConversionOrchestrator, FormatRegistry, JobScheduler,
    WorkspaceManager,
};
use filemorph_server::state::{AppState, SharedSupervisor};

/// Re-export fixtures for test convenience
pub use filemorph_core::testing::fixtures;

const BOUNDARY: &str = "filemorph-test-boundary";

/// Test fixture for API testing with a mock supervisor.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_conversion() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .upload(&[Part::file("notes.md", b"# hi"), Part::text("target", "pdf")])
///         .await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock supervisor - control what the "tool" does
    pub supervisor: MockSupervisor,
    /// Scratch root manager, for checking cleanup
    pub workspaces: WorkspaceManager,
    /// Temporary directory holding the scratch root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

/// One multipart form field.
pub struct Part {
    name: String,
    file_name: Option<String>,
    data: Vec<u8>,
}

impl Part {
    pub fn file(file_name: &str, data: &[u8]) -> Self {
        Self {
            name: "file".to_string(),
            file_name: Some(file_name.to_string()),
            data: data.to_vec(),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            file_name: None,
            data: value.as_bytes().to_vec(),
        }
    }
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match &part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Builds a multipart request for the conversions endpoint.
pub fn upload_request(caller: Option<&str>, parts: &[Part]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/conversions")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(caller) = caller {
        builder = builder.header("x-caller-id", caller);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.server.max_upload_bytes = test_config.max_upload_bytes;
        config.scratch.root = temp_dir.path().join("scratch");
        config.scheduler.max_concurrent_jobs = test_config.max_concurrent_jobs;

        let (workspaces, _) = WorkspaceManager::init(config.scratch.root.clone(), true)
            .await
            .expect("Failed to init scratch root");

        let supervisor = MockSupervisor::new();
        let shared: SharedSupervisor = Arc::new(supervisor.clone());
        let orchestrator = ConversionOrchestrator::new(
            Arc::new(FormatRegistry::from_config(&config).expect("Failed to build registry")),
            JobScheduler::new(&config.scheduler),
            workspaces.clone(),
            shared,
        );

        let state = Arc::new(AppState::new(config, orchestrator));
        let router = filemorph_server::api::create_router(state);

        Self {
            router,
            supervisor,
            workspaces,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("GET").uri(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Send a multipart upload to the conversions endpoint.
    pub async fn upload(&self, parts: &[Part]) -> TestResponse {
        self.upload_as(None, parts).await
    }

    /// Send a multipart upload with an `x-caller-id` header.
    pub async fn upload_as(&self, caller: Option<&str>, parts: &[Part]) -> TestResponse {
        self.send(upload_request(caller, parts)).await
    }

    /// Send a request to the test server.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }

    /// Entries under the scratch root that look like job workspaces.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.workspaces.root())
            .expect("Failed to list scratch root")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("job-"))
            .count()
    }

    /// Files waiting in the outbox.
    pub fn outbox_files(&self) -> usize {
        std::fs::read_dir(self.workspaces.outbox())
            .expect("Failed to list outbox")
            .count()
    }
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Execution slots
    pub max_concurrent_jobs: usize,
    /// Upload limit in bytes
    pub max_upload_bytes: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_upload_bytes: 1024 * 1024,
        }
    }
}
