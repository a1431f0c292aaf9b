//! Shared fixtures for runner integration tests
#![allow(dead_code)]

use bytes::Bytes;
use http::{Response, StatusCode};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runner::{
    AccessLogger, BufferedRequest, BufferedResponse, MockProcessTitle, NativeServer, RawRequest, RunnerError,
    RunnerResult, ServerCallbacks, ServerHandle, StaticResourceResponse, TickCallback,
};

pub const MASTER_PID: i32 = 4242;
pub const MANAGER_PID: i32 = 4243;

/// What the fake server observed while the runner drove it
#[derive(Default)]
pub struct Observations {
    pub registrations: usize,
    pub starts: usize,
    pub responses: Vec<BufferedResponse>,
    pub faults: Vec<String>,
    pub reloads: usize,
    pub ticks: Vec<Duration>,
}

/// Single-process stand-in for the native server
///
/// `start` plays a scripted lifecycle: master start, every worker start,
/// the queued requests on worker 0, every worker stop, shutdown.
pub struct FakeServer {
    pub master_pid: i32,
    pub manager_pid: i32,
    pub worker_num: u32,
    pub task_worker_num: u32,
    requests: Vec<BufferedRequest>,
    callbacks: Option<ServerCallbacks<FakeServer>>,
    observations: Arc<Mutex<Observations>>,
}

impl FakeServer {
    pub fn new(worker_num: u32) -> Self {
        Self {
            master_pid: 0,
            manager_pid: 0,
            worker_num,
            task_worker_num: 0,
            requests: Vec::new(),
            callbacks: None,
            observations: Arc::new(Mutex::new(Observations::default())),
        }
    }

    /// A server that reports live master/manager processes
    pub fn already_started() -> Self {
        Self {
            master_pid: MASTER_PID,
            manager_pid: MANAGER_PID,
            ..Self::new(1)
        }
    }

    pub fn with_task_workers(mut self, task_worker_num: u32) -> Self {
        self.task_worker_num = task_worker_num;
        self
    }

    pub fn with_request(mut self, request: BufferedRequest) -> Self {
        self.requests.push(request);
        self
    }

    /// Shared view that outlives the server once the runner consumes it
    pub fn observations(&self) -> Arc<Mutex<Observations>> {
        Arc::clone(&self.observations)
    }

    fn record_fault(&self, event: &str, result: RunnerResult<()>) {
        if let Err(e) = result {
            self.observations.lock().unwrap().faults.push(format!("{event}: {e}"));
        }
    }
}

impl ServerHandle for FakeServer {
    fn master_pid(&self) -> i32 {
        self.master_pid
    }

    fn manager_pid(&self) -> i32 {
        self.manager_pid
    }

    fn host(&self) -> &str {
        "127.0.0.1"
    }

    fn port(&self) -> u16 {
        9501
    }

    fn worker_num(&self) -> u32 {
        self.worker_num
    }

    fn reload(&self) -> RunnerResult<()> {
        self.observations.lock().unwrap().reloads += 1;
        Ok(())
    }

    fn tick(&self, interval: Duration, _callback: TickCallback) -> RunnerResult<()> {
        self.observations.lock().unwrap().ticks.push(interval);
        Ok(())
    }
}

impl NativeServer for FakeServer {
    type Request = BufferedRequest;
    type Response = BufferedResponse;

    fn on(&mut self, callbacks: ServerCallbacks<Self>) {
        self.observations.lock().unwrap().registrations += 1;
        self.callbacks = Some(callbacks);
    }

    fn start(&mut self) -> RunnerResult<()> {
        let callbacks = self
            .callbacks
            .clone()
            .ok_or_else(|| RunnerError::server("no callbacks registered"))?;
        self.observations.lock().unwrap().starts += 1;

        self.master_pid = MASTER_PID;
        self.manager_pid = MANAGER_PID;
        let worker_ids: Vec<u32> = (0..self.worker_num + self.task_worker_num).collect();

        self.record_fault("start", (callbacks.start)(self));
        for &worker_id in &worker_ids {
            self.record_fault("workerstart", (callbacks.worker_start)(self, worker_id));
        }

        for request in std::mem::take(&mut self.requests) {
            let mut response = BufferedResponse::new();
            self.record_fault("request", (callbacks.request)(&request, &mut response));
            self.observations.lock().unwrap().responses.push(response);
        }

        for &worker_id in &worker_ids {
            self.record_fault("workerstop", (callbacks.worker_stop)(self, worker_id));
        }
        self.record_fault("shutdown", (callbacks.shutdown)(self));

        self.master_pid = 0;
        self.manager_pid = 0;
        Ok(())
    }
}

/// One call received by [`RecordingLogger`]
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Static { path: String, status: StatusCode },
    Response { path: String, status: StatusCode },
    Notice(String),
}

#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn access_records(&self) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| !matches!(record, LogRecord::Notice(_)))
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Notice(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl AccessLogger for RecordingLogger {
    fn log_access_for_static_resource(&self, request: &dyn RawRequest, response: &StaticResourceResponse) {
        self.records.lock().unwrap().push(LogRecord::Static {
            path: request.uri().path().to_string(),
            status: response.status,
        });
    }

    fn log_access_for_response(&self, request: &dyn RawRequest, response: &Response<Bytes>) {
        self.records.lock().unwrap().push(LogRecord::Response {
            path: request.uri().path().to_string(),
            status: response.status(),
        });
    }

    fn notice(&self, message: &str, context: &[(&str, String)]) {
        let message = runner::services::access_log::interpolate(message, context);
        self.records.lock().unwrap().push(LogRecord::Notice(message));
    }
}

/// Process title that accepts any name
pub fn permissive_title() -> Arc<MockProcessTitle> {
    let mut title = MockProcessTitle::new();
    title.expect_set().returning(|_| ());
    Arc::new(title)
}

/// Process title that records every name it was given
pub fn recording_title() -> (Arc<MockProcessTitle>, Arc<Mutex<Vec<String>>>) {
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    let mut title = MockProcessTitle::new();
    title
        .expect_set()
        .returning(move |name| sink.lock().unwrap().push(name.to_string()));
    (Arc::new(title), names)
}

/// The crate directory, which is also the test binary's working directory
pub fn crate_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn json_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    response
}
