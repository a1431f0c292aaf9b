//! Test helpers for runner service tests

use bytes::Bytes;
use http::{Response, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RunnerResult;
use crate::traits::{AccessLogger, RawRequest, ServerHandle, TickCallback};
use crate::types::StaticResourceResponse;

/// Server handle that records reloads and registered ticks
pub struct StubServer {
    pub master_pid: i32,
    pub manager_pid: i32,
    pub worker_num: u32,
    reloads: AtomicUsize,
    ticks: Mutex<Vec<(Duration, TickCallback)>>,
}

impl StubServer {
    pub fn new(worker_num: u32) -> Self {
        Self {
            master_pid: 0,
            manager_pid: 0,
            worker_num,
            reloads: AtomicUsize::new(0),
            ticks: Mutex::new(Vec::new()),
        }
    }

    pub fn running(master_pid: i32, manager_pid: i32) -> Self {
        Self {
            master_pid,
            manager_pid,
            ..Self::new(1)
        }
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn tick_intervals(&self) -> Vec<Duration> {
        self.ticks.lock().unwrap().iter().map(|(interval, _)| *interval).collect()
    }

    /// Run every registered tick callback once
    pub fn fire_ticks(&self) {
        let mut ticks = std::mem::take(&mut *self.ticks.lock().unwrap());
        for (_, callback) in ticks.iter_mut() {
            callback(self);
        }
        self.ticks.lock().unwrap().extend(ticks);
    }
}

impl ServerHandle for StubServer {
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
        8080
    }

    fn worker_num(&self) -> u32 {
        self.worker_num
    }

    fn reload(&self) -> RunnerResult<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tick(&self, interval: Duration, callback: TickCallback) -> RunnerResult<()> {
        self.ticks.lock().unwrap().push((interval, callback));
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

/// Access logger that keeps every call in memory
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
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
        self.records
            .lock()
            .unwrap()
            .push(LogRecord::Notice(crate::services::access_log::interpolate(message, context)));
    }
}
