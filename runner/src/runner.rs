//! Request-handler runner
//!
//! Binds a native multi-process server's lifecycle callbacks to a single
//! synchronous application handler. The runner never drives the server; it
//! reacts to the six lifecycle events and keeps process-wide state (PID
//! record, process name, working directory, log role) correct in every
//! process the server forks.

use bytes::Bytes;
use http::Response;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared::{process_debug, process_info, process_warn, ProcessRole};

use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::events::WorkerDispatcher;
use crate::services::{
    default_error_response_factory, default_request_factory, FilePidStore, OsProcessTitle,
    Reloader, ResponseEmitter, TracingAccessLogger,
};
use crate::traits::{
    AccessLogger, ErrorResponseFactory, HotCodeReloader, NativeServer, PidStore, ProcessTitle, RawRequest,
    RawResponse, RequestFactory, RequestHandler, ServerHandle, StaticResourceHandler, WorkerListenerProvider,
};
use crate::types::{ProcessNamingPolicy, RequestOutcome, ServerCallbacks, WorkerEvent, WorkerIdentity};

/// Sole owner of the native server for the lifetime of the process
pub struct RequestHandlerRunner<S: NativeServer> {
    server: S,
    inner: Arc<RunnerInner>,
}

/// Collaborators shared by every registered callback
struct RunnerInner {
    handler: Arc<dyn RequestHandler>,
    request_factory: RequestFactory,
    error_response_factory: ErrorResponseFactory,
    pid_store: Arc<dyn PidStore>,
    static_handler: Option<Arc<dyn StaticResourceHandler>>,
    logger: Arc<dyn AccessLogger>,
    naming: ProcessNamingPolicy,
    reloader: Option<Arc<dyn HotCodeReloader>>,
    dispatcher: Option<WorkerDispatcher>,
    process_title: Arc<dyn ProcessTitle>,
    working_directory: PathBuf,
}

impl<S: NativeServer> RequestHandlerRunner<S> {
    /// Start building a runner around a server that has not started yet
    pub fn builder(server: S, handler: Arc<dyn RequestHandler>) -> RunnerBuilder<S> {
        RunnerBuilder::new(server, handler)
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Working directory restored at every lifecycle entry point
    pub fn working_directory(&self) -> &Path {
        &self.inner.working_directory
    }

    pub fn naming_policy(&self) -> &ProcessNamingPolicy {
        &self.inner.naming
    }

    /// Bind the six lifecycle callbacks and block until the server stops
    pub fn run(mut self) -> RunnerResult<()> {
        let callbacks = RunnerInner::callbacks::<S>(&self.inner);
        self.server.on(callbacks);

        process_debug!(
            ProcessRole::current(),
            "Starting native server on {}:{}",
            self.server.host(),
            self.server.port()
        );
        self.server.start()
    }

    pub fn on_start(&self, server: &dyn ServerHandle) -> RunnerResult<()> {
        self.inner.on_start(server)
    }

    pub fn on_worker_start(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        self.inner.on_worker_start(server, worker_id)
    }

    pub fn on_worker_stop(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        self.inner.on_worker_stop(server, worker_id)
    }

    pub fn on_worker_error(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        self.inner.on_worker_error(server, worker_id)
    }

    /// Serve one request
    ///
    /// Request-construction failures are answered with an error response and
    /// never returned. Application handler and emission failures are.
    pub fn on_request(
        &self,
        request: &dyn RawRequest,
        response: &mut dyn RawResponse,
    ) -> RunnerResult<RequestOutcome> {
        self.inner.on_request(request, response)
    }

    pub fn on_shutdown(&self, server: &dyn ServerHandle) -> RunnerResult<()> {
        self.inner.on_shutdown(server)
    }
}

impl RunnerInner {
    fn callbacks<S: NativeServer>(inner: &Arc<Self>) -> ServerCallbacks<S> {
        let start = Arc::clone(inner);
        let worker_start = Arc::clone(inner);
        let worker_stop = Arc::clone(inner);
        let worker_error = Arc::clone(inner);
        let request = Arc::clone(inner);
        let shutdown = Arc::clone(inner);

        ServerCallbacks {
            start: Arc::new(move |server: &S| start.on_start(server)),
            worker_start: Arc::new(move |server: &S, worker_id| worker_start.on_worker_start(server, worker_id)),
            worker_stop: Arc::new(move |server: &S, worker_id| worker_stop.on_worker_stop(server, worker_id)),
            worker_error: Arc::new(move |server: &S, worker_id| worker_error.on_worker_error(server, worker_id)),
            request: Arc::new(move |raw_request: &S::Request, raw_response: &mut S::Response| {
                request.on_request(raw_request, raw_response).map(|_| ())
            }),
            shutdown: Arc::new(move |server: &S| shutdown.on_shutdown(server)),
        }
    }

    fn on_start(&self, server: &dyn ServerHandle) -> RunnerResult<()> {
        ProcessRole::Master.set_current();

        self.pid_store.write(server.master_pid(), server.manager_pid())?;
        self.restore_working_directory();
        self.process_title.set(&self.naming.master());

        self.logger.notice(
            "Server listening on {host}:{port} from {cwd}",
            &[
                ("host", server.host().to_string()),
                ("port", server.port().to_string()),
                ("cwd", self.current_directory()),
            ],
        );
        Ok(())
    }

    fn on_worker_start(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        let worker = WorkerIdentity::new(worker_id, server.worker_num());
        worker.role().set_current();

        self.restore_working_directory();
        self.process_title.set(&self.naming.worker(&worker));

        if let Some(reloader) = &self.reloader {
            reloader.on_worker_start(server, worker_id)?;
        }

        self.logger.notice(
            "Worker {worker_id} started in {cwd}",
            &[
                ("worker_id", worker_id.to_string()),
                ("cwd", self.current_directory()),
            ],
        );

        self.dispatch(&WorkerEvent::started(server, worker))
    }

    fn on_worker_stop(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        let worker = WorkerIdentity::new(worker_id, server.worker_num());
        worker.role().set_current();

        process_debug!(worker.role(), "Worker {} stopping", worker_id);
        self.dispatch(&WorkerEvent::stopped(server, worker))
    }

    fn on_worker_error(&self, server: &dyn ServerHandle, worker_id: u32) -> RunnerResult<()> {
        let worker = WorkerIdentity::new(worker_id, server.worker_num());

        // Reported by the manager about a worker that already died
        process_warn!(ProcessRole::current(), "Worker {} exited abnormally", worker_id);
        self.dispatch(&WorkerEvent::errored(server, worker))
    }

    fn on_request(&self, request: &dyn RawRequest, response: &mut dyn RawResponse) -> RunnerResult<RequestOutcome> {
        if let Some(static_handler) = &self.static_handler {
            if let Some(outcome) = static_handler.process_static_resource(request, &mut *response) {
                self.logger.log_access_for_static_resource(request, &outcome);
                return Ok(RequestOutcome::StaticallyServed(outcome));
            }
        }

        let application_request = match (self.request_factory)(request) {
            Ok(application_request) => application_request,
            Err(error) => {
                let error_response = (self.error_response_factory)(&error);
                self.emit_error_response(request, response, &error_response, &error);
                return Ok(RequestOutcome::RequestConstructionFailed {
                    error,
                    response: error_response,
                });
            }
        };

        let application_response = self
            .handler
            .handle(application_request)
            .map_err(RunnerError::HandlerFailed)?;

        ResponseEmitter::new(&mut *response).emit(&application_response)?;
        self.logger.log_access_for_response(request, &application_response);

        Ok(RequestOutcome::ApplicationHandled(application_response))
    }

    fn on_shutdown(&self, _server: &dyn ServerHandle) -> RunnerResult<()> {
        ProcessRole::Master.set_current();

        self.pid_store.delete()?;
        self.logger.notice("Server terminated", &[]);
        Ok(())
    }

    fn emit_error_response(
        &self,
        request: &dyn RawRequest,
        response: &mut dyn RawResponse,
        error_response: &Response<Bytes>,
        error: &anyhow::Error,
    ) {
        process_debug!(ProcessRole::current(), "Request construction failed: {:#}", error);

        if let Err(e) = ResponseEmitter::new(response).emit(error_response) {
            process_warn!(ProcessRole::current(), "Failed to emit error response: {}", e);
        }
        self.logger.log_access_for_response(request, error_response);
    }

    fn dispatch(&self, event: &WorkerEvent<'_>) -> RunnerResult<()> {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(event),
            None => Ok(()),
        }
    }

    /// Directory the process actually runs in, falling back to the configured one
    fn current_directory(&self) -> String {
        std::env::current_dir()
            .unwrap_or_else(|_| self.working_directory.clone())
            .display()
            .to_string()
    }

    fn restore_working_directory(&self) {
        if let Err(e) = std::env::set_current_dir(&self.working_directory) {
            process_warn!(
                ProcessRole::current(),
                "Failed to restore working directory {}: {}",
                self.working_directory.display(),
                e
            );
        }
    }
}

/// Collects the runner's collaborators and enforces the construction invariant
pub struct RunnerBuilder<S: NativeServer> {
    server: S,
    handler: Arc<dyn RequestHandler>,
    request_factory: RequestFactory,
    error_response_factory: ErrorResponseFactory,
    pid_store: Arc<dyn PidStore>,
    static_handler: Option<Arc<dyn StaticResourceHandler>>,
    logger: Option<Arc<dyn AccessLogger>>,
    naming: ProcessNamingPolicy,
    reloader: Option<Arc<dyn HotCodeReloader>>,
    listener_provider: Option<Arc<dyn WorkerListenerProvider>>,
    process_title: Arc<dyn ProcessTitle>,
    working_directory: Option<PathBuf>,
}

impl<S: NativeServer> RunnerBuilder<S> {
    pub fn new(server: S, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            server,
            handler,
            request_factory: default_request_factory(),
            error_response_factory: default_error_response_factory(),
            pid_store: Arc::new(FilePidStore::default()),
            static_handler: None,
            logger: None,
            naming: ProcessNamingPolicy::new("runner"),
            reloader: None,
            listener_provider: None,
            process_title: Arc::new(OsProcessTitle::new()),
            working_directory: None,
        }
    }

    pub fn request_factory(mut self, factory: RequestFactory) -> Self {
        self.request_factory = factory;
        self
    }

    pub fn error_response_factory(mut self, factory: ErrorResponseFactory) -> Self {
        self.error_response_factory = factory;
        self
    }

    pub fn pid_store(mut self, pid_store: Arc<dyn PidStore>) -> Self {
        self.pid_store = pid_store;
        self
    }

    pub fn static_handler(mut self, handler: Arc<dyn StaticResourceHandler>) -> Self {
        self.static_handler = Some(handler);
        self
    }

    /// Defaults to a [`TracingAccessLogger`] with the common format
    pub fn logger(mut self, logger: Arc<dyn AccessLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn process_name<P: Into<String>>(mut self, prefix: P) -> Self {
        self.naming = ProcessNamingPolicy::new(prefix);
        self
    }

    pub fn hot_code_reloader(mut self, reloader: Arc<dyn HotCodeReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Worker events are only dispatched when a provider is set
    pub fn listener_provider(mut self, provider: Arc<dyn WorkerListenerProvider>) -> Self {
        self.listener_provider = Some(provider);
        self
    }

    pub fn process_title(mut self, process_title: Arc<dyn ProcessTitle>) -> Self {
        self.process_title = process_title;
        self
    }

    /// Defaults to the current directory at build time
    pub fn working_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Apply the file/env configuration: naming, PID file, access log
    /// format, static files and hot code reload
    pub fn config(mut self, config: &RunnerConfig) -> RunnerResult<Self> {
        let logger: Arc<dyn AccessLogger> = Arc::new(config.access_logger());

        self.naming = config.naming_policy();
        self.pid_store = Arc::new(config.pid_store());
        self.logger = Some(Arc::clone(&logger));

        if let Some(handler) = config.static_handler() {
            self.static_handler = Some(Arc::new(handler));
        }

        if config.hot_code_reload.enable {
            let (existing, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
                config.hot_code_reload.paths.iter().partition(|path| path.exists());
            for path in missing {
                process_warn!(
                    ProcessRole::current(),
                    "Hot code reload path {} does not exist, skipping",
                    path.display()
                );
            }
            let reloader = Reloader::with_notify(logger)
                .with_interval(config.reload_interval())
                .with_paths(&existing);
            self.reloader = Some(Arc::new(reloader));
        }

        Ok(self)
    }

    /// Fails when the server already reports a master or manager process
    pub fn build(self) -> RunnerResult<RequestHandlerRunner<S>> {
        let master_pid = self.server.master_pid();
        let manager_pid = self.server.manager_pid();
        if master_pid > 0 || manager_pid > 0 {
            return Err(RunnerError::ServerAlreadyStarted { master_pid, manager_pid });
        }

        let working_directory = match self.working_directory {
            Some(path) => path,
            None => std::env::current_dir()?,
        };

        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingAccessLogger::default()));

        process_info!(
            ProcessRole::current(),
            "Runner configured for {}:{} (process name {})",
            self.server.host(),
            self.server.port(),
            self.naming.prefix()
        );

        Ok(RequestHandlerRunner {
            server: self.server,
            inner: Arc::new(RunnerInner {
                handler: self.handler,
                request_factory: self.request_factory,
                error_response_factory: self.error_response_factory,
                pid_store: self.pid_store,
                static_handler: self.static_handler,
                logger,
                naming: self.naming,
                reloader: self.reloader,
                dispatcher: self.listener_provider.map(WorkerDispatcher::new),
                process_title: self.process_title,
                working_directory,
            }),
        })
    }
}
