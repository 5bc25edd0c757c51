//! HTTP and WebSocket server.
//!
//! The server owns a [`Router`] and a [`SessionRegistry`]. Each accepted
//! connection runs an HTTP/1.1 protocol loop; requests are buffered, routed,
//! and dispatched to handlers, and WebSocket upgrades hand the transport over
//! to a [`Session`] driven by the bound handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use http::{Method, Response, StatusCode};
//! use http_body_util::Full;
//! use bytes::Bytes;
//! use wicket_server::{Server, ServerConfig};
//! use wicket_router::{HandlerError, HttpRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::builder().addr("0.0.0.0:8080").build());
//!     server.add_http_handler(Method::GET, "/hello", |_req: HttpRequest| async {
//!         Response::builder()
//!             .status(StatusCode::OK)
//!             .body(Full::new(Bytes::from_static(b"hello")))
//!             .map_err(|e| HandlerError::unhandled(e.to_string()))
//!     })?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info, warn};

use wicket_router::{Handler, HandlerError, HttpHandler, HttpRequest, HttpResponse, PatternError, Router};
use wicket_ws::{
    complete_upgrade, is_upgrade_request, upgrade_response, Session, SessionRegistry, WsHandler,
};

use crate::config::ServerConfig;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::static_files::StaticFiles;

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the configured address.
    #[error("bind error: {0}")]
    Bind(String),

    /// I/O error during server operation.
    #[error("I/O error: {0}")]
    Io(String),
}

/// The Wicket HTTP and WebSocket server.
///
/// Routes are registered before the server starts; once running, each
/// connection is served on the shared runtime until the peer disconnects or
/// shutdown is triggered.
pub struct Server {
    /// Server configuration.
    config: ServerConfig,

    /// Route registry.
    router: Router,

    /// Open WebSocket sessions.
    sessions: Arc<SessionRegistry>,
}

impl Server {
    /// Create a server with the given configuration and no routes.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the route registry.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get a handle to the WebSocket session registry.
    ///
    /// The handle stays valid after the server starts, so the host can
    /// enumerate or broadcast to open sessions at any time.
    #[must_use]
    pub fn ws_sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Register an HTTP handler.
    ///
    /// The pattern is an anchored regex matched against the request path;
    /// routes resolve first-match in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern is not a valid regex.
    pub fn add_http_handler(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl HttpHandler + 'static,
    ) -> Result<(), PatternError> {
        self.router.add_http(method, pattern, handler)
    }

    /// Register a WebSocket handler. The route is bound under `GET`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern is not a valid regex.
    pub fn add_ws_handler(
        &mut self,
        pattern: &str,
        handler: impl WsHandler + 'static,
    ) -> Result<(), PatternError> {
        self.router.add_ws(pattern, handler)
    }

    /// Mount a static file handler under a path prefix.
    ///
    /// `GET {base}` and everything below it serve files from the handler's
    /// root directory, with the prefix stripped.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the resulting pattern is not a valid
    /// regex, which can happen when `base` contains regex metacharacters.
    pub fn serve_files(&mut self, base: &str, files: StaticFiles) -> Result<(), PatternError> {
        let base = base.trim_end_matches('/').to_string();
        let pattern = format!("{base}(/.*)?");
        let prefix = base.clone();

        self.router.add_http(Method::GET, &pattern, move |req: HttpRequest| {
            let files = files.clone();
            let prefix = prefix.clone();
            async move {
                let relative = req.uri().path().strip_prefix(&prefix).unwrap_or("/");
                let relative = if relative.is_empty() { "/" } else { relative };
                files
                    .serve(relative)
                    .await
                    .map_err(|e| HandlerError::status(e.status_code(), e.to_string()))
            }
        })
    }

    /// Run the server until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the configured address.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Run the server until the given shutdown signal triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to the configured address.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("invalid address '{}': {}", self.config.addr(), e))
        })?;
        let listener = Self::bind(addr)?;
        self.serve(listener, shutdown).await
    }

    /// Run the server on a current-thread runtime, blocking the calling
    /// thread until SIGTERM or SIGINT.
    ///
    /// For single-threaded embedding; connection tasks share the calling
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created or the server cannot
    /// bind.
    pub fn run_blocking(self) -> Result<(), ServerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ServerError::Io(e.to_string()))?;
        runtime.block_on(self.run())
    }

    /// Start the server on an owned runtime with `workers` worker threads.
    ///
    /// Returns once the listener is bound; the accept loop keeps running on
    /// the runtime's threads until [`ServerHandle::stop`] is called or the
    /// handle is dropped. Intended for synchronous host applications; must
    /// not be called from inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created or the server cannot
    /// bind to the configured address.
    pub fn start(self, workers: usize) -> Result<ServerHandle, ServerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .enable_all()
            .build()
            .map_err(|e| ServerError::Io(e.to_string()))?;

        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("invalid address '{}': {}", self.config.addr(), e))
        })?;
        let listener = {
            let _guard = runtime.enter();
            Self::bind(addr)?
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))?;

        let shutdown = ShutdownSignal::new();
        let sessions = Arc::clone(&self.sessions);
        let shutdown_timeout = self.config.shutdown_timeout();
        let task = runtime.spawn(self.serve(listener, shutdown.clone()));

        Ok(ServerHandle {
            runtime: Some(runtime),
            task: Some(task),
            shutdown,
            sessions,
            local_addr,
            shutdown_timeout,
        })
    }

    /// Bind a listener with `SO_REUSEADDR` set.
    fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| ServerError::Io(e.to_string()))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| ServerError::Io(e.to_string()))?;
        socket
            .bind(addr)
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::Bind(format!("failed to listen on {addr}: {e}")))
    }

    /// Accept connections until the shutdown signal triggers, then drain.
    async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!("server listening on {addr}");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, remote_addr, shutdown).await {
                                    debug!("connection from {remote_addr} ended with error: {e}");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            error!("failed to accept connection: {e}");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(
            "waiting up to {timeout:?} for {} connections to close",
            tracker.active_connections()
        );

        tokio::select! {
            _ = tracker.wait_for_drain() => {
                info!("all connections closed");
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    "shutdown timeout reached, {} connections still active",
                    tracker.active_connections()
                );
            }
        }

        Ok(())
    }

    /// Drive one connection's HTTP/1.1 protocol loop.
    ///
    /// The loop serves requests back-to-back on the same connection until the
    /// peer closes, sends `Connection: close`, or shutdown triggers. Upgrades
    /// are enabled so a successful 101 hands the transport to a session task.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req).await) }
        });

        let conn = http1::Builder::new()
            .serve_connection(io, service)
            .with_upgrades();

        tokio::select! {
            result = conn => result,
            _ = shutdown.recv() => {
                debug!("connection from {remote_addr} closed due to shutdown");
                Ok(())
            }
        }
    }

    /// Dispatch one request: upgrade, or buffer the body and route.
    async fn handle_request(self: &Arc<Self>, req: Request<Incoming>) -> HttpResponse {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!("{method} {path}");

        if is_upgrade_request(&req) {
            return self.handle_upgrade(req).await;
        }

        let (parts, body) = req.into_parts();
        let body = match collect_body(body, self.config.max_body_bytes()).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        self.route_request(Request::from_parts(parts, body)).await
    }

    /// Route a buffered request to its HTTP handler.
    ///
    /// A handler failure carrying a status is sent to the client verbatim;
    /// any other failure, including a panic, becomes a 500 whose envelope
    /// carries the failure's description.
    async fn route_request(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.router.resolve(&method, &path) {
            None => not_found_response(&path),
            Some(Handler::WebSocket(_)) => error_response(
                StatusCode::BAD_REQUEST,
                "UPGRADE_REQUIRED",
                "this route only accepts WebSocket upgrade requests",
            ),
            Some(Handler::Http(handler)) => {
                let handler = Arc::clone(handler);
                let outcome = AssertUnwindSafe(handler.handle(request)).catch_unwind().await;
                match outcome {
                    Ok(Ok(response)) => response,
                    Ok(Err(HandlerError::Status { status, message })) => {
                        debug!("handler error for {method} {path}: {status} {message}");
                        error_response(status, "HANDLER_ERROR", &message)
                    }
                    Ok(Err(HandlerError::Unhandled(message))) => {
                        error!("unhandled handler error for {method} {path}: {message}");
                        error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", &message)
                    }
                    Err(panic) => {
                        let message = panic_description(panic.as_ref());
                        error!("handler panicked for {method} {path}: {message}");
                        error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
                    }
                }
            }
        }
    }

    /// Answer a WebSocket upgrade request and spawn the session task.
    ///
    /// The 101 response goes back on the original connection; the session
    /// starts once hyper yields the upgraded transport.
    async fn handle_upgrade(self: &Arc<Self>, req: Request<Incoming>) -> HttpResponse {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let handler = match self.router.resolve(&method, &path) {
            None => return not_found_response(&path),
            Some(Handler::Http(_)) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "NOT_A_WEBSOCKET_ROUTE",
                    "this route does not accept WebSocket upgrade requests",
                );
            }
            Some(Handler::WebSocket(handler)) => Arc::clone(handler),
        };

        let response = match upgrade_response(&req) {
            Ok(response) => response,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, "BAD_UPGRADE", &e.to_string());
            }
        };

        let server = Arc::clone(self);
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let stream = complete_upgrade(TokioIo::new(upgraded)).await;
                    let mut session = Session::new(stream, path.clone());
                    debug!(session_id = %session.id(), path, "WebSocket session opened");

                    let registry = Arc::clone(&server.sessions);
                    session.on_close(move |id| {
                        registry.remove(id);
                        debug!(session_id = %id, "WebSocket session closed");
                    });

                    server.sessions.add(session.handle());
                    session.run(handler.as_ref()).await;
                }
                Err(e) => {
                    warn!("WebSocket upgrade for {path} failed: {e}");
                }
            }
        });

        response
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// Buffer a request body up to `limit` bytes.
///
/// Bodies over the cap produce a `413 Payload Too Large` response; any other
/// read failure produces a `400 Bad Request`.
async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes, HttpResponse>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "BODY_TOO_LARGE",
            &format!("request body exceeds the {limit} byte limit"),
        )),
        Err(e) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "BODY_READ_ERROR",
            &format!("failed to read request body: {e}"),
        )),
    }
}

/// Extract the human-readable payload from a caught panic.
fn panic_description(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "handler panicked"
    }
}

/// Build a JSON error envelope response.
fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message
        }
    });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Build the JSON 404 response, naming the unmatched path.
fn not_found_response(path: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Handle to a server started with [`Server::start`].
///
/// Owns the runtime the server runs on. [`stop`](Self::stop) triggers
/// graceful shutdown and joins the accept loop; dropping the handle does the
/// same.
pub struct ServerHandle {
    runtime: Option<tokio::runtime::Runtime>,
    task: Option<tokio::task::JoinHandle<Result<(), ServerError>>>,
    shutdown: ShutdownSignal,
    sessions: Arc<SessionRegistry>,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl ServerHandle {
    /// Get the address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a handle to the WebSocket session registry.
    #[must_use]
    pub fn ws_sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    /// Check whether the server is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.is_some() && !self.shutdown.is_shutdown()
    }

    /// Stop the server and wait for the accept loop to drain.
    ///
    /// Idempotent; blocks the calling thread until shutdown completes or the
    /// shutdown timeout elapses.
    pub fn stop(&mut self) {
        self.shutdown.trigger();

        if let (Some(runtime), Some(task)) = (self.runtime.take(), self.task.take()) {
            match runtime.block_on(task) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("server exited with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
            runtime.shutdown_timeout(self.shutdown_timeout);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
