//! HTTP handler trait and error types.
//!
//! Handlers receive a fully-buffered request and either produce a response or
//! fail with a [`HandlerError`]. A status-carrying error is translated into a
//! response with that exact status and message; anything else becomes a
//! `500 Internal Server Error`.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use thiserror::Error;

/// An HTTP request with its body fully buffered.
pub type HttpRequest = Request<Bytes>;

/// An HTTP response with a complete in-memory body.
pub type HttpResponse = Response<Full<Bytes>>;

/// Future returned by a boxed HTTP handler invocation.
pub type HttpHandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, HandlerError>> + Send>>;

/// Error produced by an HTTP handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A failure the handler maps to a specific HTTP status.
    ///
    /// The status and message are sent to the client verbatim.
    #[error("{status}: {message}")]
    Status {
        /// Status code to send to the client.
        status: StatusCode,
        /// Message for the response body.
        message: String,
    },

    /// Any other handler failure. Reported to the client as a 500.
    #[error("unhandled error: {0}")]
    Unhandled(String),
}

impl HandlerError {
    /// Create a status-carrying error.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a `404 Not Found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    /// Create a `400 Bad Request` error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    /// Create an unhandled error.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled(message.into())
    }

    /// Get the HTTP status this error translates to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handler bound to an HTTP route.
///
/// Implemented for any `Fn(HttpRequest) -> impl Future<Output =
/// Result<HttpResponse, HandlerError>>` closure, so routes are usually
/// registered with async closures rather than named types.
pub trait HttpHandler: Send + Sync {
    /// Handle one buffered request.
    fn handle(&self, request: HttpRequest) -> HttpHandlerFuture;
}

impl<F, Fut> HttpHandler for F
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, HandlerError>> + Send + 'static,
{
    fn handle(&self, request: HttpRequest) -> HttpHandlerFuture {
        Box::pin(self(request))
    }
}
