//! Regex route registry for the Wicket server.
//!
//! Routes pair an HTTP method and an anchored regular expression with either
//! a plain HTTP handler or a WebSocket session handler. Resolution is
//! first-match in registration order: register specific patterns before
//! broad ones.
//!
//! # Example
//!
//! ```
//! use http::{Method, Response, StatusCode};
//! use http_body_util::Full;
//! use bytes::Bytes;
//! use wicket_router::{HandlerError, HttpRequest, Router};
//!
//! let mut router = Router::new();
//! router
//!     .add_http(Method::GET, "/hello/[a-z]+", |req: HttpRequest| async move {
//!         Response::builder()
//!             .status(StatusCode::OK)
//!             .body(Full::new(Bytes::from(format!("hello from {}", req.uri().path()))))
//!             .map_err(|e| HandlerError::unhandled(e.to_string()))
//!     })
//!     .unwrap();
//!
//! assert!(router.resolve(&Method::GET, "/hello/world").is_some());
//! assert!(router.resolve(&Method::GET, "/hello/42").is_none());
//! ```

#![doc(html_root_url = "https://docs.rs/wicket-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod handler;
pub mod router;

pub use handler::{HandlerError, HttpHandler, HttpHandlerFuture, HttpRequest, HttpResponse};
pub use router::{Handler, PatternError, Router};
