//! # Wicket
//!
//! **Embeddable HTTP and WebSocket server**
//!
//! Wicket is a small server library for applications that want to expose an
//! HTTP API and live WebSocket sessions without running a standalone server
//! process:
//!
//! - **Regex routing** – routes resolve first-match in registration order
//! - **WebSocket sessions** – handler-owned sessions with close callbacks and
//!   a registry for host-side broadcast
//! - **Graceful shutdown** – in-flight connections drain before exit
//! - **Owned runtime** – `start(n)` runs the server on its own worker threads
//!   so synchronous hosts can embed it
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wicket::prelude::*;
//! use http::{Method, Response, StatusCode};
//! use http_body_util::Full;
//! use bytes::Bytes;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::builder().addr("0.0.0.0:8080").build());
//!
//!     server.add_http_handler(Method::GET, "/hello", |_req: HttpRequest| async {
//!         Response::builder()
//!             .status(StatusCode::OK)
//!             .body(Full::new(Bytes::from_static(b"hello")))
//!             .map_err(|e| HandlerError::unhandled(e.to_string()))
//!     })?;
//!
//!     server.add_ws_handler("/ws/echo", |mut session: Session| async move {
//!         while let Some(Ok(msg)) = session.recv().await {
//!             if msg.is_text() {
//!                 let _ = session.send(msg).await;
//!             }
//!         }
//!     })?;
//!
//!     let mut handle = server.start(4)?;
//!     // ... the host application does its own work ...
//!     handle.stop();
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/wicket/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export router types
pub use wicket_router as router;

// Re-export server types
pub use wicket_server as server;

// Re-export WebSocket types
pub use wicket_ws as ws;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use wicket::prelude::*;
/// ```
pub mod prelude {
    pub use wicket_router::{
        Handler, HandlerError, HttpHandler, HttpRequest, HttpResponse, PatternError, Router,
    };

    pub use wicket_server::{
        Server, ServerConfig, ServerError, ServerHandle, ShutdownSignal, StaticFiles,
    };

    pub use wicket_ws::{
        CloseCode, CloseFrame, Message, Session, SessionHandle, SessionId, SessionRegistry,
        WsError, WsHandler, WsResult,
    };
}
