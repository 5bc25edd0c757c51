//! WebSocket sessions for the Wicket server.
//!
//! This crate provides the WebSocket half of the Wicket embeddable server:
//! HTTP upgrade handling, per-connection session objects, and a thread-safe
//! registry of open sessions.
//!
//! # Features
//!
//! - **RFC 6455 compliant** framing via `tokio-tungstenite`
//! - **Session objects** owned by the bound handler, with send-only handles
//!   for host-side broadcast
//! - **Automatic ping/pong** handling for connection health
//! - **Close callbacks** fired exactly once when a session ends
//! - **Session registry** with snapshot reads for enumeration and broadcast
//! - **JSON serialization** helpers for typed messages
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wicket_ws::{Message, Session, SessionRegistry};
//!
//! let registry = Arc::new(SessionRegistry::new());
//!
//! // WebSocket handler bound to a route
//! async fn handle_session(mut session: Session) {
//!     while let Some(msg) = session.recv().await {
//!         match msg {
//!             Ok(Message::Text(text)) => {
//!                 session.send_text(format!("Echo: {text}")).await.ok();
//!             }
//!             Ok(Message::Close(_)) => break,
//!             Err(_) => break,
//!             _ => {}
//!         }
//!     }
//! }
//!
//! // Broadcast to everything currently open
//! async fn broadcast(registry: &SessionRegistry, text: &str) {
//!     for handle in registry.snapshot() {
//!         handle.send_text(text).await.ok();
//!     }
//! }
//! ```
//!
//! # Upgrade Flow
//!
//! ```text
//! HTTP Request ──► is_upgrade_request() ──► upgrade_response()
//!      │                                          │
//!      ▼                                          ▼
//! hyper::upgrade::on(req)              101 Switching Protocols
//!      │
//!      ▼
//! complete_upgrade() ──► Session::new() ──► registry.add(handle)
//!      │
//!      ▼
//! session.run(handler) ──► on close: registry.remove(id)
//! ```

#![doc(html_root_url = "https://docs.rs/wicket-ws/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod message;
pub mod registry;
pub mod session;
pub mod upgrade;

// Re-exports for convenience
pub use error::{CloseCode, WsError, WsResult};
pub use message::{CloseFrame, Message};
pub use registry::SessionRegistry;
pub use session::{Session, SessionHandle, SessionId, WsHandler, WsHandlerFuture};
pub use upgrade::{
    complete_upgrade, is_upgrade_request, upgrade_response, validate_upgrade_request, ServerIo,
};
