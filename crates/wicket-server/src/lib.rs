//! # Wicket Server
//!
//! HTTP and WebSocket server core for Wicket.
//!
//! This crate provides the server infrastructure:
//!
//! - HTTP/1.1 connection handling via Hyper, with keep-alive and upgrades
//! - Request buffering and dispatch through the route registry
//! - WebSocket upgrade handoff to handler-owned sessions
//! - Static file serving
//! - Graceful shutdown with connection draining
//! - An owned runtime mode for embedding in synchronous hosts
//!
//! ## Example
//!
//! ```rust,ignore
//! use wicket_server::{Server, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::builder().addr("0.0.0.0:8080").build());
//!     let mut handle = server.start(4)?;
//!     // ... host application work ...
//!     handle.stop();
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/wicket-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod server;
pub mod shutdown;
pub mod static_files;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use server::{Server, ServerError, ServerHandle};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
pub use static_files::{StaticFileError, StaticFiles};
