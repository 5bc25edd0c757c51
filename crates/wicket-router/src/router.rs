//! Route registry.
//!
//! Routes pair an HTTP method and an anchored regular expression with a
//! handler. Resolution walks the registry in registration order and returns
//! the first route whose method and pattern both match, so more specific
//! patterns must be registered before broader ones.

use std::sync::Arc;

use http::Method;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::handler::HttpHandler;
use wicket_ws::WsHandler;

/// A route pattern that failed to compile.
#[derive(Debug, Error)]
#[error("invalid route pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The pattern as supplied at registration.
    pub pattern: String,
    /// The underlying regex error.
    #[source]
    pub source: regex::Error,
}

/// The handler bound to a route.
///
/// A route serves either plain HTTP exchanges or WebSocket sessions, never
/// both. The dispatcher decides which kind a request wants before resolving,
/// and a kind mismatch is a client error.
#[derive(Clone)]
pub enum Handler {
    /// Plain request/response handler.
    Http(Arc<dyn HttpHandler>),
    /// WebSocket session handler, bound under `GET`.
    WebSocket(Arc<dyn WsHandler>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(_) => f.write_str("Handler::Http"),
            Self::WebSocket(_) => f.write_str("Handler::WebSocket"),
        }
    }
}

/// One registered route.
#[derive(Debug, Clone)]
struct Route {
    method: Method,
    pattern: String,
    regex: Regex,
    handler: Handler,
}

/// An ordered registry of regex routes.
///
/// # Example
///
/// ```
/// use http::{Method, StatusCode};
/// use wicket_router::{HandlerError, HttpRequest, HttpResponse, Router};
///
/// let mut router = Router::new();
/// router
///     .add_http(Method::GET, "/users/[0-9]+", |_req: HttpRequest| async {
///         Err::<HttpResponse, _>(HandlerError::status(StatusCode::OK, "found"))
///     })
///     .unwrap();
///
/// assert!(router.resolve(&Method::GET, "/users/42").is_some());
/// assert!(router.resolve(&Method::GET, "/users/alice").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route.
    ///
    /// The pattern is a regular expression matched against the full request
    /// path. It is anchored on both ends, so `"/users/[0-9]+"` matches
    /// `/users/42` but not `/users/42/posts`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern is not a valid regex.
    pub fn add(&mut self, method: Method, pattern: &str, handler: Handler) -> Result<(), PatternError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })?;
        debug!(method = %method, pattern, kind = ?handler, "route registered");
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            regex,
            handler,
        });
        Ok(())
    }

    /// Register an HTTP handler.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern is not a valid regex.
    pub fn add_http(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl HttpHandler + 'static,
    ) -> Result<(), PatternError> {
        self.add(method, pattern, Handler::Http(Arc::new(handler)))
    }

    /// Register a WebSocket handler.
    ///
    /// WebSocket upgrades arrive as `GET` requests, so the route is bound
    /// under `GET`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern is not a valid regex.
    pub fn add_ws(
        &mut self,
        pattern: &str,
        handler: impl WsHandler + 'static,
    ) -> Result<(), PatternError> {
        self.add(Method::GET, pattern, Handler::WebSocket(Arc::new(handler)))
    }

    /// Resolve a method and path to a handler.
    ///
    /// Routes are tried in registration order; the first one whose method and
    /// pattern both match wins. Returns `None` when nothing matches.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&Handler> {
        self.routes
            .iter()
            .find(|route| route.method == *method && route.regex.is_match(path))
            .map(|route| &route.handler)
    }

    /// Get the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check whether the router has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over the registered `(method, pattern)` pairs in order.
    pub fn patterns(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes
            .iter()
            .map(|route| (&route.method, route.pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, HttpRequest, HttpResponse};
    use http::StatusCode;

    fn ok_handler(tag: &'static str) -> impl HttpHandler {
        move |_req: HttpRequest| async move {
            Err::<HttpResponse, _>(HandlerError::status(StatusCode::OK, tag))
        }
    }

    fn tag_of(router: &Router, method: &Method, path: &str) -> Option<String> {
        let handler = router.resolve(method, path)?;
        let Handler::Http(handler) = handler else {
            return None;
        };
        let err = futures_executor(handler.handle(HttpRequest::new(bytes::Bytes::new())));
        match err {
            Err(HandlerError::Status { message, .. }) => Some(message),
            _ => None,
        }
    }

    fn futures_executor<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn test_exact_match() {
        let mut router = Router::new();
        router.add_http(Method::GET, "/health", ok_handler("health")).unwrap();

        assert!(router.resolve(&Method::GET, "/health").is_some());
        assert!(router.resolve(&Method::GET, "/healthz").is_none());
        assert!(router.resolve(&Method::GET, "/health/extra").is_none());
    }

    #[test]
    fn test_method_mismatch() {
        let mut router = Router::new();
        router.add_http(Method::POST, "/items", ok_handler("create")).unwrap();

        assert!(router.resolve(&Method::POST, "/items").is_some());
        assert!(router.resolve(&Method::GET, "/items").is_none());
    }

    #[test]
    fn test_regex_pattern() {
        let mut router = Router::new();
        router
            .add_http(Method::GET, "/users/[0-9]+", ok_handler("user"))
            .unwrap();

        assert!(router.resolve(&Method::GET, "/users/42").is_some());
        assert!(router.resolve(&Method::GET, "/users/").is_none());
        assert!(router.resolve(&Method::GET, "/users/42/posts").is_none());
    }

    #[test]
    fn test_registration_order_wins() {
        let mut router = Router::new();
        router
            .add_http(Method::GET, "/users/me", ok_handler("me"))
            .unwrap();
        router
            .add_http(Method::GET, "/users/.*", ok_handler("any"))
            .unwrap();

        assert_eq!(tag_of(&router, &Method::GET, "/users/me"), Some("me".into()));
        assert_eq!(tag_of(&router, &Method::GET, "/users/42"), Some("any".into()));

        // Broad route first shadows the specific one.
        let mut shadowed = Router::new();
        shadowed
            .add_http(Method::GET, "/users/.*", ok_handler("any"))
            .unwrap();
        shadowed
            .add_http(Method::GET, "/users/me", ok_handler("me"))
            .unwrap();
        assert_eq!(
            tag_of(&shadowed, &Method::GET, "/users/me"),
            Some("any".into())
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut router = Router::new();
        let err = router
            .add_http(Method::GET, "/users/[", ok_handler("bad"))
            .unwrap_err();
        assert!(err.to_string().contains("/users/["));
        assert!(router.is_empty());
    }

    #[test]
    fn test_ws_route_bound_under_get() {
        let mut router = Router::new();
        router
            .add_ws("/ws/echo", |_session: wicket_ws::Session| async {})
            .unwrap();

        assert!(matches!(
            router.resolve(&Method::GET, "/ws/echo"),
            Some(Handler::WebSocket(_))
        ));
        assert!(router.resolve(&Method::POST, "/ws/echo").is_none());
    }

    #[test]
    fn test_patterns_iterates_in_order() {
        let mut router = Router::new();
        router.add_http(Method::GET, "/a", ok_handler("a")).unwrap();
        router.add_http(Method::POST, "/b", ok_handler("b")).unwrap();

        let patterns: Vec<_> = router.patterns().collect();
        assert_eq!(patterns, vec![(&Method::GET, "/a"), (&Method::POST, "/b")]);
        assert_eq!(router.len(), 2);
    }
}
