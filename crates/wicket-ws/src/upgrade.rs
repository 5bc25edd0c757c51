//! WebSocket HTTP upgrade handling.
//!
//! Detection and completion of RFC 6455 protocol upgrades. The server answers
//! the `101 Switching Protocols` response itself and hands the raw transport
//! to [`complete_upgrade`] once hyper yields it.

use base64::Engine;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

use crate::error::{WsError, WsResult};

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// IO type produced by a completed hyper upgrade.
pub type ServerIo = TokioIo<hyper::upgrade::Upgraded>;

/// Check if a request is a WebSocket upgrade request.
///
/// A valid WebSocket upgrade request must carry `Connection: Upgrade`,
/// `Upgrade: websocket`, a non-empty `Sec-WebSocket-Key`, and
/// `Sec-WebSocket-Version: 13`.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    has_connection_upgrade(request)
        && has_websocket_upgrade(request)
        && websocket_key(request).is_some()
        && has_websocket_version(request)
}

fn has_connection_upgrade<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false)
}

fn has_websocket_upgrade<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn has_websocket_version<B>(request: &Request<B>) -> bool {
    request
        .headers()
        .get("sec-websocket-version")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "13")
        .unwrap_or(false)
}

fn websocket_key<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get("sec-websocket-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Compute the `Sec-WebSocket-Accept` value from the client key.
fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Validate a WebSocket upgrade request, returning the accept key.
pub fn validate_upgrade_request<B>(request: &Request<B>) -> WsResult<String> {
    if !has_connection_upgrade(request) {
        return Err(WsError::not_upgrade("missing Connection: Upgrade header"));
    }

    if !has_websocket_upgrade(request) {
        return Err(WsError::not_upgrade("missing Upgrade: websocket header"));
    }

    let key = websocket_key(request)
        .ok_or_else(|| WsError::not_upgrade("missing Sec-WebSocket-Key header"))?;

    if !has_websocket_version(request) {
        return Err(WsError::not_upgrade(
            "missing or invalid Sec-WebSocket-Version header (must be 13)",
        ));
    }

    Ok(compute_accept_key(key))
}

/// Build the `101 Switching Protocols` response for a valid upgrade request.
///
/// The caller must send this response on the original connection before the
/// upgraded transport becomes available.
pub fn upgrade_response<B>(request: &Request<B>) -> WsResult<Response<Full<Bytes>>> {
    let accept_key = validate_upgrade_request(request)?;

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "websocket")
        .header("Sec-WebSocket-Accept", accept_key)
        .body(Full::new(Bytes::new()))
        .map_err(|e| WsError::handshake_failed(e.to_string()))
}

/// Wrap an already-upgraded transport in a server-side WebSocket stream.
///
/// The HTTP handshake is complete by the time this is called, so the stream
/// starts directly in framed message exchange.
pub async fn complete_upgrade<S>(stream: S) -> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    WebSocketStream::from_raw_socket(stream, tungstenite::protocol::Role::Server, None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_upgrade_request() -> Request<()> {
        Request::builder()
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap()
    }

    #[test]
    fn test_is_upgrade_request_valid() {
        assert!(is_upgrade_request(&make_upgrade_request()));
    }

    #[test]
    fn test_is_upgrade_request_plain_get() {
        let request = Request::builder().body(()).unwrap();
        assert!(!is_upgrade_request(&request));
    }

    #[test]
    fn test_is_upgrade_request_missing_key() {
        let request = Request::builder()
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap();
        assert!(!is_upgrade_request(&request));
    }

    #[test]
    fn test_is_upgrade_request_wrong_version() {
        let request = Request::builder()
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "key")
            .header("Sec-WebSocket-Version", "12")
            .body(())
            .unwrap();
        assert!(!is_upgrade_request(&request));
    }

    #[test]
    fn test_compute_accept_key_rfc_vector() {
        // RFC 6455 section 1.3 example
        let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_validate_upgrade_request_missing_connection() {
        let request = Request::builder()
            .header(header::UPGRADE, "websocket")
            .header("Sec-WebSocket-Key", "key")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .unwrap();
        let result = validate_upgrade_request(&request);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Connection"));
    }

    #[test]
    fn test_upgrade_response_headers() {
        let response = upgrade_response(&make_upgrade_request()).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(
            response.headers().get(header::UPGRADE).unwrap(),
            "websocket"
        );
        assert_eq!(
            response.headers().get("Sec-WebSocket-Accept").unwrap(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_upgrade_response_invalid_request() {
        let request = Request::builder().body(()).unwrap();
        assert!(upgrade_response(&request).is_err());
    }
}
