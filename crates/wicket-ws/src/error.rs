//! Error types for WebSocket operations.

use std::fmt;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur while establishing or driving a WebSocket session.
#[derive(Debug, Error)]
pub enum WsError {
    /// The HTTP request was not a valid WebSocket upgrade request.
    #[error("not a WebSocket upgrade request: {reason}")]
    NotUpgrade {
        /// Why the request does not qualify as an upgrade.
        reason: String,
    },

    /// The upgrade handshake could not be completed.
    #[error("WebSocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The session is closed.
    #[error("session closed: {reason}")]
    SessionClosed {
        /// Optional close code from the peer.
        code: Option<u16>,
        /// Reason for closing.
        reason: String,
    },

    /// Failed to send a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// A message payload could not be decoded.
    #[error("failed to decode message: {0}")]
    DecodeFailed(String),

    /// A message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),

    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol-level error from the framing layer.
    #[error("websocket protocol error: {0}")]
    Protocol(#[from] tungstenite::Error),
}

impl WsError {
    /// Create a new "not an upgrade request" error.
    pub fn not_upgrade(reason: impl Into<String>) -> Self {
        Self::NotUpgrade {
            reason: reason.into(),
        }
    }

    /// Create a new handshake failed error.
    pub fn handshake_failed(reason: impl Into<String>) -> Self {
        Self::HandshakeFailed(reason.into())
    }

    /// Create a new session closed error.
    pub fn session_closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::SessionClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Create a new send failed error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed(reason.into())
    }

    /// Get the close code if this is a session closed error.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::SessionClosed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Close code for WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// Unsupported data (1003).
    Unsupported = 1003,
    /// Abnormal closure (1006).
    Abnormal = 1006,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Internal error (1011).
    InternalError = 1011,
}

impl CloseCode {
    /// Convert from a u16 code, if it is one of the codes modeled here.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1003 => Some(Self::Unsupported),
            1006 => Some(Self::Abnormal),
            1008 => Some(Self::PolicyViolation),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::Unsupported => "Unsupported",
            Self::Abnormal => "Abnormal",
            Self::PolicyViolation => "PolicyViolation",
            Self::InternalError => "InternalError",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_upgrade_error() {
        let err = WsError::not_upgrade("missing upgrade header");
        assert!(matches!(err, WsError::NotUpgrade { .. }));
        assert!(err.to_string().contains("missing upgrade header"));
    }

    #[test]
    fn test_session_closed_code() {
        let err = WsError::session_closed(Some(1000), "normal closure");
        assert_eq!(err.close_code(), Some(1000));

        let err = WsError::send_failed("broken pipe");
        assert_eq!(err.close_code(), None);
    }

    #[test]
    fn test_close_code_round_trip() {
        assert_eq!(CloseCode::from_u16(1000), Some(CloseCode::Normal));
        assert_eq!(CloseCode::from_u16(1011), Some(CloseCode::InternalError));
        assert_eq!(CloseCode::from_u16(9999), None);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
    }

    #[test]
    fn test_close_code_display() {
        assert_eq!(CloseCode::Normal.to_string(), "Normal (1000)");
    }
}
