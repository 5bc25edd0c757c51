//! WebSocket message types.
//!
//! [`Message`] is the session-level view of one WebSocket frame. Payloads are
//! reference-counted [`Bytes`], matching what the framing layer hands over,
//! so converting between the two moves the buffer instead of copying it.

use bytes::Bytes;

use crate::error::{CloseCode, WsError, WsResult};

/// One WebSocket message as seen by a session handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A UTF-8 text message.
    Text(String),
    /// A binary message.
    Binary(Bytes),
    /// A ping frame; answered automatically by the session's receive loop.
    Ping(Bytes),
    /// A pong frame.
    Pong(Bytes),
    /// A close frame, with the peer's code and reason when present.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Build a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Build a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Build a ping frame.
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::Ping(data.into())
    }

    /// Build a pong frame.
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::Pong(data.into())
    }

    /// Build a close frame carrying a code and reason.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close(Some(CloseFrame {
            code: code.as_u16(),
            reason: reason.into(),
        }))
    }

    /// Build a text message from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> WsResult<Self> {
        serde_json::to_string(value)
            .map(Self::Text)
            .map_err(|e| WsError::EncodeFailed(e.to_string()))
    }

    /// Check if this is a text message.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Check if this is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Check if this is a ping frame.
    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping(_))
    }

    /// Check if this is a close frame.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Get the text payload, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the payload bytes of a data or control frame.
    ///
    /// Close frames carry no payload here; their code and reason live in
    /// [`close_frame`](Self::close_frame).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => Some(data),
            Self::Close(_) => None,
        }
    }

    /// Get the close frame, if this is a close frame with one attached.
    pub fn close_frame(&self) -> Option<&CloseFrame> {
        match self {
            Self::Close(frame) => frame.as_ref(),
            _ => None,
        }
    }

    /// Parse the text payload as JSON.
    ///
    /// Fails on non-text messages and on payloads that do not deserialize
    /// into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> WsResult<T> {
        let text = self
            .as_text()
            .ok_or_else(|| WsError::DecodeFailed("not a text message".to_string()))?;
        serde_json::from_str(text).map_err(|e| WsError::DecodeFailed(e.to_string()))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data.into())
    }
}

impl From<tungstenite::Message> for Message {
    fn from(raw: tungstenite::Message) -> Self {
        match raw {
            tungstenite::Message::Text(text) => Self::Text(text.as_str().to_owned()),
            tungstenite::Message::Binary(data) => Self::Binary(data),
            tungstenite::Message::Ping(data) => Self::Ping(data),
            tungstenite::Message::Pong(data) => Self::Pong(data),
            tungstenite::Message::Close(frame) => Self::Close(frame.map(Into::into)),
            // Raw frames never surface through the message-level API.
            tungstenite::Message::Frame(_) => Self::Binary(Bytes::new()),
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.into()),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(data) => Self::Ping(data),
            Message::Pong(data) => Self::Pong(data),
            Message::Close(frame) => Self::Close(frame.map(Into::into)),
        }
    }
}

/// Code and reason attached to a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close code.
    pub code: u16,
    /// The close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Get the close code as a [`CloseCode`], if it maps to a standard one.
    pub fn close_code(&self) -> Option<CloseCode> {
        CloseCode::from_u16(self.code)
    }
}

impl From<tungstenite::protocol::CloseFrame> for CloseFrame {
    fn from(frame: tungstenite::protocol::CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.as_str().to_owned(),
        }
    }
}

impl From<CloseFrame> for tungstenite::protocol::CloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_kind_predicates() {
        assert!(Message::text("hi").is_text());
        assert!(Message::binary(vec![0u8, 1]).is_binary());
        assert!(Message::ping(Bytes::new()).is_ping());
        assert!(Message::close(CloseCode::Normal, "done").is_close());
        assert!(!Message::text("hi").is_close());
    }

    #[test]
    fn test_payload_accessors() {
        assert_eq!(Message::text("payload").as_text(), Some("payload"));
        assert_eq!(Message::text("payload").as_bytes(), Some(&b"payload"[..]));
        assert_eq!(Message::binary(vec![1u8, 2]).as_text(), None);
        assert_eq!(Message::binary(vec![1u8, 2]).as_bytes(), Some(&[1u8, 2][..]));
        assert_eq!(Message::close(CloseCode::Normal, "bye").as_bytes(), None);
    }

    #[test]
    fn test_close_carries_code_and_reason() {
        let msg = Message::close(CloseCode::PolicyViolation, "too chatty");
        let frame = msg.close_frame().unwrap();
        assert_eq!(frame.code, 1008);
        assert_eq!(frame.reason, "too chatty");
        assert_eq!(frame.close_code(), Some(CloseCode::PolicyViolation));
    }

    #[test]
    fn test_json_helpers() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Event {
            kind: String,
            seq: u64,
        }

        let event = Event {
            kind: "join".to_string(),
            seq: 7,
        };
        let msg = Message::from_json(&event).unwrap();
        assert_eq!(msg.json::<Event>().unwrap(), event);

        let err = Message::binary(vec![0u8]).json::<Event>().unwrap_err();
        assert!(matches!(err, WsError::DecodeFailed(_)));
    }

    #[test]
    fn test_framing_conversion_preserves_payloads() {
        let payload = Bytes::from_static(b"\x00\x01\x02");
        let raw: tungstenite::Message = Message::binary(payload.clone()).into();
        assert_eq!(Message::from(raw), Message::Binary(payload));

        let raw: tungstenite::Message = Message::text("echo").into();
        assert_eq!(Message::from(raw).as_text(), Some("echo"));
    }

    #[test]
    fn test_close_frame_conversion() {
        let raw: tungstenite::Message = Message::close(CloseCode::GoingAway, "restarting").into();
        let back = Message::from(raw);
        let frame = back.close_frame().unwrap();
        assert_eq!(frame.code, 1001);
        assert_eq!(frame.reason, "restarting");
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Message::from("hi").as_text(), Some("hi"));
        assert!(Message::from(Bytes::from_static(b"raw")).is_binary());
        assert!(Message::from(vec![1u8, 2]).is_binary());
    }
}
