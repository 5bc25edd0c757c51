//! WebSocket session handling.
//!
//! A [`Session`] wraps one upgraded connection. It is the sole owner of its
//! transport: the bound handler drives the message exchange, and a single
//! close callback fires exactly once when the run loop ends for any reason.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CloseCode, WsError, WsResult};
use crate::message::Message;
use crate::upgrade::ServerIo;

/// A unique identifier for a WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Future returned by a boxed WebSocket handler invocation.
pub type WsHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handler bound to a WebSocket route.
///
/// Invoked exactly once per accepted upgrade; the handler owns the session
/// and drives the message exchange for as long as it wishes.
pub trait WsHandler<S = ServerIo>: Send + Sync
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Handle one WebSocket session.
    fn handle(&self, session: Session<S>) -> WsHandlerFuture;
}

impl<S, F, Fut> WsHandler<S> for F
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Fn(Session<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, session: Session<S>) -> WsHandlerFuture {
        Box::pin(self(session))
    }
}

type SharedSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, tungstenite::Message>>>;

/// Callback invoked when a session's run loop terminates.
///
/// `Sync` is required so that handler futures borrowing the session stay
/// `Send` across await points.
type CloseCallback = Box<dyn FnOnce(SessionId) + Send + Sync>;

/// One live WebSocket session over an upgraded transport.
///
/// # Example
///
/// ```ignore
/// use wicket_ws::{Message, Session};
///
/// async fn echo(mut session: Session) {
///     while let Some(Ok(msg)) = session.recv().await {
///         if msg.is_text() {
///             let _ = session.send(msg).await;
///         }
///     }
/// }
/// ```
pub struct Session<S = ServerIo> {
    id: SessionId,
    path: String,
    sender: SharedSink<S>,
    receiver: SplitStream<WebSocketStream<S>>,
    on_close: Option<CloseCallback>,
    closed: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a session from an upgraded, already-handshaken stream.
    pub fn new(stream: WebSocketStream<S>, path: impl Into<String>) -> Self {
        let (sender, receiver) = stream.split();
        Self {
            id: SessionId::new(),
            path: path.into(),
            sender: Arc::new(Mutex::new(sender)),
            receiver,
            on_close: None,
            closed: false,
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the request path this session was accepted on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the session has observed a close frame, error, or EOF.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register the close callback.
    ///
    /// There is a single slot; the callback is invoked exactly once, when
    /// [`Session::run`] returns. Registering again replaces the previous
    /// callback.
    pub fn on_close(&mut self, callback: impl FnOnce(SessionId) + Send + Sync + 'static) {
        self.on_close = Some(Box::new(callback));
    }

    /// Get a cloneable send-only handle for this session.
    ///
    /// Handles stay valid for broadcast while the session lives; sends after
    /// the peer disconnects fail with a send error.
    pub fn handle(&self) -> SessionHandle<S> {
        SessionHandle {
            id: self.id,
            path: self.path.clone(),
            sender: Arc::clone(&self.sender),
        }
    }

    /// Receive the next message.
    ///
    /// Pings are answered with pongs automatically. Returns `None` once the
    /// transport reaches end-of-stream.
    pub async fn recv(&mut self) -> Option<WsResult<Message>> {
        if self.closed {
            return None;
        }

        match self.receiver.next().await {
            Some(Ok(raw)) => {
                let msg = Message::from(raw);

                if let Message::Ping(data) = &msg {
                    debug!(session_id = %self.id, "received ping, sending pong");
                    if let Err(e) = self.send(Message::pong(data.clone())).await {
                        warn!(session_id = %self.id, error = %e, "failed to send pong");
                    }
                }

                if msg.is_close() {
                    debug!(session_id = %self.id, "received close frame");
                    self.closed = true;
                }

                Some(Ok(msg))
            }
            Some(Err(e)) => {
                self.closed = true;
                Some(Err(WsError::from(e)))
            }
            None => {
                self.closed = true;
                None
            }
        }
    }

    /// Send a message on the session.
    pub async fn send(&self, msg: Message) -> WsResult<()> {
        if self.closed {
            return Err(WsError::session_closed(
                Some(CloseCode::Normal.as_u16()),
                "session already closed",
            ));
        }

        let mut sender = self.sender.lock().await;
        sender
            .send(msg.into())
            .await
            .map_err(|e| WsError::send_failed(e.to_string()))
    }

    /// Send a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::text(text)).await
    }

    /// Send a JSON-encoded text message.
    pub async fn send_json<T: serde::Serialize>(&self, value: &T) -> WsResult<()> {
        self.send(Message::from_json(value)?).await
    }

    /// Send a close frame and mark the session closed.
    pub async fn close(&mut self, code: CloseCode, reason: impl Into<String>) -> WsResult<()> {
        if self.closed {
            return Ok(());
        }

        let reason = reason.into();
        debug!(session_id = %self.id, code = code.as_u16(), reason = %reason, "closing session");
        self.send(Message::close(code, reason)).await?;
        self.closed = true;
        Ok(())
    }

    /// Run the session to completion.
    ///
    /// Yields control to the bound handler; when the handler returns, closes
    /// the underlying sink and fires the close callback. The callback fires
    /// exactly once, whether the handler returns normally, the peer
    /// disconnects, or the handler panics.
    pub async fn run(mut self, handler: &dyn WsHandler<S>) {
        let id = self.id;
        let on_close = self.on_close.take();
        let sender = Arc::clone(&self.sender);

        let outcome = AssertUnwindSafe(handler.handle(self)).catch_unwind().await;
        if outcome.is_err() {
            warn!(session_id = %id, "WebSocket handler panicked");
        }

        // Outstanding handles share the sink and would otherwise keep the
        // connection open after the handler is done; close it here so the
        // peer sees a proper close handshake.
        let mut sink = sender.lock().await;
        if let Err(e) = sink.close().await {
            debug!(session_id = %id, error = %e, "error closing session sink");
        }
        drop(sink);

        debug!(session_id = %id, "session run loop finished");
        if let Some(callback) = on_close {
            callback(id);
        }
    }
}

/// A cloneable send-only handle to a live session.
///
/// Used for [`SessionRegistry`](crate::SessionRegistry) snapshots and
/// host-side broadcast; it shares the session's sink but cannot receive.
pub struct SessionHandle<S = ServerIo> {
    id: SessionId,
    path: String,
    sender: SharedSink<S>,
}

impl<S> SessionHandle<S> {
    /// Get the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the request path the session was accepted on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<S> SessionHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send a message to the session's peer.
    pub async fn send(&self, msg: Message) -> WsResult<()> {
        let mut sender = self.sender.lock().await;
        sender
            .send(msg.into())
            .await
            .map_err(|e| WsError::send_failed(e.to_string()))
    }

    /// Send a text message to the session's peer.
    pub async fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::text(text)).await
    }

    /// Send a JSON-encoded text message to the session's peer.
    pub async fn send_json<T: serde::Serialize>(&self, value: &T) -> WsResult<()> {
        self.send(Message::from_json(value)?).await
    }
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            path: self.path.clone(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<S> PartialEq for SessionHandle<S> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<S> Eq for SessionHandle<S> {}

impl<S> std::fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::complete_upgrade;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;
    use tungstenite::protocol::Role;

    async fn session_pair() -> (Session<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let server = complete_upgrade(server_io).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (Session::new(server, "/ws"), client)
    }

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_session_is_sync() {
        // Handler futures hold &mut Session across await points; spawning
        // them requires Session (close callback included) to be Sync.
        fn assert_sync<T: Sync>() {}
        assert_sync::<Session<DuplexStream>>();
        assert_sync::<SessionHandle<DuplexStream>>();
    }

    #[tokio::test]
    async fn test_recv_and_send() {
        let (mut session, mut client) = session_pair().await;

        client
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();

        let msg = session.recv().await.unwrap().unwrap();
        assert_eq!(msg.as_text(), Some("hello"));

        session.send_text("world").await.unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, tungstenite::Message::Text("world".into()));
    }

    #[tokio::test]
    async fn test_recv_auto_pong() {
        let (mut session, mut client) = session_pair().await;

        client
            .send(tungstenite::Message::Ping(vec![1, 2].into()))
            .await
            .unwrap();

        let msg = session.recv().await.unwrap().unwrap();
        assert!(msg.is_ping());

        let pong = client.next().await.unwrap().unwrap();
        assert_eq!(pong, tungstenite::Message::Pong(vec![1, 2].into()));
    }

    #[tokio::test]
    async fn test_recv_marks_closed_on_close_frame() {
        let (mut session, mut client) = session_pair().await;

        client
            .send(tungstenite::Message::Close(None))
            .await
            .unwrap();

        let msg = session.recv().await.unwrap().unwrap();
        assert!(msg.is_close());
        assert!(session.is_closed());
        assert!(session.send_text("too late").await.is_err());
    }

    #[tokio::test]
    async fn test_run_fires_close_callback_once() {
        let (mut session, mut client) = session_pair().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        session.on_close(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handler = |mut session: Session<DuplexStream>| async move {
            while let Some(Ok(msg)) = session.recv().await {
                if msg.is_text() {
                    let _ = session.send(msg).await;
                }
            }
        };

        let run = tokio::spawn(async move { session.run(&handler).await });

        client
            .send(tungstenite::Message::Text("echo".into()))
            .await
            .unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, tungstenite::Message::Text("echo".into()));

        client.send(tungstenite::Message::Close(None)).await.unwrap();
        drop(client);

        run.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_fires_close_callback_on_handler_panic() {
        let (mut session, client) = session_pair().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        session.on_close(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handler = |_session: Session<DuplexStream>| async move {
            panic!("handler bug");
        };

        session.run(&handler).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(client);
    }

    #[tokio::test]
    async fn test_run_completes_close_handshake_with_peer() {
        let (mut session, mut client) = session_pair().await;
        // A live handle would otherwise hold the sink open past run().
        let _handle = session.handle();
        session.on_close(|_| {});

        let handler = |mut session: Session<DuplexStream>| async move {
            while let Some(Ok(_)) = session.recv().await {}
        };

        let run = tokio::spawn(async move { session.run(&handler).await });

        client.send(tungstenite::Message::Close(None)).await.unwrap();
        run.await.unwrap();

        let mut saw_close = false;
        while let Some(Ok(msg)) = client.next().await {
            if matches!(msg, tungstenite::Message::Close(_)) {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close, "peer should receive a close frame from run()");
    }

    #[tokio::test]
    async fn test_handle_sends_while_session_runs() {
        let (session, mut client) = session_pair().await;
        let handle = session.handle();
        assert_eq!(handle.id(), session.id());
        assert_eq!(handle.path(), "/ws");

        handle.send_text("broadcast").await.unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg, tungstenite::Message::Text("broadcast".into()));
    }

    #[tokio::test]
    async fn test_handle_equality_by_id() {
        let (session, _client) = session_pair().await;
        let a = session.handle();
        let b = a.clone();
        assert_eq!(a, b);

        let (other, _other_client) = session_pair().await;
        assert_ne!(a, other.handle());
    }
}
