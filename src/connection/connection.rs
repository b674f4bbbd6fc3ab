//! One WebSocket connection over an owned transport stream.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::meta::MetaMap;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseReason, Message};
use crate::middleware::{Middleware, ProcessHttpStack, ProcessStack, ProcessTickStack};
use crate::protocol::http::HttpMessage;
use crate::protocol::{Frame, Handshake, MessageAssembler, OpCode};

/// A WebSocket connection: the transport stream, the frame codec, the
/// message assembler, the half-close state and the middleware chain.
///
/// Every public operation that touches a message runs through the
/// middleware chain; the connection itself only provides the terminal
/// actions (frame I/O, HTTP I/O) and the state the interceptors drive.
///
/// ## Example
///
/// ```rust,ignore
/// use wspipe::{Config, Connection, Message, Role};
///
/// let mut conn = Connection::new(stream, Role::Client, Config::default());
/// conn.send(Message::text("Hello")).await?;
/// let reply = conn.receive().await?;
/// ```
pub struct Connection<T> {
    codec: FrameCodec<T>,
    assembler: MessageAssembler,
    middleware: Vec<Arc<dyn Middleware<T>>>,
    config: Config,
    timeout: Duration,
    readable: bool,
    writable: bool,
    connected: bool,
    handshake: Option<Handshake>,
    meta: MetaMap,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
}

impl<T> Connection<T> {
    /// Wrap a transport stream. The connection stays in `Connecting` state
    /// until the handshake artifacts are attached.
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self {
            codec: FrameCodec::new(io, role, config.limits.clone()),
            assembler: MessageAssembler::new(config.limits.clone()),
            middleware: Vec::new(),
            timeout: config.timeout,
            config,
            readable: true,
            writable: true,
            connected: true,
            handshake: None,
            meta: MetaMap::new(),
            local_addr: None,
            peer_addr: None,
        }
    }

    /// Append an interceptor to the middleware chain.
    ///
    /// Interceptors run in registration order on the way in and in reverse
    /// on the way back out.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware<T>>) {
        self.middleware.push(middleware);
    }

    /// The connection role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.codec.role()
    }

    /// Derived lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::derive(
            self.handshake.is_some(),
            self.connected,
            self.readable,
            self.writable,
        )
    }

    /// Whether the read direction is usable.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.connected && self.readable
    }

    /// Whether the write direction is usable.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.connected && self.writable
    }

    /// Whether the transport is still held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Shut down the read direction (half-close).
    pub fn close_read(&mut self) {
        self.readable = false;
    }

    /// Shut down the write direction (half-close).
    pub fn close_write(&mut self) {
        self.writable = false;
    }

    /// The read/write timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the read/write timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Attach interceptor-owned state to this connection.
    pub fn set_meta<V: Any + Send + Sync>(&mut self, value: V) {
        self.meta.set(value);
    }

    /// Borrow interceptor-owned state of type `V`.
    #[must_use]
    pub fn get_meta<V: Any + Send + Sync>(&self) -> Option<&V> {
        self.meta.get()
    }

    /// Mutably borrow interceptor-owned state of type `V`.
    pub fn get_meta_mut<V: Any + Send + Sync>(&mut self) -> Option<&mut V> {
        self.meta.get_mut()
    }

    /// Remove and return interceptor-owned state of type `V`.
    pub fn take_meta<V: Any + Send + Sync>(&mut self) -> Option<V> {
        self.meta.take()
    }

    /// The completed upgrade exchange, if the handshake has run.
    #[must_use]
    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    pub(crate) fn set_handshake(&mut self, handshake: Handshake) {
        self.handshake = Some(handshake);
    }

    /// Local socket address, if known.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Peer socket address, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub(crate) fn set_addresses(
        &mut self,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
    ) {
        self.local_addr = local_addr;
        self.peer_addr = peer_addr;
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection<T> {
    /// Send a message through the outgoing middleware chain.
    ///
    /// Returns the message as the chain (possibly transformed) saw it off.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the write direction is down
    /// - [`Error::Timeout`] if the transport blocked past the timeout
    /// - Fatal errors disconnect before propagating
    pub async fn send(&mut self, message: Message) -> Result<Message> {
        self.push_message(message).await
    }

    /// Queue one message for the peer without waiting for any reply.
    ///
    /// This is the raw form of [`send`](Self::send), also called by
    /// interceptors (for example to push a close acknowledgement).
    pub async fn push_message(&mut self, message: Message) -> Result<Message> {
        if !self.connected {
            return Err(Error::ConnectionClosed);
        }
        let mut stack = ProcessStack::new(self.middleware.clone());
        match stack.handle_outgoing(self, message).await {
            Ok(message) => Ok(message),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Initiate (or acknowledge) the close handshake.
    pub async fn close(&mut self, status: u16, reason: impl Into<String>) -> Result<Message> {
        self.push_message(Message::close(status, reason)).await
    }

    /// Receive the next message through the incoming middleware chain.
    ///
    /// Blocks until one full message assembles or a terminal condition
    /// occurs. Control messages interleaved between fragments are returned
    /// on their own, before the data message completes.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no data arrived in time; the connection is
    ///   still usable and the call may be retried
    /// - [`Error::ConnectionClosed`] on end-of-stream
    /// - Protocol errors close the connection (with a status-bearing close
    ///   frame when still writable) before propagating
    pub async fn receive(&mut self) -> Result<Message> {
        if !self.is_readable() {
            return Err(Error::ConnectionClosed);
        }
        let mut stack = ProcessStack::new(self.middleware.clone());
        match stack.handle_incoming(self).await {
            Ok(message) => Ok(message),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Run one tick through the middleware chain (periodic upkeep such as
    /// the ping interval).
    pub async fn tick(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        let mut stack = ProcessTickStack::new(self.middleware.clone());
        match stack.handle_tick(self).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Release the transport. Idempotent and safe in any state.
    pub async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        log::debug!("[connection] {} disconnecting", self.codec.role());
        self.connected = false;
        self.readable = false;
        self.writable = false;
        let _ = self.codec.shutdown().await;
    }

    /// Escalate a failed operation: fatal errors disconnect, protocol
    /// errors first send their close status while still writable.
    async fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.connected {
            if let Some((status, reason)) = err.close_status() {
                if self.writable {
                    let frame = Frame::close(Some(&CloseReason::new(status, reason)));
                    let _ = self.codec.write_frame(&frame).await;
                    let _ = self.codec.flush().await;
                }
            }
            self.disconnect().await;
        }
        err
    }

    /// Terminal action of the incoming chain: read frames until one full
    /// message is available.
    ///
    /// Pings are answered inside this call, before the ping is returned,
    /// so the peer observes the pong ahead of any later traffic.
    pub(crate) async fn pull_message(&mut self) -> Result<Message> {
        loop {
            let frame = match tokio::time::timeout(self.timeout, self.codec.read_frame()).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::Timeout),
            };
            match frame.opcode {
                OpCode::Ping => {
                    let payload = frame.into_payload();
                    if self.writable {
                        self.codec.write_frame(&Frame::pong(payload.clone())).await?;
                        self.codec.flush().await?;
                    }
                    return Ok(Message::Ping(payload));
                }
                OpCode::Pong => return Ok(Message::Pong(frame.into_payload())),
                OpCode::Close => {
                    return Ok(Message::Close(CloseReason::decode(frame.payload())?));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(assembled) = self.assembler.push(frame)? {
                        return Ok(assembled.into_message()?);
                    }
                }
            }
        }
    }

    /// Terminal action of the outgoing chain: fragment and write.
    pub(crate) async fn write_message(&mut self, message: Message) -> Result<Message> {
        if !self.connected || !self.writable {
            return Err(Error::ConnectionClosed);
        }
        if let Some(payload) = message.as_text().map(str::as_bytes).or(message.as_binary()) {
            self.config.limits.check_message_size(payload.len())?;
        }

        let timeout = self.timeout;
        let fragment_size = self.config.fragment_size;
        let op = async {
            match &message {
                Message::Text(text) => {
                    for frame in
                        MessageFragmenter::new(text.as_bytes(), OpCode::Text, fragment_size)
                    {
                        self.codec.write_frame(&frame).await?;
                    }
                }
                Message::Binary(data) => {
                    for frame in MessageFragmenter::new(data, OpCode::Binary, fragment_size) {
                        self.codec.write_frame(&frame).await?;
                    }
                }
                Message::Ping(data) => self.codec.write_frame(&Frame::ping(data.clone())).await?,
                Message::Pong(data) => self.codec.write_frame(&Frame::pong(data.clone())).await?,
                Message::Close(reason) => {
                    self.codec.write_frame(&Frame::close(reason.as_ref())).await?;
                }
            }
            self.codec.flush().await
        };
        match tokio::time::timeout(timeout, op).await {
            Ok(Ok(())) => Ok(message),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Run the incoming-handshake chain down to the HTTP reader.
    pub(crate) async fn receive_http(&mut self) -> Result<HttpMessage> {
        let mut stack = ProcessHttpStack::new(self.middleware.clone());
        stack.handle_http_incoming(self).await
    }

    /// Run the outgoing-handshake chain down to the HTTP writer.
    pub(crate) async fn send_http(&mut self, message: HttpMessage) -> Result<HttpMessage> {
        let mut stack = ProcessHttpStack::new(self.middleware.clone());
        stack.handle_http_outgoing(self, message).await
    }

    /// Terminal action of the incoming-handshake chain.
    pub(crate) async fn pull_http(&mut self) -> Result<HttpMessage> {
        let max_size = self.config.limits.max_handshake_size;
        match tokio::time::timeout(self.timeout, HttpMessage::read_from(self.codec.get_mut(), max_size))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Terminal action of the outgoing-handshake chain.
    pub(crate) async fn push_http(&mut self, message: HttpMessage) -> Result<HttpMessage> {
        let timeout = self.timeout;
        let op = async {
            message.write_to(self.codec.get_mut()).await?;
            self.codec.flush().await
        };
        match tokio::time::timeout(timeout, op).await {
            Ok(Ok(())) => Ok(message),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Timeout),
        }
    }
}

impl Connection<TcpStream> {
    /// Wait until the transport has data to read.
    ///
    /// Used by the server multiplexer; may wake spuriously, in which case
    /// the following receive simply times out.
    pub(crate) async fn await_readable(&self) {
        let _ = self.codec.get_ref().readable().await;
    }
}
