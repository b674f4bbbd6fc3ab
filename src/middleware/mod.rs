//! The interceptor pipeline.
//!
//! An ordered chain of [`Middleware`] instances wraps every message,
//! handshake and tick event of a connection. Each invocation gets a fresh
//! stack (the chain plus a cursor) as its continuation: calling a
//! `handle_*` method on the stack pops the next pending interceptor, and
//! once the chain is exhausted runs the terminal action (codec read, codec
//! write, HTTP read/write, or nothing for ticks). An interceptor may run
//! its logic before or after proceeding, proceed more than once, transform
//! the value passing through, or not proceed at all to short-circuit.

pub mod callback;
pub mod close_handler;
pub mod ping_interval;

pub use callback::Callback;
pub use close_handler::CloseHandler;
pub use ping_interval::PingInterval;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::Result;
use crate::message::Message;
use crate::protocol::http::HttpMessage;

/// An interceptor in the processing pipeline.
///
/// Every hook defaults to pass-through, so an implementation overrides only
/// the events it cares about. Hooks receive the stack (the continuation)
/// and the connection the event belongs to.
#[async_trait]
pub trait Middleware<T>: Send + Sync {
    /// Wrap one incoming message.
    async fn process_incoming(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<Message>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        stack.handle_incoming(connection).await
    }

    /// Wrap one outgoing message.
    async fn process_outgoing(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
        message: Message,
    ) -> Result<Message>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        stack.handle_outgoing(connection, message).await
    }

    /// Wrap the incoming half of the handshake exchange.
    async fn process_http_incoming(
        &self,
        stack: &mut ProcessHttpStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<HttpMessage>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        stack.handle_http_incoming(connection).await
    }

    /// Wrap the outgoing half of the handshake exchange.
    async fn process_http_outgoing(
        &self,
        stack: &mut ProcessHttpStack<T>,
        connection: &mut Connection<T>,
        message: HttpMessage,
    ) -> Result<HttpMessage>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        stack.handle_http_outgoing(connection, message).await
    }

    /// Periodic upkeep, driven by the server poll cycle or the embedding
    /// application.
    async fn process_tick(
        &self,
        stack: &mut ProcessTickStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        stack.handle_tick(connection).await
    }
}

/// Continuation for message events: the pending interceptors plus the
/// codec terminal.
pub struct ProcessStack<T> {
    chain: Vec<Arc<dyn Middleware<T>>>,
    cursor: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProcessStack<T> {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware<T>>>) -> Self {
        Self { chain, cursor: 0 }
    }

    fn next_interceptor(&mut self) -> Option<Arc<dyn Middleware<T>>> {
        let interceptor = self.chain.get(self.cursor).cloned();
        if interceptor.is_some() {
            self.cursor += 1;
        }
        interceptor
    }

    /// Proceed: run the next pending interceptor, or read one message off
    /// the wire once the chain is exhausted.
    pub async fn handle_incoming(&mut self, connection: &mut Connection<T>) -> Result<Message> {
        match self.next_interceptor() {
            Some(interceptor) => interceptor.process_incoming(self, connection).await,
            None => connection.pull_message().await,
        }
    }

    /// Proceed: run the next pending interceptor, or fragment and write the
    /// message once the chain is exhausted.
    pub async fn handle_outgoing(
        &mut self,
        connection: &mut Connection<T>,
        message: Message,
    ) -> Result<Message> {
        match self.next_interceptor() {
            Some(interceptor) => interceptor.process_outgoing(self, connection, message).await,
            None => connection.write_message(message).await,
        }
    }
}

/// Continuation for handshake events: the pending interceptors plus the
/// HTTP reader/writer terminal.
pub struct ProcessHttpStack<T> {
    chain: Vec<Arc<dyn Middleware<T>>>,
    cursor: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProcessHttpStack<T> {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware<T>>>) -> Self {
        Self { chain, cursor: 0 }
    }

    fn next_interceptor(&mut self) -> Option<Arc<dyn Middleware<T>>> {
        let interceptor = self.chain.get(self.cursor).cloned();
        if interceptor.is_some() {
            self.cursor += 1;
        }
        interceptor
    }

    /// Proceed towards reading one HTTP message head.
    pub async fn handle_http_incoming(
        &mut self,
        connection: &mut Connection<T>,
    ) -> Result<HttpMessage> {
        match self.next_interceptor() {
            Some(interceptor) => interceptor.process_http_incoming(self, connection).await,
            None => connection.pull_http().await,
        }
    }

    /// Proceed towards writing one HTTP message head.
    pub async fn handle_http_outgoing(
        &mut self,
        connection: &mut Connection<T>,
        message: HttpMessage,
    ) -> Result<HttpMessage> {
        match self.next_interceptor() {
            Some(interceptor) => {
                interceptor
                    .process_http_outgoing(self, connection, message)
                    .await
            }
            None => connection.push_http(message).await,
        }
    }
}

/// Continuation for tick events. The terminal action is a no-op.
pub struct ProcessTickStack<T> {
    chain: Vec<Arc<dyn Middleware<T>>>,
    cursor: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProcessTickStack<T> {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware<T>>>) -> Self {
        Self { chain, cursor: 0 }
    }

    fn next_interceptor(&mut self) -> Option<Arc<dyn Middleware<T>>> {
        let interceptor = self.chain.get(self.cursor).cloned();
        if interceptor.is_some() {
            self.cursor += 1;
        }
        interceptor
    }

    /// Proceed: run the next pending interceptor's tick hook.
    pub async fn handle_tick(&mut self, connection: &mut Connection<T>) -> Result<()> {
        match self.next_interceptor() {
            Some(interceptor) => interceptor.process_tick(self, connection).await,
            None => Ok(()),
        }
    }
}

/// The default chain both roles start with. Close handling is always
/// installed; keepalive pings ([`PingInterval`]) are opt-in. User
/// middleware appends after this.
pub(crate) fn default_chain<T>() -> Vec<Arc<dyn Middleware<T>>>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    vec![Arc::new(CloseHandler) as Arc<dyn Middleware<T>>]
}
