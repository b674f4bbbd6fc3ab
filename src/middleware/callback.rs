//! Generic interceptor driven by externally supplied closures.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::Result;
use crate::message::Message;
use crate::middleware::{Middleware, ProcessHttpStack, ProcessStack, ProcessTickStack};
use crate::protocol::http::HttpMessage;

/// Hook closure for incoming messages.
pub type IncomingFn<T> = Box<
    dyn for<'a> Fn(&'a mut ProcessStack<T>, &'a mut Connection<T>) -> BoxFuture<'a, Result<Message>>
        + Send
        + Sync,
>;

/// Hook closure for outgoing messages.
pub type OutgoingFn<T> = Box<
    dyn for<'a> Fn(
            &'a mut ProcessStack<T>,
            &'a mut Connection<T>,
            Message,
        ) -> BoxFuture<'a, Result<Message>>
        + Send
        + Sync,
>;

/// Hook closure for the incoming handshake half.
pub type HttpIncomingFn<T> = Box<
    dyn for<'a> Fn(
            &'a mut ProcessHttpStack<T>,
            &'a mut Connection<T>,
        ) -> BoxFuture<'a, Result<HttpMessage>>
        + Send
        + Sync,
>;

/// Hook closure for the outgoing handshake half.
pub type HttpOutgoingFn<T> = Box<
    dyn for<'a> Fn(
            &'a mut ProcessHttpStack<T>,
            &'a mut Connection<T>,
            HttpMessage,
        ) -> BoxFuture<'a, Result<HttpMessage>>
        + Send
        + Sync,
>;

/// Hook closure for ticks.
pub type TickFn<T> = Box<
    dyn for<'a> Fn(&'a mut ProcessTickStack<T>, &'a mut Connection<T>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
>;

/// An interceptor whose five hooks are externally supplied closures.
///
/// Any hook left unset is pure pass-through. Each closure receives the
/// stack and the connection exactly like a [`Middleware`] implementation
/// would, and returns a boxed future:
///
/// ```rust,ignore
/// let callback = Callback::new().on_incoming(|stack, conn| {
///     Box::pin(async move {
///         let message = stack.handle_incoming(conn).await?;
///         log::info!("saw {message:?}");
///         Ok(message)
///     })
/// });
/// ```
pub struct Callback<T> {
    incoming: Option<IncomingFn<T>>,
    outgoing: Option<OutgoingFn<T>>,
    http_incoming: Option<HttpIncomingFn<T>>,
    http_outgoing: Option<HttpOutgoingFn<T>>,
    tick: Option<TickFn<T>>,
}

impl<T> Default for Callback<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Callback<T> {
    /// Create a pass-through callback with no hooks attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            incoming: None,
            outgoing: None,
            http_incoming: None,
            http_outgoing: None,
            tick: None,
        }
    }

    /// Attach the incoming-message hook.
    #[must_use]
    pub fn on_incoming<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut ProcessStack<T>, &'a mut Connection<T>) -> BoxFuture<'a, Result<Message>>
            + Send
            + Sync
            + 'static,
    {
        self.incoming = Some(Box::new(hook));
        self
    }

    /// Attach the outgoing-message hook.
    #[must_use]
    pub fn on_outgoing<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut ProcessStack<T>,
                &'a mut Connection<T>,
                Message,
            ) -> BoxFuture<'a, Result<Message>>
            + Send
            + Sync
            + 'static,
    {
        self.outgoing = Some(Box::new(hook));
        self
    }

    /// Attach the incoming-handshake hook.
    #[must_use]
    pub fn on_http_incoming<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut ProcessHttpStack<T>,
                &'a mut Connection<T>,
            ) -> BoxFuture<'a, Result<HttpMessage>>
            + Send
            + Sync
            + 'static,
    {
        self.http_incoming = Some(Box::new(hook));
        self
    }

    /// Attach the outgoing-handshake hook.
    #[must_use]
    pub fn on_http_outgoing<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut ProcessHttpStack<T>,
                &'a mut Connection<T>,
                HttpMessage,
            ) -> BoxFuture<'a, Result<HttpMessage>>
            + Send
            + Sync
            + 'static,
    {
        self.http_outgoing = Some(Box::new(hook));
        self
    }

    /// Attach the tick hook.
    #[must_use]
    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut ProcessTickStack<T>, &'a mut Connection<T>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.tick = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl<T> Middleware<T> for Callback<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn process_incoming(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<Message> {
        match &self.incoming {
            Some(hook) => hook(stack, connection).await,
            None => stack.handle_incoming(connection).await,
        }
    }

    async fn process_outgoing(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
        message: Message,
    ) -> Result<Message> {
        match &self.outgoing {
            Some(hook) => hook(stack, connection, message).await,
            None => stack.handle_outgoing(connection, message).await,
        }
    }

    async fn process_http_incoming(
        &self,
        stack: &mut ProcessHttpStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<HttpMessage> {
        match &self.http_incoming {
            Some(hook) => hook(stack, connection).await,
            None => stack.handle_http_incoming(connection).await,
        }
    }

    async fn process_http_outgoing(
        &self,
        stack: &mut ProcessHttpStack<T>,
        connection: &mut Connection<T>,
        message: HttpMessage,
    ) -> Result<HttpMessage> {
        match &self.http_outgoing {
            Some(hook) => hook(stack, connection, message).await,
            None => stack.handle_http_outgoing(connection, message).await,
        }
    }

    async fn process_tick(
        &self,
        stack: &mut ProcessTickStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<()> {
        match &self.tick {
            Some(hook) => hook(stack, connection).await,
            None => stack.handle_tick(connection).await,
        }
    }
}
