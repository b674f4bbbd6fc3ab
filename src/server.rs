//! Server multiplexer: one listening socket plus the set of live
//! connections, serviced by a readiness-polled cycle.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::select_all;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::message::{CloseReason, Message};
use crate::middleware::{Middleware, default_chain};
use crate::protocol::handshake::{self, Handshake};
use crate::protocol::http::HttpMessage;

/// A server-side connection, concrete over TCP.
pub type ServerConnection = Connection<TcpStream>;

/// The canonical event-registration surface of the server.
///
/// Every hook defaults to a no-op; the embedding application overrides the
/// events it cares about and replies through the connection it is handed.
#[async_trait]
pub trait EventHandler: Send {
    /// A connection completed its handshake and joined the registry.
    async fn on_connect(&mut self, _connection: &mut ServerConnection) {}

    /// A connection left the registry; the transport is already released.
    async fn on_disconnect(&mut self, _connection: &mut ServerConnection) {}

    /// A text message arrived.
    async fn on_text(&mut self, _connection: &mut ServerConnection, _text: String) {}

    /// A binary message arrived.
    async fn on_binary(&mut self, _connection: &mut ServerConnection, _data: Vec<u8>) {}

    /// A ping arrived (the pong reply is already on the wire).
    async fn on_ping(&mut self, _connection: &mut ServerConnection, _payload: Vec<u8>) {}

    /// A pong arrived.
    async fn on_pong(&mut self, _connection: &mut ServerConnection, _payload: Vec<u8>) {}

    /// A close message arrived; the close handshake has been driven by the
    /// middleware chain.
    async fn on_close(&mut self, _connection: &mut ServerConnection, _reason: Option<CloseReason>) {}

    /// Receiving on this connection failed. Fatal errors remove the
    /// connection right after this hook.
    async fn on_error(&mut self, _connection: &mut ServerConnection, _error: &Error) {}

    /// One tick of periodic upkeep, dispatched to every connection at the
    /// end of each poll cycle.
    async fn on_tick(&mut self, _connection: &mut ServerConnection) {}
}

enum Ready {
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Readable(u64),
}

/// The multiplexer: owns the listener and the registry of established
/// connections.
///
/// [`poll`](Server::poll) runs exactly one cycle and returns, so the
/// embedding application stays in control of the loop; stopping is as
/// simple as not calling it again.
///
/// ## Example
///
/// ```rust,ignore
/// use wspipe::{Config, Server};
///
/// let mut server = Server::bind("127.0.0.1:8025", Config::default()).await?;
/// let mut handler = EchoHandler;
/// while running {
///     server.poll(&mut handler).await?;
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    connections: BTreeMap<u64, ServerConnection>,
    next_id: u64,
    config: Config,
    middleware: Vec<Arc<dyn Middleware<TcpStream>>>,
    poll_timeout: Duration,
}

impl Server {
    /// Bind a listening socket.
    pub async fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wrap an already-bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener, config: Config) -> Self {
        let poll_timeout = config.timeout;
        Self {
            listener,
            connections: BTreeMap::new(),
            next_id: 0,
            config,
            middleware: Vec::new(),
            poll_timeout,
        }
    }

    /// Append an interceptor installed on every accepted connection, after
    /// the default chain.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware<TcpStream>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Set how long one poll cycle blocks when nothing is ready.
    ///
    /// Defaults to the configured connection timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// The listener's local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of established connections in the registry.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run one polling cycle.
    ///
    /// Blocks until the listener or a connection is ready (bounded by the
    /// poll timeout), services the ready handle, then dispatches one tick
    /// through every still-registered connection. Per-connection failures
    /// reach [`EventHandler::on_error`] without aborting the cycle; only
    /// listener failures propagate.
    pub async fn poll<H: EventHandler>(&mut self, handler: &mut H) -> Result<()> {
        match self.wait_ready().await {
            Some(Ready::Accepted(Ok((stream, addr)))) => {
                self.accept_connection(stream, addr, handler).await;
            }
            Some(Ready::Accepted(Err(err))) => return Err(err.into()),
            Some(Ready::Readable(id)) => self.service_connection(id, handler).await,
            None => {}
        }
        self.dispatch_ticks(handler).await;
        Ok(())
    }

    /// Close every registered connection and empty the registry.
    pub async fn disconnect_all(&mut self) {
        for (_, mut connection) in std::mem::take(&mut self.connections) {
            connection.disconnect().await;
        }
    }

    /// Block until the listener or any connection reports readiness.
    /// Handle order is registration order, stable within a cycle.
    async fn wait_ready(&self) -> Option<Ready> {
        let mut pending: Vec<Pin<Box<dyn Future<Output = Ready> + Send + '_>>> =
            Vec::with_capacity(self.connections.len() + 1);
        pending.push(Box::pin(async {
            Ready::Accepted(self.listener.accept().await)
        }));
        for (id, connection) in &self.connections {
            pending.push(Box::pin(async move {
                connection.await_readable().await;
                Ready::Readable(*id)
            }));
        }
        match tokio::time::timeout(self.poll_timeout, select_all(pending)).await {
            Ok((ready, _, _)) => Some(ready),
            Err(_) => None,
        }
    }

    async fn accept_connection<H: EventHandler>(
        &mut self,
        stream: TcpStream,
        addr: SocketAddr,
        handler: &mut H,
    ) {
        log::debug!("[server] incoming transport from {addr}");
        match self.upgrade(stream, addr).await {
            Ok(mut connection) => {
                handler.on_connect(&mut connection).await;
                let id = self.next_id;
                self.next_id += 1;
                self.connections.insert(id, connection);
            }
            Err(err) => log::warn!("[server] handshake with {addr} failed: {err}"),
        }
    }

    /// Perform the server side of the upgrade on a fresh transport.
    async fn upgrade(&self, stream: TcpStream, addr: SocketAddr) -> Result<ServerConnection> {
        let local_addr = stream.local_addr().ok();
        let mut connection = Connection::new(stream, Role::Server, self.config.clone());
        connection.set_addresses(local_addr, Some(addr));
        for interceptor in default_chain() {
            connection.add_middleware(interceptor);
        }
        for interceptor in &self.middleware {
            connection.add_middleware(interceptor.clone());
        }

        let request = connection.receive_http().await?;
        let key = match handshake::validate_request(&request) {
            Ok(key) => key,
            Err(err) => {
                let _ = connection
                    .push_http(HttpMessage::response(400, "Bad Request"))
                    .await;
                connection.disconnect().await;
                return Err(err);
            }
        };
        let accept = handshake::compute_accept_key(&key);
        let response = connection.send_http(handshake::build_response(&accept)).await?;
        connection.set_handshake(Handshake {
            request,
            response,
            key,
            accept,
        });
        log::debug!("[server] connection from {addr} established");
        Ok(connection)
    }

    /// Receive one message from a ready connection and dispatch it.
    async fn service_connection<H: EventHandler>(&mut self, id: u64, handler: &mut H) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        match connection.receive().await {
            Ok(Message::Text(text)) => handler.on_text(connection, text).await,
            Ok(Message::Binary(data)) => handler.on_binary(connection, data).await,
            Ok(Message::Ping(payload)) => handler.on_ping(connection, payload).await,
            Ok(Message::Pong(payload)) => handler.on_pong(connection, payload).await,
            Ok(Message::Close(reason)) => handler.on_close(connection, reason).await,
            Err(Error::Timeout) => {
                log::trace!("[server] spurious readiness on connection {id}");
            }
            Err(err) => handler.on_error(connection, &err).await,
        }

        let gone = !self
            .connections
            .get(&id)
            .is_some_and(|connection| connection.is_connected());
        if gone {
            if let Some(mut connection) = self.connections.remove(&id) {
                log::debug!("[server] removing connection {id}");
                handler.on_disconnect(&mut connection).await;
            }
        }
    }

    /// Dispatch one tick to every still-registered connection.
    async fn dispatch_ticks<H: EventHandler>(&mut self, handler: &mut H) {
        let ids: Vec<u64> = self.connections.keys().copied().collect();
        for id in ids {
            let mut gone = false;
            if let Some(connection) = self.connections.get_mut(&id) {
                if let Err(err) = connection.tick().await {
                    handler.on_error(connection, &err).await;
                }
                handler.on_tick(connection).await;
                gone = !connection.is_connected();
            }
            if gone {
                if let Some(mut connection) = self.connections.remove(&id) {
                    log::debug!("[server] removing connection {id}");
                    handler.on_disconnect(&mut connection).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0", Config::default()).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_idle() {
        let mut server = Server::bind("127.0.0.1:0", Config::default())
            .await
            .unwrap()
            .with_poll_timeout(Duration::from_millis(20));

        struct Nop;
        impl EventHandler for Nop {}

        // No traffic: the cycle returns after the poll timeout.
        server.poll(&mut Nop).await.unwrap();
        assert_eq!(server.connection_count(), 0);
    }
}
