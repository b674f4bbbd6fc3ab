//! WebSocket client: direct dial plus the upgrade handshake.

use std::sync::Arc;

use tokio::net::TcpStream;
use url::Url;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::middleware::{Middleware, default_chain};
use crate::protocol::Handshake;
use crate::protocol::handshake;

/// A connected WebSocket client.
///
/// Dials a `ws://` URL, performs the upgrade handshake through the
/// middleware pipeline and wraps the resulting [`Connection`]. TLS is the
/// transport's concern and not provided here, so `wss://` URLs are
/// rejected.
///
/// ## Example
///
/// ```rust,ignore
/// use url::Url;
/// use wspipe::{Client, Config, Message};
///
/// let url = Url::parse("ws://127.0.0.1:8025/chat")?;
/// let mut client = Client::connect(&url, Config::default()).await?;
/// client.send(Message::text("hello")).await?;
/// let reply = client.receive().await?;
/// client.close(1000, "done").await?;
/// ```
pub struct Client {
    connection: Connection<TcpStream>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Dial `url` and perform the handshake with the default middleware
    /// chain and no extra headers.
    pub async fn connect(url: &Url, config: Config) -> Result<Self> {
        Self::connect_with(url, config, Vec::new(), &[]).await
    }

    /// Dial `url` with user middleware (appended after the default chain)
    /// and caller-supplied handshake headers.
    pub async fn connect_with(
        url: &Url,
        config: Config,
        middleware: Vec<Arc<dyn Middleware<TcpStream>>>,
        headers: &[(String, String)],
    ) -> Result<Self> {
        if url.scheme() != "ws" {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported scheme: {} (the plain TCP transport speaks ws only)",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidHandshake("URL has no host".into()))?;
        let port = url.port().unwrap_or(80);
        let stream = TcpStream::connect((host, port)).await?;
        Self::upgrade(stream, url, config, middleware, headers).await
    }

    /// Run the client handshake over an already-established transport.
    pub async fn upgrade(
        stream: TcpStream,
        url: &Url,
        config: Config,
        middleware: Vec<Arc<dyn Middleware<TcpStream>>>,
        headers: &[(String, String)],
    ) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidHandshake("URL has no host".into()))?;
        let host_header = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let mut target = url.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let local_addr = stream.local_addr().ok();
        let peer_addr = stream.peer_addr().ok();
        let mut connection = Connection::new(stream, Role::Client, config);
        connection.set_addresses(local_addr, peer_addr);
        for interceptor in default_chain() {
            connection.add_middleware(interceptor);
        }
        for interceptor in middleware {
            connection.add_middleware(interceptor);
        }

        log::debug!("[client] upgrading connection to {url}");
        let key = handshake::generate_key();
        let request = handshake::build_request(&target, &host_header, &key, headers);
        let request = connection.send_http(request).await?;
        let response = connection.receive_http().await?;
        match handshake::validate_response(&response, &key) {
            Ok(accept) => {
                log::debug!("[client] connection established");
                connection.set_handshake(Handshake {
                    request,
                    response,
                    key,
                    accept,
                });
                Ok(Self { connection })
            }
            Err(err) => {
                connection.disconnect().await;
                Err(err)
            }
        }
    }

    /// Send a message.
    pub async fn send(&mut self, message: Message) -> Result<Message> {
        self.connection.send(message).await
    }

    /// Receive the next message.
    pub async fn receive(&mut self) -> Result<Message> {
        self.connection.receive().await
    }

    /// Initiate the close handshake.
    pub async fn close(&mut self, status: u16, reason: impl Into<String>) -> Result<Message> {
        self.connection.close(status, reason).await
    }

    /// Release the transport immediately.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
    }

    /// Run one tick through the middleware chain.
    pub async fn tick(&mut self) -> Result<()> {
        self.connection.tick().await
    }

    /// Whether the transport is still held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The completed upgrade exchange.
    #[must_use]
    pub fn handshake(&self) -> Option<&Handshake> {
        self.connection.handshake()
    }

    /// Direct access to the underlying connection.
    pub fn connection(&mut self) -> &mut Connection<TcpStream> {
        &mut self.connection
    }
}
