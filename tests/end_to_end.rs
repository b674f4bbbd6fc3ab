//! End-to-end flows over real TCP: handshake, echo traffic, the close
//! sequence, masking enforcement and keepalive ticks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use wspipe::{
    Callback, Client, Config, EventHandler, Message, Middleware, PingInterval, Server,
    ServerConnection,
};

/// Records dispatched events; echoes text when asked to.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    echo: bool,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_connect(&mut self, connection: &mut ServerConnection) {
        assert!(connection.handshake().is_some());
        self.events.push("connect".into());
        if let Some(auth) = connection
            .handshake()
            .and_then(|h| h.request.header("Authorization"))
        {
            self.events.push(format!("auth:{auth}"));
        }
    }

    async fn on_disconnect(&mut self, _connection: &mut ServerConnection) {
        self.events.push("disconnect".into());
    }

    async fn on_text(&mut self, connection: &mut ServerConnection, text: String) {
        self.events.push(format!("text:{text}"));
        if self.echo {
            let _ = connection.send(Message::Text(text)).await;
        }
    }

    async fn on_binary(&mut self, _connection: &mut ServerConnection, data: Vec<u8>) {
        self.events.push(format!("binary:{}", data.len()));
    }

    async fn on_close(
        &mut self,
        _connection: &mut ServerConnection,
        reason: Option<wspipe::CloseReason>,
    ) {
        self.events
            .push(format!("close:{}", reason.map_or(0, |r| r.status)));
    }

    async fn on_error(&mut self, _connection: &mut ServerConnection, error: &wspipe::Error) {
        self.events.push(format!("error:{:?}", error.kind()));
    }
}

async fn bound_server(config: &Config) -> (Server, Url) {
    let server = Server::bind("127.0.0.1:0", config.clone())
        .await
        .unwrap()
        .with_poll_timeout(Duration::from_secs(5));
    let addr = server.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}/chat")).unwrap();
    (server, url)
}

fn spawn_connect(url: &Url, config: &Config) -> tokio::task::JoinHandle<wspipe::Result<Client>> {
    let url = url.clone();
    let config = config.clone();
    tokio::spawn(async move { Client::connect(&url, config).await })
}

#[tokio::test]
async fn test_echo_roundtrip_and_close_sequence() {
    let config = Config::default();
    let (mut server, url) = bound_server(&config).await;
    let mut handler = Recorder {
        echo: true,
        ..Recorder::default()
    };

    let connecting = spawn_connect(&url, &config);
    server.poll(&mut handler).await.unwrap();
    let mut client = connecting.await.unwrap().unwrap();
    assert_eq!(server.connection_count(), 1);
    assert!(client.handshake().is_some());

    client.send(Message::text("hello")).await.unwrap();
    server.poll(&mut handler).await.unwrap();
    assert_eq!(client.receive().await.unwrap(), Message::text("hello"));

    // Local close shuts only the write direction until the peer answers.
    client.close(1000, "bye").await.unwrap();
    assert!(!client.connection().is_writable());
    assert!(client.connection().is_readable());

    // The server acknowledges, disconnects its side and drops the entry.
    server.poll(&mut handler).await.unwrap();
    assert_eq!(server.connection_count(), 0);

    // The acknowledgement completes the client's close handshake.
    let ack = client.receive().await.unwrap();
    assert!(ack.is_close());
    assert!(!client.is_connected());

    assert_eq!(
        handler.events,
        vec!["connect", "text:hello", "close:1000", "disconnect"]
    );
}

#[tokio::test]
async fn test_handshake_passes_through_middleware_both_ways() {
    let config = Config::default();
    let mut server = Server::bind("127.0.0.1:0", config.clone())
        .await
        .unwrap()
        .with_poll_timeout(Duration::from_secs(5))
        .with_middleware(Arc::new(Callback::new().on_http_outgoing(
            |stack, connection, mut message| {
                Box::pin(async move {
                    message.push_header("X-Server-Stamp", "wspipe");
                    stack.handle_http_outgoing(connection, message).await
                })
            },
        )));
    let addr = server.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}/chat")).unwrap();
    let mut handler = Recorder::default();

    let client_middleware: Vec<Arc<dyn Middleware<TcpStream>>> =
        vec![Arc::new(Callback::new().on_http_outgoing(
            |stack, connection, mut message| {
                Box::pin(async move {
                    message.push_header("X-Client-Stamp", "present");
                    stack.handle_http_outgoing(connection, message).await
                })
            },
        ))];
    let connecting = {
        let url = url.clone();
        let config = config.clone();
        tokio::spawn(
            async move { Client::connect_with(&url, config, client_middleware, &[]).await },
        )
    };
    server.poll(&mut handler).await.unwrap();
    let client = connecting.await.unwrap().unwrap();

    // The client sees the header the server middleware added.
    let handshake = client.handshake().unwrap();
    assert_eq!(
        handshake.response.header("X-Server-Stamp").as_deref(),
        Some("wspipe")
    );
    assert_eq!(
        handshake.response.header("Sec-WebSocket-Accept").as_deref(),
        Some(handshake.accept.as_str())
    );
}

#[tokio::test]
async fn test_caller_headers_reach_the_server() {
    let config = Config::default();
    let (mut server, url) = bound_server(&config).await;
    let mut handler = Recorder::default();

    let connecting = {
        let url = url.clone();
        let config = config.clone();
        let headers = vec![("Authorization".to_string(), "Bearer xyz".to_string())];
        tokio::spawn(async move { Client::connect_with(&url, config, Vec::new(), &headers).await })
    };
    server.poll(&mut handler).await.unwrap();
    connecting.await.unwrap().unwrap();

    assert_eq!(handler.events, vec!["connect", "auth:Bearer xyz"]);
}

#[tokio::test]
async fn test_unmasked_client_is_closed_with_1002() {
    let config = Config::default();
    let (mut server, url) = bound_server(&config).await;
    let mut handler = Recorder::default();

    // Raw transport: handshake by hand, then an unmasked text frame.
    let addr = server.local_addr().unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /chat HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        url.host_str().unwrap()
    );
    raw.write_all(request.as_bytes()).await.unwrap();
    server.poll(&mut handler).await.unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(raw.read_u8().await.unwrap());
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101"));
    assert!(head.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));

    raw.write_all(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o'])
        .await
        .unwrap();
    server.poll(&mut handler).await.unwrap();
    assert_eq!(server.connection_count(), 0);
    assert_eq!(
        handler.events,
        vec!["connect", "error:Protocol", "disconnect"]
    );

    // The close frame sent before disconnecting carries status 1002.
    let mut header = [0u8; 2];
    raw.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x88);
    let mut payload = vec![0u8; (header[1] & 0x7F) as usize];
    raw.read_exact(&mut payload).await.unwrap();
    assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);
    assert_eq!(&payload[2..], b"Masking required");
}

#[tokio::test]
async fn test_poll_tick_drives_keepalive_pings() {
    let config = Config::default();
    let mut server = Server::bind("127.0.0.1:0", config.clone())
        .await
        .unwrap()
        .with_poll_timeout(Duration::from_millis(50))
        .with_middleware(Arc::new(PingInterval::new(Some(Duration::ZERO))));
    let addr = server.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}/")).unwrap();
    let mut handler = Recorder::default();

    let connecting = spawn_connect(&url, &config);
    server.poll(&mut handler).await.unwrap();
    let mut client = connecting.await.unwrap().unwrap();

    // The tick pass of the accept cycle already pushed a ping.
    assert_eq!(client.receive().await.unwrap(), Message::ping(Vec::new()));
}

#[tokio::test]
async fn test_fragmented_message_reassembled_across_the_wire() {
    let config = Config::default().with_fragment_size(3);
    let (mut server, url) = bound_server(&config).await;
    let mut handler = Recorder::default();

    let connecting = spawn_connect(&url, &config);
    server.poll(&mut handler).await.unwrap();
    let mut client = connecting.await.unwrap().unwrap();

    client
        .send(Message::text("fragmented message body"))
        .await
        .unwrap();
    server.poll(&mut handler).await.unwrap();

    assert_eq!(
        handler.events,
        vec!["connect", "text:fragmented message body"]
    );
}
