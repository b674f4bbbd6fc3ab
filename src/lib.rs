//! # wspipe - WebSocket Protocol Engine with a Middleware Pipeline
//!
//! `wspipe` is an RFC 6455 compliant WebSocket engine usable as both client
//! and server.
//!
//! ## Features
//!
//! - **Bit-exact frame codec** with streaming, length-driven decoding
//! - **Fragmented message reassembly** with strict ordering rules
//! - **Half-close state machine** with independent read/write directions
//! - **HTTP upgrade handshake** for both roles
//! - **Composable middleware pipeline** wrapping messages, handshakes and
//!   ticks, with close handling and keepalive pings built on it
//! - **Server multiplexer** polling many connections in one cooperative
//!   cycle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use url::Url;
//! use wspipe::{Client, Config, Message};
//!
//! let url = Url::parse("ws://127.0.0.1:8025/chat")?;
//! let mut client = Client::connect(&url, Config::default()).await?;
//! client.send(Message::text("Hello")).await?;
//! println!("{:?}", client.receive().await?);
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod middleware;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use codec::FrameCodec;
pub use config::{Config, Limits};
pub use connection::{Connection, ConnectionState, MetaMap, Role};
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseReason, Message, close_status};
pub use middleware::{
    Callback, CloseHandler, Middleware, PingInterval, ProcessHttpStack, ProcessStack,
    ProcessTickStack,
};
pub use protocol::{Frame, Handshake, HttpMessage, OpCode, WS_GUID, compute_accept_key};
pub use server::{EventHandler, Server, ServerConnection};
