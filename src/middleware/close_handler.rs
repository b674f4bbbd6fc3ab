//! Close-handshake interceptor.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::Result;
use crate::message::{Message, close_status};
use crate::middleware::{Middleware, ProcessStack};

/// Drives the half-close state machine around close messages.
///
/// Incoming close while still writable: the read direction shuts and an
/// acknowledgement close is pushed; that acknowledgement passes back out
/// through [`process_outgoing`](Middleware::process_outgoing), which sees
/// the read direction already down and completes the disconnect. Incoming
/// close while not writable is the peer's acknowledgement of our own close,
/// so the connection disconnects. Outgoing close while still readable only
/// shuts the write direction, awaiting the peer's acknowledgement.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloseHandler;

#[async_trait]
impl<T> Middleware<T> for CloseHandler
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn process_incoming(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<Message> {
        let message = stack.handle_incoming(connection).await?;
        let Message::Close(reason) = &message else {
            return Ok(message);
        };
        if connection.is_writable() {
            let status = reason.as_ref().map_or(close_status::NORMAL, |r| r.status);
            log::debug!("[close-handler] received close, status: {status}");
            connection.close_read();
            let ack = Message::close(status, format!("Close acknowledged: {status}"));
            connection.push_message(ack).await?;
        } else {
            log::debug!("[close-handler] received close acknowledgement, disconnecting");
            connection.disconnect().await;
        }
        Ok(message)
    }

    async fn process_outgoing(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
        message: Message,
    ) -> Result<Message> {
        let message = stack.handle_outgoing(connection, message).await?;
        if !message.is_close() {
            return Ok(message);
        }
        if connection.is_readable() {
            log::debug!("[close-handler] sent close, awaiting acknowledgement");
            connection.close_write();
        } else {
            log::debug!("[close-handler] sent close acknowledgement, disconnecting");
            connection.disconnect().await;
        }
        Ok(message)
    }
}
