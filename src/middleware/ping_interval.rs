//! Keepalive interceptor: unsolicited pings on an interval.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::Result;
use crate::message::Message;
use crate::middleware::{Middleware, ProcessStack, ProcessTickStack};

/// Deadline for the next unsolicited ping, stored in connection metadata.
#[derive(Debug, Clone, Copy)]
struct NextPingAt(Instant);

/// Sends a ping on tick whenever the connection has been send-idle for the
/// configured interval.
///
/// Every outgoing message pushes the deadline out, so pings only fill the
/// gaps. Without an explicit interval, the connection timeout is used, so a
/// peer applying the same timeout never sees this end go quiet.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingInterval {
    interval: Option<Duration>,
}

impl PingInterval {
    /// Create the interceptor. `None` defers to the connection timeout.
    #[must_use]
    pub fn new(interval: Option<Duration>) -> Self {
        Self { interval }
    }

    fn schedule_next<T>(&self, connection: &mut Connection<T>) -> Instant {
        let interval = self.interval.unwrap_or_else(|| connection.timeout());
        let next = Instant::now() + interval;
        connection.set_meta(NextPingAt(next));
        next
    }

    fn next_ping_at<T>(&self, connection: &mut Connection<T>) -> Instant {
        match connection.get_meta::<NextPingAt>() {
            Some(NextPingAt(at)) => *at,
            None => self.schedule_next(connection),
        }
    }
}

#[async_trait]
impl<T> Middleware<T> for PingInterval
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn process_outgoing(
        &self,
        stack: &mut ProcessStack<T>,
        connection: &mut Connection<T>,
        message: Message,
    ) -> Result<Message> {
        // Any outgoing traffic counts as liveness.
        self.schedule_next(connection);
        stack.handle_outgoing(connection, message).await
    }

    async fn process_tick(
        &self,
        stack: &mut ProcessTickStack<T>,
        connection: &mut Connection<T>,
    ) -> Result<()> {
        let due = self.next_ping_at(connection);
        if connection.is_writable() && Instant::now() >= due {
            log::debug!("[ping-interval] auto-pushing ping");
            connection.push_message(Message::ping(Vec::new())).await?;
            self.schedule_next(connection);
        }
        stack.handle_tick(connection).await
    }
}
