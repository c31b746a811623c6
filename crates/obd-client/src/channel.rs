//! Synchronous command/response exchange over the adapter link

use crate::error::LinkError;
use crate::transport::LinkStream;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace};

/// End-of-response marker sent by the adapter
pub const RESPONSE_PROMPT: u8 = b'>';

/// Window after which the receive buffer is considered drained
const DRAIN_IDLE: Duration = Duration::from_millis(1);

/// Outcome of one command/response exchange.
///
/// A partial or empty read is not an error by itself; callers infer
/// failure from the absence of expected content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Prompt character seen; full response accumulated
    Complete(String),
    /// Timeout expired with some bytes accumulated
    Partial(String),
    /// Timeout expired with nothing read
    Timeout,
}

impl ReadOutcome {
    /// Accumulated response text (empty on timeout)
    pub fn text(&self) -> &str {
        match self {
            ReadOutcome::Complete(text) | ReadOutcome::Partial(text) => text,
            ReadOutcome::Timeout => "",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ReadOutcome::Complete(_))
    }
}

/// Command channel over an established link.
///
/// Owns the byte stream for the lifetime of one connection.
pub struct CommandChannel {
    stream: LinkStream,
    timeout: Duration,
}

impl CommandChannel {
    pub fn new(stream: LinkStream, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    /// Set the per-command response timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Send a command and collect the response up to the `>` prompt or the
    /// per-command timeout, whichever comes first.
    ///
    /// Unread bytes from a previous exchange are discarded before sending
    /// so a stale response cannot be attributed to this command.
    pub async fn send(&mut self, command: &str) -> Result<ReadOutcome, LinkError> {
        self.drain_stale().await?;

        debug!("Sending command: {:?}", command);
        let mut framed = Vec::with_capacity(command.len() + 1);
        framed.extend_from_slice(command.as_bytes());
        framed.push(b'\r');
        self.stream.write_all(&framed).await?;

        self.read_response().await
    }

    /// Discard whatever is sitting in the receive buffer
    async fn drain_stale(&mut self) -> Result<(), LinkError> {
        let mut buf = [0u8; 256];
        loop {
            match tokio::time::timeout(DRAIN_IDLE, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => return Err(LinkError::Disconnected),
                Ok(Ok(n)) => trace!("Discarded {} stale bytes", n),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(()),
            }
        }
    }

    async fn read_response(&mut self) -> Result<ReadOutcome, LinkError> {
        let deadline = Instant::now() + self.timeout;
        let mut accumulated: Vec<u8> = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => return Err(LinkError::Disconnected),
                Ok(Ok(n)) => {
                    accumulated.extend_from_slice(&buf[..n]);
                    if accumulated.contains(&RESPONSE_PROMPT) {
                        let text = String::from_utf8_lossy(&accumulated).into_owned();
                        debug!("Complete response: {:?}", text);
                        return Ok(ReadOutcome::Complete(text));
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        if accumulated.is_empty() {
            debug!("Response timed out with no data");
            Ok(ReadOutcome::Timeout)
        } else {
            let text = String::from_utf8_lossy(&accumulated).into_owned();
            debug!("Partial response after timeout: {:?}", text);
            Ok(ReadOutcome::Partial(text))
        }
    }
}
