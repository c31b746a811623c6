//! Scripted in-memory adapter for testing (no hardware required)
//!
//! [`ScriptedAdapter`] plays the interpreter side of the protocol over an
//! in-memory duplex stream; [`ScriptedConnector`] hands a fresh adapter to
//! each connection attempt, or refuses it.

use crate::error::LinkError;
use crate::transport::{Connector, LinkStream};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// What the adapter does with one received command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with this exact text
    Text(String),
    /// Say nothing and let the caller time out
    Silent,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

/// Commands received by the adapter, in arrival order
pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// One scripted adapter session.
///
/// Unscripted AT commands answer `OK`; unscripted data commands answer
/// `NO DATA`, so a fresh adapter connects but reports nothing.
pub struct ScriptedAdapter {
    replies: HashMap<String, Reply>,
    fallback: Reply,
    log: CommandLog,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            fallback: Reply::text("NO DATA\r>"),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script a reply for one command
    pub fn on(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    /// Replace the fallback reply for unscripted data commands
    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Handle to the received-command log
    pub fn command_log(&self) -> CommandLog {
        Arc::clone(&self.log)
    }

    fn reply_for(&self, command: &str) -> Reply {
        if let Some(reply) = self.replies.get(command) {
            return reply.clone();
        }
        if command == "ATZ" {
            return Reply::text("ELM327 v1.5\r\r>");
        }
        if command.starts_with("AT") {
            return Reply::text("OK\r>");
        }
        self.fallback.clone()
    }

    /// Start the responder task and return the caller's end of the stream
    pub fn spawn(self) -> LinkStream {
        let (near, mut far) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let mut pending: Vec<u8> = Vec::new();
            let mut buf = [0u8; 64];
            loop {
                let n = match far.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for &byte in &buf[..n] {
                    if byte != b'\r' {
                        pending.push(byte);
                        continue;
                    }
                    let command = String::from_utf8_lossy(&pending).trim().to_string();
                    pending.clear();
                    if command.is_empty() {
                        continue;
                    }
                    if let Ok(mut log) = self.log.lock() {
                        log.push(command.clone());
                    }
                    match self.reply_for(&command) {
                        Reply::Text(text) => {
                            if far.write_all(text.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        Reply::Silent => {}
                    }
                }
            }
        });

        Box::new(near)
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// One scripted connection attempt
pub enum ConnectAttempt {
    /// Hand out this adapter
    Accept(ScriptedAdapter),
    /// Fail the attempt
    Refuse,
}

/// Connector fed from a fixed sequence of attempts.
///
/// Attempts past the end of the script are refused.
pub struct ScriptedConnector {
    attempts: VecDeque<ConnectAttempt>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<ConnectAttempt>) -> Self {
        Self {
            attempts: attempts.into(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connector that accepts exactly one connection
    pub fn single(adapter: ScriptedAdapter) -> Self {
        Self::new(vec![ConnectAttempt::Accept(adapter)])
    }

    /// Counter of connection attempts seen so far
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }
}

impl Connector for ScriptedConnector {
    async fn open(&mut self) -> Result<LinkStream, LinkError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        match self.attempts.pop_front() {
            Some(ConnectAttempt::Accept(adapter)) => Ok(adapter.spawn()),
            Some(ConnectAttempt::Refuse) | None => Err(LinkError::ConnectTimeout(0)),
        }
    }
}
