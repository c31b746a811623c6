//! Adapter connection lifecycle
//!
//! Brings the link up (transport connect, stabilization wait, interpreter
//! init sequence) and tears it down again. Retry policy belongs to the
//! caller; a single `connect` attempt either succeeds or fails.

use crate::channel::{CommandChannel, ReadOutcome};
use crate::error::LinkError;
use crate::transport::{Connector, NetConnector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interpreter init sequence: reset, echo off, linefeeds off, protocol auto.
///
/// Spaces stay on; the response decoder expects space-separated hex pairs.
const INIT_SEQUENCE: [&str; 4] = ["ATZ", "ATE0", "ATL0", "ATSP0"];

/// Link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Adapter address as `host:port` (WiFi adapters)
    pub address: String,
    /// Serial device path (Bluetooth RFCOMM binding or USB)
    pub device_name: String,
    /// Prefer the address over the device name
    pub use_address: bool,
    /// Baud rate for serial devices
    pub baud_rate: u32,
    /// Bounded wait for the link-layer connection (ms)
    pub connect_timeout_ms: u64,
    /// Per-command response timeout (ms)
    pub command_timeout_ms: u64,
    /// Wait after link-layer success before talking to the interpreter (ms)
    pub stabilize_delay_ms: u64,
    /// Wait after teardown before the link may be reopened (ms)
    pub disconnect_settle_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "192.168.0.10:35000".to_string(),
            device_name: "/dev/rfcomm0".to_string(),
            use_address: false,
            baud_rate: 38400,
            connect_timeout_ms: 10_000,
            command_timeout_ms: 2_000,
            stabilize_delay_ms: 2_000,
            disconnect_settle_ms: 1_000,
        }
    }
}

/// Owns the link to the adapter and its command channel
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: LinkConfig,
    channel: Option<CommandChannel>,
}

impl ConnectionManager<NetConnector> {
    /// Manager for a real adapter described by `config`
    pub fn new(config: LinkConfig) -> Self {
        let connector = NetConnector::new(config.clone());
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager with an injected connector (used by tests)
    pub fn with_connector(config: LinkConfig, connector: C) -> Self {
        Self {
            connector,
            config,
            channel: None,
        }
    }

    /// Bring the link up and run the interpreter init sequence.
    ///
    /// Does not retry; the caller decides when to try again.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        let stream = self.connector.open().await?;
        info!("Link established, waiting for connection to stabilize");
        tokio::time::sleep(Duration::from_millis(self.config.stabilize_delay_ms)).await;

        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        let mut channel = CommandChannel::new(stream, timeout);

        for command in INIT_SEQUENCE {
            debug!("Sending init command: {}", command);
            let outcome = channel.send(command).await?;
            match outcome {
                ReadOutcome::Timeout => {
                    warn!("No response to init command {}", command);
                    return Err(LinkError::InitFailed(format!("no response to {command}")));
                }
                other if other.text().contains('?') => {
                    warn!("Init command {} rejected", command);
                    return Err(LinkError::InitFailed(format!("{command} rejected by adapter")));
                }
                _ => {}
            }
        }

        info!("Adapter initialized");
        self.channel = Some(channel);
        Ok(())
    }

    /// Tear the link down and wait the settle interval
    pub async fn disconnect(&mut self) {
        if self.channel.take().is_some() {
            info!("Link closed");
        }
        tokio::time::sleep(Duration::from_millis(self.config.disconnect_settle_ms)).await;
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// The command channel, when connected
    pub fn channel_mut(&mut self) -> Option<&mut CommandChannel> {
        self.channel.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Reply, ScriptedAdapter, ScriptedConnector};
    use crate::transport::NetConnector;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            stabilize_delay_ms: 0,
            disconnect_settle_ms: 0,
            command_timeout_ms: 50,
            ..LinkConfig::default()
        }
    }

    #[tokio::test]
    async fn malformed_address_fails_fast() {
        let config = LinkConfig {
            address: "not-an-address".to_string(),
            use_address: true,
            ..fast_config()
        };
        let mut manager = ConnectionManager::with_connector(
            config.clone(),
            NetConnector::new(config),
        );
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::BadAddress(_)));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn init_sequence_brings_channel_up() {
        let adapter = ScriptedAdapter::new();
        let log = adapter.command_log();
        let mut manager =
            ConnectionManager::with_connector(fast_config(), ScriptedConnector::single(adapter));

        manager.connect().await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["ATZ", "ATE0", "ATL0", "ATSP0"]
        );
    }

    #[tokio::test]
    async fn rejected_init_command_fails_connect() {
        let adapter = ScriptedAdapter::new().on("ATSP0", Reply::text("?\r>"));
        let mut manager =
            ConnectionManager::with_connector(fast_config(), ScriptedConnector::single(adapter));

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::InitFailed(_)));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn silent_adapter_fails_connect() {
        let adapter = ScriptedAdapter::new().on("ATZ", Reply::Silent);
        let mut manager =
            ConnectionManager::with_connector(fast_config(), ScriptedConnector::single(adapter));

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, LinkError::InitFailed(_)));
    }

    #[tokio::test]
    async fn disconnect_drops_the_channel() {
        let adapter = ScriptedAdapter::new();
        let mut manager =
            ConnectionManager::with_connector(fast_config(), ScriptedConnector::single(adapter));

        manager.connect().await.unwrap();
        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(manager.channel_mut().is_none());
    }
}
