//! Byte-stream transport to the adapter
//!
//! WiFi adapters are addressed as `host:port` over TCP; Bluetooth RFCOMM
//! bindings and USB adapters appear as serial devices.

use crate::connection::LinkConfig;
use crate::error::LinkError;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialStream;
use tracing::{info, warn};

/// Combined read/write bounds for an established link.
pub trait LinkIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkIo for T {}

/// Established bidirectional byte stream to the adapter
pub type LinkStream = Box<dyn LinkIo>;

/// Produces a fresh [`LinkStream`] for every connection attempt.
///
/// The acquisition code is generic over this so tests can substitute a
/// scripted in-memory adapter.
pub trait Connector: Send {
    /// Open the link with a bounded wait
    fn open(&mut self) -> impl Future<Output = Result<LinkStream, LinkError>> + Send;
}

/// Connector for real adapters, driven by [`LinkConfig`]
pub struct NetConnector {
    config: LinkConfig,
}

impl NetConnector {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    async fn open_tcp(&self) -> Result<LinkStream, LinkError> {
        let addr: SocketAddr = self
            .config
            .address
            .parse()
            .map_err(|_| LinkError::BadAddress(self.config.address.clone()))?;

        info!(
            "Connecting to adapter at {} (timeout: {}ms)",
            addr, self.config.connect_timeout_ms
        );

        let connect = TcpStream::connect(addr);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(stream)) => Ok(Box::new(stream)),
            Ok(Err(e)) => {
                warn!("Failed to connect to adapter: {}", e);
                Err(e.into())
            }
            Err(_) => Err(LinkError::ConnectTimeout(self.config.connect_timeout_ms)),
        }
    }

    fn open_serial(&self) -> Result<LinkStream, LinkError> {
        info!(
            "Opening serial device {} at {} baud",
            self.config.device_name, self.config.baud_rate
        );
        let builder = tokio_serial::new(&self.config.device_name, self.config.baud_rate);
        let stream = SerialStream::open(&builder)?;
        Ok(Box::new(stream))
    }
}

impl Connector for NetConnector {
    async fn open(&mut self) -> Result<LinkStream, LinkError> {
        if self.config.use_address {
            self.open_tcp().await
        } else {
            self.open_serial()
        }
    }
}
