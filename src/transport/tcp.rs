//! TCP transport implementation

use crate::alarm::{AlarmBus, AlarmHandle};
use crate::transport::listener::Listener;
use crate::transport::traits::Connection;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Configuration for a TCP connection
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Remote address, `host:port`
    pub address: String,
    /// Capacity of the received-data channel
    pub data_capacity: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".into(),
            data_capacity: 256,
        }
    }
}

/// Managed TCP connection with a background listener
pub struct TcpConnection {
    config: TcpConfig,
    name: String,
    alarm: AlarmHandle,
    listener: Option<Listener>,
    data_tx: broadcast::Sender<Bytes>,
}

impl TcpConnection {
    /// Create a new TCP connection that raises its alarm on `bus`
    pub fn new(config: TcpConfig, bus: AlarmBus) -> Self {
        let (data_tx, _) = broadcast::channel(config.data_capacity.max(1));
        Self {
            name: format!("tcp:{}", config.address),
            config,
            alarm: AlarmHandle::new(bus),
            listener: None,
            data_tx,
        }
    }

    /// Subscribe to data read from the socket. Survives reconnects.
    pub fn data(&self) -> broadcast::Receiver<Bytes> {
        self.data_tx.subscribe()
    }

    /// Whether a listener is currently reading from a live socket
    pub fn is_connected(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_alive)
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn alarm(&self) -> &AlarmHandle {
        &self.alarm
    }

    async fn connect(&mut self) -> Result<bool> {
        // If we're already listening and everything is all right...
        if self.is_connected() {
            return Ok(true);
        }

        // A listener that already hit the end of its stream is of no use
        if let Some(stale) = self.listener.take() {
            stale.detach(self.alarm.bus());
        }

        let stream = match TcpStream::connect(&self.config.address).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[TCP] Failed to connect to {}: {}", self.config.address, e);
                return Ok(false);
            }
        };
        stream.set_nodelay(true)?;

        info!("[TCP] Connected to {}", self.config.address);
        self.listener = Some(Listener::start(stream, &self.alarm, self.data_tx.clone()));
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            listener.detach(self.alarm.bus());
            info!("[TCP] Disconnected from {}", self.config.address);
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        self.disconnect().await
    }
}
