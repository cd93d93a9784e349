//! Serial port transport implementation

use crate::alarm::{AlarmBus, AlarmHandle};
use crate::transport::listener::Listener;
use crate::transport::traits::Connection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_serial::{DataBits, ErrorKind, Parity, SerialPortBuilderExt, StopBits};
use tracing::{info, warn};

/// Default baud rate for serial connections
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Configuration for a serial port connection
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port path (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Read timeout handed to the port driver
    pub timeout: Option<Duration>,
    /// Capacity of the received-data channel
    pub data_capacity: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: None,
            data_capacity: 256,
        }
    }
}

/// Managed serial port connection with a background listener
pub struct SerialConnection {
    config: SerialConfig,
    name: String,
    alarm: AlarmHandle,
    listener: Option<Listener>,
    data_tx: broadcast::Sender<Bytes>,
}

impl SerialConnection {
    /// Create a new serial connection that raises its alarm on `bus`
    pub fn new(config: SerialConfig, bus: AlarmBus) -> Self {
        let (data_tx, _) = broadcast::channel(config.data_capacity.max(1));
        Self {
            name: format!("serial:{}", config.port),
            config,
            alarm: AlarmHandle::new(bus),
            listener: None,
            data_tx,
        }
    }

    /// Subscribe to bytes read from the port. Survives reconnects.
    pub fn data(&self) -> broadcast::Receiver<Bytes> {
        self.data_tx.subscribe()
    }

    /// Whether a listener is currently reading from an open port
    pub fn is_connected(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_alive)
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl Connection for SerialConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn alarm(&self) -> &AlarmHandle {
        &self.alarm
    }

    async fn connect(&mut self) -> Result<bool> {
        if self.is_connected() {
            return Ok(true);
        }

        if let Some(stale) = self.listener.take() {
            stale.detach(self.alarm.bus());
        }

        let mut builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .parity(self.config.parity)
            .stop_bits(self.config.stop_bits);
        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }

        let port = match builder.open_native_async() {
            Ok(port) => port,
            // Missing or unusable device: try again later
            Err(e) if matches!(e.kind, ErrorKind::NoDevice | ErrorKind::Io(_)) => {
                warn!("[SERIAL] Could not open {}: {}", self.config.port, e);
                return Ok(false);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("opening serial port {}", self.config.port));
            }
        };

        info!(
            "[SERIAL] Opened {} at {} baud",
            self.config.port, self.config.baud_rate
        );
        self.listener = Some(Listener::start(port, &self.alarm, self.data_tx.clone()));
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(listener) = self.listener.take() {
            listener.detach(self.alarm.bus());
            info!("[SERIAL] Closed {}", self.config.port);
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        self.disconnect().await
    }
}
