//! Connection capability consumed by the connection manager

use crate::alarm::AlarmHandle;
use crate::error::ConnectError;
use anyhow::Result;
use async_trait::async_trait;

/// A transport that a [`ConnectionManager`](crate::ConnectionManager) can drive.
///
/// Implementations own their channel and any background activity. They report
/// trouble noticed outside a connect call by raising their alarm, never by
/// calling the manager.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// The alarm this connection raises when its channel fails unexpectedly
    fn alarm(&self) -> &AlarmHandle;

    /// Attempt to establish the channel.
    ///
    /// `Ok(false)` is a recognized failure. Anything else that goes wrong may
    /// be returned as an error; the manager never sees it unwrapped.
    async fn connect(&mut self) -> Result<bool>;

    /// Release the active channel. Calling it while disconnected is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Release everything for good. Called exactly once, last.
    async fn teardown(&mut self) -> Result<()>;

    /// The manager's view of [`Connection::connect`]
    async fn try_connect(&mut self) -> Result<bool, ConnectError> {
        self.connect().await.map_err(ConnectError::from)
    }

    fn raise_alarm(&self) {
        self.alarm().raise();
    }

    fn silence_alarm(&self) {
        self.alarm().silence();
    }
}
