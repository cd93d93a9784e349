//! cnxman: connection lifecycle management
//!
//! A [`ConnectionManager`] drives any transport implementing [`Connection`]
//! through connect, recovery and teardown. Transports report trouble they
//! notice in the background by raising an alarm on an [`AlarmBus`]; the manager
//! reacts by scheduling a reconnect after a fixed delay.
//!
//! ```no_run
//! use cnxman::{AlarmBus, ConnectionManager, ManagerConfig, SerialConfig, SerialConnection};
//!
//! # async fn run() {
//! let bus = AlarmBus::new();
//! let port = SerialConnection::new(
//!     SerialConfig { port: "/dev/ttyUSB0".into(), baud_rate: 115200, ..Default::default() },
//!     bus,
//! );
//! let mut data = port.data();
//! let manager = ConnectionManager::new(port, ManagerConfig::default());
//!
//! manager.connect().await.unwrap();
//! while let Ok(chunk) = data.recv().await {
//!     println!("{} bytes", chunk.len());
//! }
//! manager.teardown().await.unwrap();
//! # }
//! ```

pub mod alarm;
pub mod connection;
pub mod error;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use alarm::{AlarmBus, AlarmEvent, AlarmHandle, SenderId, Topic};
pub use cnxman_shared::{Effect, Input, State, Transition};
pub use connection::{ConnectionManager, ManagerConfig, StateChange, DEFAULT_RECOVERY_DELAY};
pub use error::{ConnectError, TeardownError, TeardownStep, TransitionError};
pub use transport::{Connection, Listener, SerialConfig, SerialConnection, TcpConfig, TcpConnection};
