pub mod listener;
pub mod serial;
pub mod tcp;
pub mod traits;

pub use listener::Listener;
pub use serial::{SerialConfig, SerialConnection, DEFAULT_BAUD_RATE};
pub use tcp::{TcpConfig, TcpConnection};
pub use traits::Connection;
