//! Alarm propagation between transports and their managers
//!
//! This module handles:
//! - Sender identities for connections and listeners
//! - The publish/subscribe bus that carries alarm events
//! - The handle a connection uses to raise or silence its alarm

mod bus;
mod handle;

pub use bus::{AlarmBus, AlarmEvent, SenderId, Topic};
pub use handle::AlarmHandle;
