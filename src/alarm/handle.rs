//! Publishing side of the alarm bus held by a connection

use super::bus::{AlarmBus, SenderId, Topic};
use tracing::debug;

/// A connection's identity on an [`AlarmBus`], used to raise and silence its
/// alarm.
#[derive(Debug, Clone)]
pub struct AlarmHandle {
    bus: AlarmBus,
    sender: SenderId,
}

impl AlarmHandle {
    /// Create a handle with a freshly allocated sender identity
    pub fn new(bus: AlarmBus) -> Self {
        Self {
            bus,
            sender: SenderId::next(),
        }
    }

    pub fn bus(&self) -> &AlarmBus {
        &self.bus
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    /// Tell whoever manages this connection that something went wrong
    pub fn raise(&self) -> usize {
        debug!("[ALARM] {} raised", self.sender);
        self.bus.publish(Topic::Alarm, self.sender)
    }

    /// Withdraw a previously raised alarm
    pub fn silence(&self) -> usize {
        debug!("[ALARM] {} silenced", self.sender);
        self.bus.publish(Topic::AlarmSilenced, self.sender)
    }
}
