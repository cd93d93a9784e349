//! Connection lifecycle management
//!
//! This module handles:
//! - Serializing caller requests, transport alarms and retry timers onto one task
//! - Automatic recovery after failed attempts and alarms
//! - Best-effort teardown that always reaches the terminal state

mod manager;

pub use manager::{ConnectionManager, ManagerConfig, StateChange, DEFAULT_RECOVERY_DELAY};
