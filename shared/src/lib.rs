//! cnxman Shared Types
//!
//! This crate provides the connection lifecycle state machine used by the
//! `cnxman` connection manager. It has no I/O and no runtime dependency, so the
//! transition table can be checked on its own.

pub mod state_machine;

// Re-export commonly used types at crate root
pub use state_machine::{Effect, Input, State, Transition, TransitionError};
