//! Connection State Machine
//!
//! Defines the connection lifecycle states, the inputs that drive them and the
//! side effects each transition asks the owner to perform.

use std::fmt;
use thiserror::Error;

/// Lifecycle state of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Created, no connect attempt made yet
    #[default]
    Ready,
    /// A connect attempt is in flight
    Connecting,
    /// The transport reported a live channel
    Connected,
    /// Waiting for the recovery delay before the next attempt
    Recovering,
    /// Disconnected on request, waiting for teardown
    Disconnected,
    /// Terminal. Nothing leaves this state.
    TornDown,
}

impl State {
    /// Whether this is the terminal state
    pub fn is_terminal(self) -> bool {
        self == State::TornDown
    }

    /// Look up the transition for `input` from this state
    pub fn on(self, input: Input) -> Result<Transition, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTornDown { input });
        }

        match next(self, input) {
            Some((to, effects)) => Ok(Transition {
                from: self,
                input,
                to,
                effects,
            }),
            None => Err(TransitionError::Invalid { from: self, input }),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Ready => "ready",
            State::Connecting => "connecting",
            State::Connected => "connected",
            State::Recovering => "recovering",
            State::Disconnected => "disconnected",
            State::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Inputs that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    /// Caller request, or the recovery timer firing
    Connect,
    /// The transport's connect attempt succeeded
    ConnectSucceeded,
    /// The transport's connect attempt returned false, failed or timed out
    ConnectFailed,
    /// The transport raised an alarm
    AlarmRaised,
    /// The transport withdrew an alarm
    AlarmSilenced,
    /// Caller request to release the channel
    Disconnect,
    /// Caller request to release everything for good
    Teardown,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Input::Connect => "connect",
            Input::ConnectSucceeded => "connect-succeeded",
            Input::ConnectFailed => "connect-failed",
            Input::AlarmRaised => "alarm-raised",
            Input::AlarmSilenced => "alarm-silenced",
            Input::Disconnect => "disconnect",
            Input::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// Side effects a transition asks its owner to perform, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Ask the transport to connect; the outcome is fed back as an input
    AttemptConnect,
    /// Arm the recovery timer
    ScheduleRetry,
    /// Drop any armed recovery timer
    CancelRetry,
    /// Ask the transport to release the active channel
    Disconnect,
    /// Ask the transport to release all of its resources
    Teardown,
}

/// A resolved transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub input: Input,
    pub to: State,
    pub effects: &'static [Effect],
}

impl Transition {
    /// True when the transition neither changes state nor has side effects
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.effects.is_empty()
    }
}

/// Rejection of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("connection manager already torn down, {input} rejected")]
    AlreadyTornDown { input: Input },

    #[error("{input} is not valid while {from}")]
    Invalid { from: State, input: Input },
}

const NONE: &[Effect] = &[];
const ATTEMPT: &[Effect] = &[Effect::AttemptConnect];
const REATTEMPT: &[Effect] = &[Effect::CancelRetry, Effect::AttemptConnect];
const RETRY: &[Effect] = &[Effect::ScheduleRetry];
const RELEASE_CHANNEL: &[Effect] = &[Effect::Disconnect];
const RELEASE_ALL: &[Effect] = &[Effect::Teardown];
const DISCONNECT_AND_RELEASE: &[Effect] = &[Effect::Disconnect, Effect::Teardown];
const ABANDON_RECOVERY: &[Effect] = &[Effect::CancelRetry, Effect::Disconnect, Effect::Teardown];

/// Get the next state and side effects for an input, if the transition is valid
fn next(state: State, input: Input) -> Option<(State, &'static [Effect])> {
    use Input::*;
    use State::*;

    let (to, effects) = match (state, input) {
        // From Ready
        (Ready, Connect) => (Connecting, ATTEMPT),

        // From Connecting
        (Connecting, ConnectSucceeded) => (Connected, NONE),
        (Connecting, ConnectFailed) => (Recovering, RETRY),

        // From Recovering - an attempt supersedes whatever timer is armed
        (Recovering, Connect) => (Connecting, REATTEMPT),
        (Recovering, AlarmRaised | AlarmSilenced) => (Recovering, NONE),

        // From Connected
        (Connected, AlarmRaised) => (Recovering, RETRY),
        (Connected, AlarmSilenced) => (Connected, NONE),
        (Connected, Disconnect) => (Disconnected, RELEASE_CHANNEL),

        // Stale alarms from a channel that is not live
        (Ready | Disconnected, AlarmRaised | AlarmSilenced) => (state, NONE),

        // Teardown is accepted from every non-terminal state
        (Ready | Disconnected, Teardown) => (TornDown, RELEASE_ALL),
        (Connecting | Connected, Teardown) => (TornDown, DISCONNECT_AND_RELEASE),
        (Recovering, Teardown) => (TornDown, ABANDON_RECOVERY),

        // Invalid transition
        _ => return None,
    };

    Some((to, effects))
}
