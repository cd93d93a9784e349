//! Connection manager with serialized transitions and automatic recovery

use crate::alarm::{AlarmBus, SenderId, Topic};
use crate::error::{ConnectError, TeardownError, TeardownStep};
use crate::transport::Connection;
use cnxman_shared::{Effect, Input, State, Transition, TransitionError};
use futures::future::OptionFuture;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep, timeout, Sleep};
use tracing::{debug, info, warn};

/// Delay between a failed or interrupted connection and the next attempt
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Wait before re-attempting after a failure or an alarm
    pub recovery_delay: Duration,
    /// Give up on a single connect attempt after this long
    pub connect_timeout: Option<Duration>,
    /// Caller requests that may queue while the manager is busy
    pub request_capacity: usize,
    /// Capacity of the state change broadcast channel
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            connect_timeout: Some(Duration::from_secs(5)),
            request_capacity: 32,
            event_capacity: 64,
        }
    }
}

/// A transition the manager has applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: State,
    pub input: Input,
    pub to: State,
}

type Reply = oneshot::Sender<Result<State, TransitionError>>;

/// A caller input waiting for the machine
struct Request {
    input: Input,
    reply: Reply,
}

/// Manages one connection through its lifecycle.
///
/// All transitions run on a single background task, one input at a time, no
/// matter whether the input came from a caller, the transport's alarm or the
/// recovery timer. The one exception is teardown, which also interrupts a
/// connect attempt in flight. Dropping every handle tears the connection down.
#[derive(Clone)]
pub struct ConnectionManager {
    name: String,
    requests: mpsc::Sender<Request>,
    state_rx: watch::Receiver<State>,
    events: broadcast::Sender<StateChange>,
}

impl ConnectionManager {
    /// Take ownership of `connection` and start the manager task
    pub fn new<C: Connection>(connection: C, config: ManagerConfig) -> Self {
        Self::spawn(Some(Box::new(connection)), config)
    }

    /// A manager with no transport. Every connect attempt fails and recovers.
    pub fn unbound(config: ManagerConfig) -> Self {
        Self::spawn(None, config)
    }

    fn spawn(connection: Option<Box<dyn Connection>>, config: ManagerConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<Request>(config.request_capacity.max(1));
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel::<Input>();
        let (state_tx, state_rx) = watch::channel(State::Ready);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let name = connection
            .as_ref()
            .map(|conn| conn.name().to_string())
            .unwrap_or_else(|| "unbound".into());

        // Subscribe before the transport gets a chance to start background work
        let route = connection.as_ref().map(|conn| {
            let alarm = conn.alarm();
            route_alarms(alarm.bus(), alarm.sender(), alarm_tx)
        });

        let machine = Machine {
            name: name.clone(),
            state: State::Ready,
            connection,
            config,
            requests: request_rx,
            retry: None,
            route,
            pending_teardown: None,
            state_tx,
            events: events.clone(),
        };
        tokio::spawn(machine.run(alarm_rx));

        Self {
            name,
            requests: request_tx,
            state_rx,
            events,
        }
    }

    /// Start connecting. Resolves once the attempt has settled, to either
    /// `Connected` or `Recovering`, or to `TornDown` if a teardown cut it short.
    pub async fn connect(&self) -> Result<State, TransitionError> {
        self.request(Input::Connect).await
    }

    /// Release the active channel
    pub async fn disconnect(&self) -> Result<State, TransitionError> {
        self.request(Input::Disconnect).await
    }

    /// Release everything. Transport failures along the way are logged, the
    /// manager still ends up torn down.
    pub async fn teardown(&self) -> Result<State, TransitionError> {
        self.request(Input::Teardown).await
    }

    /// Current state
    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// A receiver that always holds the latest state
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.state_rx.clone()
    }

    /// Subscribe to every applied transition
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Wait until the manager reaches `target`, or the terminal state
    pub async fn wait_for_state(&self, target: State) -> State {
        let mut state_rx = self.state_rx.clone();
        let reached = state_rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map(|state| *state);
        reached.unwrap_or(State::TornDown)
    }

    /// Name of the managed connection
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn request(&self, input: Input) -> Result<State, TransitionError> {
        let (reply, response) = oneshot::channel();
        if self.requests.send(Request { input, reply }).await.is_err() {
            return Err(TransitionError::AlreadyTornDown { input });
        }
        response
            .await
            .unwrap_or(Err(TransitionError::AlreadyTornDown { input }))
    }
}

/// Forward a connection's alarms into the manager's queue
fn route_alarms(
    bus: &AlarmBus,
    sender: SenderId,
    alarm_tx: mpsc::UnboundedSender<Input>,
) -> (AlarmBus, SenderId) {
    let raised = alarm_tx.clone();
    bus.subscribe(Topic::Alarm, sender, move |_| {
        let _ = raised.send(Input::AlarmRaised);
    });
    bus.subscribe(Topic::AlarmSilenced, sender, move |_| {
        let _ = alarm_tx.send(Input::AlarmSilenced);
    });
    (bus.clone(), sender)
}

/// The state machine and everything it owns. Lives on the manager task.
struct Machine {
    name: String,
    state: State,
    connection: Option<Box<dyn Connection>>,
    config: ManagerConfig,
    requests: mpsc::Receiver<Request>,
    /// Pending recovery timer
    retry: Option<Pin<Box<Sleep>>>,
    /// Alarm route to drop on teardown
    route: Option<(AlarmBus, SenderId)>,
    /// Caller whose teardown interrupted a connect attempt
    pending_teardown: Option<Reply>,
    state_tx: watch::Sender<State>,
    events: broadcast::Sender<StateChange>,
}

impl Machine {
    async fn run(mut self, mut alarms: mpsc::UnboundedReceiver<Input>) {
        debug!("[MANAGER] {} started", self.name);

        while !self.state.is_terminal() {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request { input, reply }) => {
                        let result = self.drive(input).await;
                        if let Err(e) = &result {
                            warn!("[MANAGER] {} rejected: {}", self.name, e);
                        }
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("[MANAGER] {} all handles dropped, tearing down", self.name);
                        let _ = self.drive(Input::Teardown).await;
                    }
                },
                Some(input) = alarms.recv() => {
                    if let Err(e) = self.drive(input).await {
                        debug!("[MANAGER] {} alarm ignored: {}", self.name, e);
                    }
                }
                Some(()) = OptionFuture::from(self.retry.as_mut()) => {
                    self.retry = None;
                    self.retry_elapsed().await;
                }
            }
        }

        // Anything still queued arrived after teardown
        self.requests.close();
        while let Ok(Request { input, reply }) = self.requests.try_recv() {
            let _ = reply.send(Err(TransitionError::AlreadyTornDown { input }));
        }

        info!("[MANAGER] {} stopped", self.name);
    }

    /// Apply `input` and every input its side effects produce
    async fn drive(&mut self, input: Input) -> Result<State, TransitionError> {
        let mut next = Some(input);

        while let Some(input) = next.take() {
            let transition = self.state.on(input)?;
            self.enter(&transition);

            for effect in transition.effects {
                if let Some(outcome) = self.perform(*effect).await {
                    next = Some(outcome);
                }
            }
        }

        if let Some(reply) = self.pending_teardown.take() {
            let _ = reply.send(Ok(self.state));
        }

        Ok(self.state)
    }

    fn enter(&mut self, transition: &Transition) {
        if transition.is_noop() {
            debug!(
                "[MANAGER] {} {} absorbed while {}",
                self.name, transition.input, transition.from
            );
            return;
        }

        self.state = transition.to;
        self.state_tx.send_replace(transition.to);
        let _ = self.events.send(StateChange {
            from: transition.from,
            input: transition.input,
            to: transition.to,
        });

        info!(
            "[MANAGER] {} {} -> {} ({})",
            self.name, transition.from, transition.to, transition.input
        );
    }

    async fn perform(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::AttemptConnect => return Some(self.attempt_connect().await),
            Effect::ScheduleRetry => {
                let delay = self.config.recovery_delay;
                self.retry = Some(Box::pin(sleep(delay)));
                info!("[MANAGER] {} retrying in {:?}", self.name, delay);
            }
            Effect::CancelRetry => {
                if self.retry.take().is_some() {
                    debug!("[MANAGER] {} pending retry canceled", self.name);
                }
            }
            Effect::Disconnect => {
                if let Some(conn) = self.connection.as_mut() {
                    if let Err(source) = conn.disconnect().await {
                        let err = TeardownError {
                            step: TeardownStep::Disconnect,
                            source,
                        };
                        warn!("[MANAGER] {} {}", self.name, err);
                    }
                }
            }
            Effect::Teardown => self.release().await,
        }
        None
    }

    /// Run one connect attempt and turn its outcome into the next input.
    ///
    /// Callers are still heard while the attempt runs: a teardown (or the last
    /// handle going away) abandons the attempt, anything else is rejected.
    async fn attempt_connect(&mut self) -> Input {
        let Some(conn) = self.connection.as_mut() else {
            warn!("[MANAGER] {} {}", self.name, ConnectError::Unbound);
            return Input::ConnectFailed;
        };

        let limit = self.config.connect_timeout;
        let attempt = async move {
            match limit {
                Some(limit) => timeout(limit, conn.try_connect())
                    .await
                    .unwrap_or_else(|_| Err(ConnectError::Timeout(limit))),
                None => conn.try_connect().await,
            }
        };
        tokio::pin!(attempt);

        let outcome = loop {
            tokio::select! {
                outcome = &mut attempt => break outcome,
                request = self.requests.recv() => match request {
                    Some(Request { input: Input::Teardown, reply }) => {
                        self.pending_teardown = Some(reply);
                        info!("[MANAGER] {} teardown requested, abandoning connect attempt", self.name);
                        return Input::Teardown;
                    }
                    Some(Request { input, reply }) => {
                        let err = TransitionError::Invalid { from: self.state, input };
                        warn!("[MANAGER] {} rejected: {}", self.name, err);
                        let _ = reply.send(Err(err));
                    }
                    None => {
                        debug!("[MANAGER] {} all handles dropped, abandoning connect attempt", self.name);
                        return Input::Teardown;
                    }
                },
            }
        };

        match outcome {
            Ok(true) => Input::ConnectSucceeded,
            Ok(false) => {
                warn!("[MANAGER] {} connect attempt failed", self.name);
                Input::ConnectFailed
            }
            Err(e) => {
                warn!("[MANAGER] {} {}", self.name, e);
                Input::ConnectFailed
            }
        }
    }

    /// Tear the transport down. Runs at most once; the connection is gone after.
    async fn release(&mut self) {
        self.retry = None;

        // Stop listening first so a dying channel can't queue more alarms
        if let Some((bus, sender)) = self.route.take() {
            bus.unsubscribe(sender);
        }

        if let Some(mut conn) = self.connection.take() {
            if let Err(source) = conn.teardown().await {
                let err = TeardownError {
                    step: TeardownStep::Teardown,
                    source,
                };
                warn!("[MANAGER] {} {}", self.name, err);
            }
        }
    }

    async fn retry_elapsed(&mut self) {
        // Only a manager still waiting to recover acts on the timer
        if self.state != State::Recovering {
            debug!("[MANAGER] {} stale retry ignored while {}", self.name, self.state);
            return;
        }

        info!("[MANAGER] {} recovery delay elapsed, reconnecting", self.name);
        if let Err(e) = self.drive(Input::Connect).await {
            warn!("[MANAGER] {} retry rejected: {}", self.name, e);
        }
    }
}
