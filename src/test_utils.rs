//! Common testing infrastructure: tracing setup and a scriptable transport.

use crate::alarm::{AlarmBus, AlarmHandle};
use crate::transport::Connection;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a test-friendly subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// What a [`MockConnection`] does on its next connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    Error,
    /// Never resolves
    Hang,
    /// Raise the alarm while connecting, then succeed
    AlarmThenSucceed,
    /// Raise the alarm while connecting, then fail
    AlarmThenFail,
}

/// Call counters shared with the test after the mock moves into a manager
#[derive(Debug, Default)]
pub struct MockStats {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl MockStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

/// A transport that follows a script of connect outcomes
pub struct MockConnection {
    alarm: AlarmHandle,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    failing_release: bool,
    stats: Arc<MockStats>,
}

impl MockConnection {
    /// Every connect attempt ends with `fallback` unless scripted otherwise
    pub fn new(bus: AlarmBus, fallback: Outcome) -> Self {
        Self {
            alarm: AlarmHandle::new(bus),
            script: Mutex::new(VecDeque::new()),
            fallback,
            failing_release: false,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Outcomes for the first attempts, in order
    pub fn script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    /// Make disconnect and teardown return errors
    pub fn failing_release(mut self) -> Self {
        self.failing_release = true;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    fn release_result(&self) -> Result<()> {
        if self.failing_release {
            Err(anyhow!("mock release failed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn name(&self) -> &str {
        "mock"
    }

    fn alarm(&self) -> &AlarmHandle {
        &self.alarm
    }

    async fn connect(&mut self) -> Result<bool> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            Outcome::Succeed => Ok(true),
            Outcome::Fail => Ok(false),
            Outcome::Error => Err(anyhow!("mock transport exploded")),
            Outcome::Hang => std::future::pending().await,
            Outcome::AlarmThenSucceed => {
                self.alarm.raise();
                Ok(true)
            }
            Outcome::AlarmThenFail => {
                self.alarm.raise();
                Ok(false)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.release_result()
    }

    async fn teardown(&mut self) -> Result<()> {
        self.stats.teardowns.fetch_add(1, Ordering::SeqCst);
        self.release_result()
    }
}
