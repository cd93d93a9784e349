//! Background reader shared by the stream transports
//!
//! A listener owns the read side of a channel. Every chunk it reads is
//! forwarded on a broadcast channel; when the read fails or the peer closes the
//! channel it publishes [`Topic::ReadError`] under its own identity and exits.

use crate::alarm::{AlarmBus, AlarmHandle, SenderId, Topic};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Read buffer size per chunk
pub const READ_CHUNK_SIZE: usize = 4096;

/// Handle to a running background reader
#[derive(Debug)]
pub struct Listener {
    id: SenderId,
    task: JoinHandle<()>,
    /// Cleared before the read loop reports its failure
    alive: Arc<AtomicBool>,
}

impl Listener {
    /// Allocate an identity for a listener that is about to be spawned.
    ///
    /// Callers subscribe to `ReadError` on this identity before calling
    /// [`Listener::spawn`], otherwise an early failure is lost.
    pub fn reserve_id() -> SenderId {
        SenderId::next()
    }

    /// Start reading from `reader` on a background task
    pub fn spawn<R>(id: SenderId, reader: R, bus: AlarmBus, data_tx: broadcast::Sender<Bytes>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(read_loop(id, reader, bus, data_tx, alive.clone()));
        debug!("[LISTENER] {} started", id);
        Self { id, task, alive }
    }

    /// Start a listener whose read failures raise `alarm`
    pub fn start<R>(reader: R, alarm: &AlarmHandle, data_tx: broadcast::Sender<Bytes>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let id = Self::reserve_id();
        let owner = alarm.clone();
        alarm.bus().subscribe(Topic::ReadError, id, move |_| {
            owner.raise();
        });
        Self::spawn(id, reader, alarm.bus().clone(), data_tx)
    }

    /// Drop the listener's alarm route, then stop it
    pub fn detach(self, bus: &AlarmBus) {
        bus.unsubscribe(self.id);
        self.stop();
    }

    pub fn id(&self) -> SenderId {
        self.id
    }

    /// Whether the read loop is still reading. Already false by the time
    /// `ReadError` is published.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stop reading. The reader is dropped with the task.
    pub fn stop(self) {
        self.task.abort();
        debug!("[LISTENER] {} stopped", self.id);
    }
}

async fn read_loop<R>(
    id: SenderId,
    mut reader: R,
    bus: AlarmBus,
    data_tx: broadcast::Sender<Bytes>,
    alive: Arc<AtomicBool>,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut read_buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match reader.read(&mut read_buf).await {
            Ok(0) => {
                warn!("[LISTENER] {} channel closed by peer", id);
                break;
            }
            Ok(n) => {
                trace!("[LISTENER] {} received {} bytes", id, n);
                // No receivers is fine; data is simply not observed
                let _ = data_tx.send(Bytes::copy_from_slice(&read_buf[..n]));
            }
            Err(e) => {
                warn!("[LISTENER] {} read error: {}", id, e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    bus.publish(Topic::ReadError, id);
}
