use super::{QueueError, QueueMessage};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Executes commands for one external concern, synchronously, on the worker thread.
///
/// A command that returns `Err` or panics is counted as failed; the worker
/// keeps consuming.
pub trait CommandHandler<C>: Send + 'static {
    type Error: fmt::Display;

    fn handle(&mut self, command: C) -> Result<(), Self::Error>;

    /// Called once after `Kill` (or disconnect), before the thread exits.
    fn on_stop(&mut self) {}
}

/// Counters returned when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Non-blocking producer side of a worker queue.
pub struct QueueSender<C> {
    name: Arc<str>,
    sender: Sender<QueueMessage<C>>,
    dropped: Arc<AtomicU64>,
}

impl<C> Clone for QueueSender<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<C> fmt::Debug for QueueSender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("name", &self.name)
            .field("queued", &self.sender.len())
            .finish()
    }
}

impl<C> QueueSender<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue without waiting. A full or closed queue drops the command.
    pub fn send(&self, command: C) -> Result<(), QueueError> {
        match self.sender.try_send(QueueMessage::Command(command)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %self.name, "queue full, dropping message");
                Err(QueueError::Full(self.name.to_string()))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Disconnected(self.name.to_string()))
            }
        }
    }

    /// Enqueue the shutdown marker. Waits for room, since losing it would
    /// leave the worker running.
    pub fn kill(&self) -> Result<(), QueueError> {
        self.sender
            .send(QueueMessage::Kill)
            .map_err(|_| QueueError::Disconnected(self.name.to_string()))
    }

    /// Commands dropped so far across all clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}

/// Join handle of a running worker.
pub struct WorkerHandle {
    name: String,
    handle: thread::JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(self) -> Result<WorkerStats, QueueError> {
        self.handle
            .join()
            .map_err(|_| QueueError::WorkerPanicked(self.name))
    }
}

/// Start a named worker thread over a bounded queue.
pub fn spawn_worker<C, H>(
    name: &str,
    capacity: usize,
    handler: H,
) -> Result<(QueueSender<C>, WorkerHandle), QueueError>
where
    C: Send + 'static,
    H: CommandHandler<C>,
{
    if capacity == 0 {
        return Err(QueueError::ZeroCapacity);
    }
    let (sender, receiver) = bounded(capacity);
    let thread_name = name.to_string();
    let handle = thread::Builder::new()
        .name(format!("queue-{name}"))
        .spawn(move || worker_loop(&thread_name, receiver, handler))
        .map_err(|e| QueueError::Spawn(name.to_string(), e))?;

    Ok((
        QueueSender {
            name: Arc::from(name),
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        WorkerHandle {
            name: name.to_string(),
            handle,
        },
    ))
}

fn worker_loop<C, H>(name: &str, receiver: Receiver<QueueMessage<C>>, mut handler: H) -> WorkerStats
where
    H: CommandHandler<C>,
{
    info!(worker = name, "worker started");
    let mut stats = WorkerStats::default();
    for message in receiver.iter() {
        match message {
            QueueMessage::Command(command) => {
                stats.processed += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(command))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        stats.failed += 1;
                        error!(worker = name, error = %e, "command failed, continuing");
                    }
                    Err(payload) => {
                        stats.failed += 1;
                        error!(
                            worker = name,
                            panic = panic_message(payload.as_ref()),
                            "command panicked, continuing"
                        );
                    }
                }
            }
            QueueMessage::Kill => {
                info!(worker = name, "kill received");
                break;
            }
        }
    }
    handler.on_stop();
    info!(
        worker = name,
        processed = stats.processed,
        failed = stats.failed,
        "worker stopped"
    );
    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
