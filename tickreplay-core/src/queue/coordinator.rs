//! Registry of queue workers with ordered shutdown.

use super::worker::{spawn_worker, CommandHandler, QueueSender, WorkerHandle, WorkerStats};
use super::QueueError;
use tracing::{info, warn};

type KillFn = Box<dyn Fn() -> Result<(), QueueError> + Send>;

struct Registered {
    name: String,
    kill: KillFn,
    handle: WorkerHandle,
}

/// Owns every worker started for a run. Dropping it without `shutdown`
/// still sends `Kill` to each worker but does not wait for them.
#[derive(Default)]
pub struct QueueCoordinator {
    workers: Vec<Registered>,
}

impl QueueCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a worker for one concern and return its sender.
    pub fn register<C, H>(
        &mut self,
        name: &str,
        capacity: usize,
        handler: H,
    ) -> Result<QueueSender<C>, QueueError>
    where
        C: Send + 'static,
        H: CommandHandler<C>,
    {
        if self.workers.iter().any(|w| w.name == name) {
            return Err(QueueError::AlreadyRegistered(name.to_string()));
        }
        let (sender, handle) = spawn_worker(name, capacity, handler)?;
        let killer = sender.clone();
        self.workers.push(Registered {
            name: name.to_string(),
            kill: Box::new(move || killer.kill()),
            handle,
        });
        info!(queue = name, capacity, "queue registered");
        Ok(sender)
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }

    /// Send `Kill` to every worker, then wait for each to drain and stop.
    pub fn shutdown(mut self) -> Result<Vec<(String, WorkerStats)>, QueueError> {
        let workers = std::mem::take(&mut self.workers);
        for w in &workers {
            if let Err(e) = (w.kill)() {
                warn!(queue = %w.name, error = %e, "kill not delivered");
            }
        }
        let mut stats = Vec::with_capacity(workers.len());
        for w in workers {
            let name = w.name;
            stats.push((name, w.handle.join()?));
        }
        Ok(stats)
    }
}

impl Drop for QueueCoordinator {
    fn drop(&mut self) {
        for w in &self.workers {
            let _ = (w.kill)();
        }
    }
}
