//! Fire-and-forget message passing between the simulation loop and blocking
//! I/O workers.
//!
//! Each concern gets its own bounded channel and worker thread. Senders never
//! block: a full queue drops the message and reports it. Workers process in
//! FIFO order, log and skip failing commands, and stop on [`QueueMessage::Kill`]
//! after everything queued ahead of it.

pub mod coordinator;
pub mod message;
pub mod worker;

pub use coordinator::QueueCoordinator;
pub use message::{PersistenceCommand, QueueMessage, Record, Repository};
pub use worker::{spawn_worker, CommandHandler, QueueSender, WorkerHandle, WorkerStats};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue '{0}' is full, message dropped")]
    Full(String),

    #[error("queue '{0}' is disconnected")]
    Disconnected(String),

    #[error("queue '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("failed to spawn worker '{0}': {1}")]
    Spawn(String, std::io::Error),

    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),
}
