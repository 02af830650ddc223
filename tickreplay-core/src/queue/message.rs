use crate::analytics::PerformanceSnapshot;
use crate::domain::{Order, StrategyId};
use serde::{Deserialize, Serialize};

/// Envelope for every queue. `Kill` is reserved for shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueMessage<C> {
    Command(C),
    Kill,
}

/// Persistence targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repository {
    Orders,
    Snapshots,
}

impl Repository {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repository::Orders => "orders",
            Repository::Snapshots => "snapshots",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Order { strategy_id: StrategyId, order: Order },
    Snapshot(PerformanceSnapshot),
}

impl Record {
    /// Key the record is stored under in its repository.
    pub fn key(&self) -> String {
        match self {
            Record::Order { order, strategy_id } => format!("{strategy_id}/{}", order.id),
            Record::Snapshot(s) => match s.created_at {
                Some(at) => format!("{}/{}/{}", s.strategy_id, s.event.as_str(), at.timestamp()),
                None => format!("{}/{}", s.strategy_id, s.event.as_str()),
            },
        }
    }
}

/// Commands consumed by the persistence worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceCommand {
    Store { repository: Repository, record: Record },
    Update { repository: Repository, record: Record },
    Delete { repository: Repository, key: String },
}

impl PersistenceCommand {
    pub fn store_order(strategy_id: &StrategyId, order: &Order) -> Self {
        PersistenceCommand::Store {
            repository: Repository::Orders,
            record: Record::Order {
                strategy_id: strategy_id.clone(),
                order: order.clone(),
            },
        }
    }

    pub fn update_order(strategy_id: &StrategyId, order: &Order) -> Self {
        PersistenceCommand::Update {
            repository: Repository::Orders,
            record: Record::Order {
                strategy_id: strategy_id.clone(),
                order: order.clone(),
            },
        }
    }

    pub fn store_snapshot(snapshot: PerformanceSnapshot) -> Self {
        PersistenceCommand::Store {
            repository: Repository::Snapshots,
            record: Record::Snapshot(snapshot),
        }
    }

    pub fn repository(&self) -> Repository {
        match self {
            PersistenceCommand::Store { repository, .. }
            | PersistenceCommand::Update { repository, .. }
            | PersistenceCommand::Delete { repository, .. } => *repository,
        }
    }
}
