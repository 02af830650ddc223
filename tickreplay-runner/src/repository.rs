//! JSONL persistence worker.
//!
//! Every command becomes one line in `{dir}/{repository}.jsonl`:
//! `{"op":"store","key":"...","record":{...}}`. Updates and deletes are
//! appended too, so the file is a log; [`read_latest`] folds it into the
//! current record per key.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use tickreplay_core::queue::{CommandHandler, PersistenceCommand, Record, Repository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository I/O at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("record serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Store,
    Update,
    Delete,
}

/// One line of a repository log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub op: Op,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

pub struct JsonlRepository {
    dir: PathBuf,
    writers: HashMap<Repository, BufWriter<File>>,
}

impl JsonlRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: HashMap::new(),
        }
    }

    pub fn path(dir: &Path, repository: Repository) -> PathBuf {
        dir.join(format!("{}.jsonl", repository.as_str()))
    }

    fn writer(&mut self, repository: Repository) -> Result<&mut BufWriter<File>, RepositoryError> {
        if !self.writers.contains_key(&repository) {
            let path = Self::path(&self.dir, repository);
            let io_err = |source| RepositoryError::Io {
                path: path.clone(),
                source,
            };
            fs::create_dir_all(&self.dir).map_err(io_err)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(io_err)?;
            self.writers.insert(repository, BufWriter::new(file));
        }
        self.writers
            .get_mut(&repository)
            .ok_or_else(|| RepositoryError::Io {
                path: Self::path(&self.dir, repository),
                source: io::Error::new(io::ErrorKind::NotFound, "writer not open"),
            })
    }

    fn append(&mut self, repository: Repository, line: &LogLine) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(line)?;
        let path = Self::path(&self.dir, repository);
        let writer = self.writer(repository)?;
        writeln!(writer, "{json}").map_err(|source| RepositoryError::Io { path, source })
    }
}

impl CommandHandler<PersistenceCommand> for JsonlRepository {
    type Error = RepositoryError;

    fn handle(&mut self, command: PersistenceCommand) -> Result<(), RepositoryError> {
        let (repository, line) = match command {
            PersistenceCommand::Store { repository, record } => (
                repository,
                LogLine {
                    op: Op::Store,
                    key: record.key(),
                    record: Some(record),
                },
            ),
            PersistenceCommand::Update { repository, record } => (
                repository,
                LogLine {
                    op: Op::Update,
                    key: record.key(),
                    record: Some(record),
                },
            ),
            PersistenceCommand::Delete { repository, key } => (
                repository,
                LogLine {
                    op: Op::Delete,
                    key,
                    record: None,
                },
            ),
        };
        debug!(repository = repository.as_str(), key = %line.key, op = ?line.op, "persist");
        self.append(repository, &line)
    }

    fn on_stop(&mut self) {
        for (repository, writer) in self.writers.iter_mut() {
            if let Err(e) = writer.flush() {
                warn!(repository = repository.as_str(), error = %e, "flush failed");
            }
        }
    }
}

/// Fold a repository log into the latest record per key. Malformed lines are
/// skipped.
pub fn read_latest(
    dir: &Path,
    repository: Repository,
) -> Result<BTreeMap<String, Record>, RepositoryError> {
    let path = JsonlRepository::path(dir, repository);
    let mut latest = BTreeMap::new();
    if !path.exists() {
        return Ok(latest);
    }

    let io_err = |source| RepositoryError::Io {
        path: path.clone(),
        source,
    };
    let reader = io::BufReader::new(File::open(&path).map_err(io_err)?);
    for line in reader.lines() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<LogLine>(&line) else {
            continue;
        };
        match (entry.op, entry.record) {
            (Op::Delete, _) => {
                latest.remove(&entry.key);
            }
            (_, Some(record)) => {
                latest.insert(entry.key, record);
            }
            (_, None) => {}
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickreplay_core::domain::{Order, OrderId, OrderStatus, StrategyId};

    fn order(status: OrderStatus) -> Order {
        let mut order = Order::buy("BTCUSDT", 1.0).with_price(100.0);
        order.id = OrderId::from(7u64);
        order.status = status;
        order
    }

    #[test]
    fn store_update_delete_fold() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonlRepository::new(dir.path());
        let id = StrategyId::from("s1");

        repo.handle(PersistenceCommand::store_order(&id, &order(OrderStatus::Opened)))
            .unwrap();
        repo.handle(PersistenceCommand::update_order(&id, &order(OrderStatus::Closed)))
            .unwrap();
        repo.on_stop();

        let latest = read_latest(dir.path(), Repository::Orders).unwrap();
        assert_eq!(latest.len(), 1);
        match latest.get("s1/ord_7") {
            Some(Record::Order { order, .. }) => assert_eq!(order.status, OrderStatus::Closed),
            other => panic!("unexpected record: {other:?}"),
        }

        repo.handle(PersistenceCommand::Delete {
            repository: Repository::Orders,
            key: "s1/ord_7".into(),
        })
        .unwrap();
        repo.on_stop();
        assert!(read_latest(dir.path(), Repository::Orders).unwrap().is_empty());

        let lines = fs::read_to_string(JsonlRepository::path(dir.path(), Repository::Orders)).unwrap();
        assert_eq!(lines.lines().count(), 3);
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_latest(dir.path(), Repository::Snapshots).unwrap().is_empty());
    }

    #[test]
    fn unwritable_dir_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").unwrap();
        let mut repo = JsonlRepository::new(blocker.join("nested"));
        let result = repo.handle(PersistenceCommand::store_order(
            &StrategyId::from("s1"),
            &order(OrderStatus::Opened),
        ));
        assert!(matches!(result, Err(RepositoryError::Io { .. })));
    }
}
