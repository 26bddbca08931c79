use std::collections::BTreeMap;
use std::sync::Arc;

use openraft::storage::{LogFlushed, LogState, RaftLogReader, RaftLogStorage};
use openraft::{LogId, OptionalSend, StorageError, Vote};
use parking_lot::RwLock;

use crate::types::{Entry, TypeConfig};

/// Raft's own log of committed/uncommitted entries, kept purely in memory.
///
/// Durability for this system does not live here: every entry that reaches
/// the state machine's `apply()` is fsynced to the write-ahead log before
/// the commit callback returns, the same separation the system this was
/// built from drew between its consensus log and its persistence layer.
/// Losing this in-memory log on crash just means the node re-joins the
/// cluster and catches up via `InstallSnapshot`/`AppendEntries` replay.
#[derive(Debug, Default)]
struct LogStoreInner {
    log: BTreeMap<u64, Entry>,
    vote: Option<Vote<crate::types::NodeId>>,
    last_purged: Option<LogId<crate::types::NodeId>>,
}

#[derive(Debug, Clone, Default)]
pub struct LogStore {
    inner: Arc<RwLock<LogStoreInner>>,
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: std::ops::RangeBounds<u64> + Clone + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry>, StorageError<crate::types::NodeId>> {
        let inner = self.inner.read();
        Ok(inner
            .log
            .range(range)
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(
        &mut self,
    ) -> Result<LogState<TypeConfig>, StorageError<crate::types::NodeId>> {
        let inner = self.inner.read();
        let last = inner.log.values().last().map(|e| e.log_id);
        Ok(LogState {
            last_purged_log_id: inner.last_purged,
            last_log_id: last,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(
        &mut self,
        vote: &Vote<crate::types::NodeId>,
    ) -> Result<(), StorageError<crate::types::NodeId>> {
        self.inner.write().vote = Some(*vote);
        Ok(())
    }

    async fn read_vote(
        &mut self,
    ) -> Result<Option<Vote<crate::types::NodeId>>, StorageError<crate::types::NodeId>> {
        Ok(self.inner.read().vote)
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), StorageError<crate::types::NodeId>>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
    {
        {
            let mut inner = self.inner.write();
            for entry in entries {
                inner.log.insert(entry.log_id.index, entry);
            }
        }
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(
        &mut self,
        log_id: LogId<crate::types::NodeId>,
    ) -> Result<(), StorageError<crate::types::NodeId>> {
        self.inner.write().log.split_off(&log_id.index);
        Ok(())
    }

    async fn purge(
        &mut self,
        log_id: LogId<crate::types::NodeId>,
    ) -> Result<(), StorageError<crate::types::NodeId>> {
        let mut inner = self.inner.write();
        inner.log = inner.log.split_off(&(log_id.index + 1));
        inner.last_purged = Some(log_id);
        Ok(())
    }
}
