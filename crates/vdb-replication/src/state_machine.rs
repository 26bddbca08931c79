use std::io::Cursor;
use std::sync::Arc;

use openraft::storage::{RaftStateMachine, Snapshot};
use openraft::{
    AnyError, EntryPayload, ErrorSubject, ErrorVerb, LogId, OptionalSend, RaftSnapshotBuilder,
    SnapshotMeta, StorageError, StorageIOError, StoredMembership,
};
use parking_lot::RwLock;
use vdb_db::VectorDatabase;

use crate::types::{Entry, NodeId, TypeConfig, UpsertResponse};

/// Applies committed log entries to the vector database and answers the
/// `apply()` caller with just the index that was committed; the actual
/// work of deriving index/filter state lives in `VectorDatabase::upsert`.
pub struct StateMachine {
    db: Arc<VectorDatabase>,
    last_applied: RwLock<Option<LogId<NodeId>>>,
    membership: RwLock<StoredMembership<NodeId, openraft::BasicNode>>,
}

impl StateMachine {
    pub fn new(db: Arc<VectorDatabase>) -> Self {
        Self {
            db,
            last_applied: RwLock::new(None),
            membership: RwLock::new(StoredMembership::default()),
        }
    }
}

/// openraft's own snapshot machinery is never exercised by this system:
/// the durable source of truth is the index snapshot and WAL watermark
/// vdb-store already maintains, not a Raft-level state machine dump. The
/// grounding system stubs this the same way, so this builder returns an
/// empty marker rather than a real serialized state machine image.
#[derive(Clone)]
pub struct EmptySnapshotBuilder {
    last_applied: Option<LogId<NodeId>>,
    membership: StoredMembership<NodeId, openraft::BasicNode>,
}

impl RaftSnapshotBuilder<TypeConfig> for EmptySnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let meta = SnapshotMeta {
            last_log_id: self.last_applied,
            last_membership: self.membership.clone(),
            snapshot_id: format!(
                "{}",
                self.last_applied
                    .map(|l| l.index)
                    .unwrap_or_default()
            ),
        };
        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(Vec::new())),
        })
    }
}

impl RaftStateMachine<TypeConfig> for StateMachine {
    type SnapshotBuilder = EmptySnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<
        (Option<LogId<NodeId>>, StoredMembership<NodeId, openraft::BasicNode>),
        StorageError<NodeId>,
    > {
        Ok((*self.last_applied.read(), self.membership.read().clone()))
    }

    async fn apply<I>(
        &mut self,
        entries: I,
    ) -> Result<Vec<UpsertResponse>, StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
    {
        let mut responses = Vec::new();
        for entry in entries {
            *self.last_applied.write() = Some(entry.log_id);
            let log_index = entry.log_id.index;

            if let EntryPayload::Normal(request) = entry.payload {
                apply_one(&self.db, log_index, &request.payload).map_err(|err| {
                    tracing::error!(log_index, %err, "fatal error applying committed entry");
                    StorageError::IO {
                        source: StorageIOError::new(
                            ErrorSubject::StateMachine,
                            ErrorVerb::Write,
                            AnyError::new(&err),
                        ),
                    }
                })?;
            } else if let EntryPayload::Membership(membership) = entry.payload {
                *self.membership.write() =
                    StoredMembership::new(Some(entry.log_id), membership);
            }

            responses.push(UpsertResponse { log_index });
        }
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        EmptySnapshotBuilder {
            last_applied: *self.last_applied.read(),
            membership: self.membership.read().clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, openraft::BasicNode>,
        _snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        *self.last_applied.write() = meta.last_log_id;
        *self.membership.write() = meta.last_membership.clone();
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        Ok(None)
    }
}

/// A malformed committed entry is fatal, not skippable: the log is the
/// single source of truth for every replica, so silently dropping a
/// record here would let this node's state quietly diverge from the rest
/// of the cluster's.
fn apply_one(db: &VectorDatabase, log_index: u64, payload: &str) -> Result<(), vdb_db::DbError> {
    let value: serde_json::Value = serde_json::from_str(payload).map_err(|err| {
        vdb_db::DbError::Corrupt(format!(
            "committed entry at log_index {log_index} was not valid JSON: {err}"
        ))
    })?;
    let document = vdb_core::Document::new(value);
    let id = document.id().ok_or_else(|| {
        vdb_db::DbError::Corrupt(format!(
            "committed upsert at log_index {log_index} is missing an id"
        ))
    })?;
    let index_type = document
        .index_type()
        .and_then(vdb_core::IndexKind::parse)
        .unwrap_or(vdb_core::IndexKind::Flat);

    db.write_wal_log_at(log_index, "upsert", payload)?;
    db.upsert(id, &document, index_type)
}
