use openraft::BasicNode;
use std::io::Cursor;

/// One committed log entry: the raw JSON bytes of an upsert request, as
/// submitted by the HTTP `/upsert` handler.
pub type Entry = openraft::Entry<TypeConfig>;

openraft::declare_raft_types!(
    pub TypeConfig:
        D = UpsertRequest,
        R = UpsertResponse,
        Node = BasicNode,
);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpsertRequest {
    /// Raw JSON body of the upsert request, applied verbatim by the
    /// state machine's commit callback.
    pub payload: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpsertResponse {
    pub log_index: u64,
}

pub type NodeId = u64;
pub type Raft = openraft::Raft<TypeConfig>;
