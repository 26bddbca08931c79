use std::collections::BTreeMap;
use std::sync::Arc;

use openraft::{BasicNode, Config};
use vdb_db::VectorDatabase;

use crate::error::ReplicationError;
use crate::log_store::LogStore;
use crate::network::PeerClientFactory;
use crate::state_machine::StateMachine;
use crate::types::{NodeId, Raft, TypeConfig, UpsertRequest};

#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub endpoint: String,
    pub state: String,
    pub last_log_idx: u64,
    pub last_succ_resp_us: u64,
}

/// The replication-facing handle a node process wires up once at startup.
///
/// Election timeouts are suppressed until `enable_election_timeout` is
/// called explicitly: a node that just replayed its WAL and is waiting to
/// be told about the rest of the cluster should not spontaneously start a
/// campaign before it even knows who its peers are.
pub struct ReplicationCore {
    id: NodeId,
    raft: Raft,
}

impl ReplicationCore {
    pub async fn new(
        id: NodeId,
        addr: String,
        db: Arc<VectorDatabase>,
    ) -> Result<Self, ReplicationError> {
        let config = Arc::new(
            Config::default()
                .validate()
                .map_err(|err| ReplicationError::Fatal(err.to_string()))?,
        );

        let log_store = LogStore::default();
        let state_machine = StateMachine::new(db);
        let network = PeerClientFactory;

        let raft = Raft::new(id, config, network, log_store, state_machine)
            .await
            .map_err(|err| ReplicationError::Fatal(err.to_string()))?;

        // Parked until a caller has learned about the rest of the cluster
        // and calls `enable_election_timeout` explicitly.
        raft.enable_elect(false);

        let mut members = BTreeMap::new();
        members.insert(id, BasicNode::new(addr));
        raft.initialize(members)
            .await
            .map_err(|err| ReplicationError::Fatal(err.to_string()))?;

        Ok(Self { id, raft })
    }

    pub fn self_info(&self) -> NodeId {
        self.id
    }

    /// Builds the gRPC-facing handle a node binds once at startup to
    /// receive RPCs from peers; cheap to construct since `Raft` is itself
    /// a clonable handle over the shared runtime state.
    pub fn transport_server(&self) -> crate::network::TransportServer {
        crate::network::TransportServer::new(self.raft.clone())
    }

    /// Allows this node to start or respond to elections. Called once a
    /// node has learned about the rest of the cluster topology, not at
    /// construction time.
    pub async fn enable_election_timeout(&self) {
        self.raft.enable_elect(true);
    }

    pub async fn is_leader(&self) -> bool {
        self.raft.current_leader().await == Some(self.id)
    }

    pub async fn list_peers(&self) -> Vec<(NodeId, String)> {
        let metrics = self.raft.metrics().borrow().clone();
        metrics
            .membership_config
            .nodes()
            .map(|(id, node)| (*id, node.addr.clone()))
            .collect()
    }

    /// One row per `/admin/listNode`: current committed index and whether
    /// this node believes itself leader, follower, or candidate.
    pub async fn list_nodes(&self) -> Vec<NodeStatus> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = metrics.current_leader;
        metrics
            .membership_config
            .nodes()
            .map(|(id, node)| NodeStatus {
                node_id: *id,
                endpoint: node.addr.clone(),
                state: if leader == Some(*id) { "leader" } else { "follower" }.to_string(),
                last_log_idx: metrics.last_log_index.unwrap_or(0),
                last_succ_resp_us: 0,
            })
            .collect()
    }

    pub async fn self_status(&self) -> NodeStatus {
        self.list_nodes()
            .await
            .into_iter()
            .find(|n| n.node_id == self.id)
            .unwrap_or(NodeStatus {
                node_id: self.id,
                endpoint: String::new(),
                state: "unknown".into(),
                last_log_idx: 0,
                last_succ_resp_us: 0,
            })
    }

    /// Proposes one upsert through consensus; only the leader can call
    /// this successfully, every other node must fail fast so the HTTP
    /// layer can redirect the caller instead of hanging.
    pub async fn append(&self, payload: String) -> Result<u64, ReplicationError> {
        if !self.is_leader().await {
            return Err(ReplicationError::NotLeader);
        }
        let response = self
            .raft
            .client_write(UpsertRequest { payload })
            .await
            .map_err(|err| match err {
                openraft::error::RaftError::APIError(
                    openraft::error::ClientWriteError::ForwardToLeader(_),
                ) => ReplicationError::NotLeader,
                other => ReplicationError::Fatal(other.to_string()),
            })?;
        Ok(response.log_id.index)
    }

    /// Adds a new voting member to the cluster. Only meaningful when
    /// called against the current leader.
    pub async fn add_server(&self, id: NodeId, addr: String) -> Result<(), ReplicationError> {
        self.raft
            .add_learner(id, BasicNode::new(addr), true)
            .await
            .map_err(|err| ReplicationError::Fatal(err.to_string()))?;

        let mut members = self.list_peers().await.into_iter().map(|(id, _)| id).collect::<std::collections::BTreeSet<_>>();
        members.insert(id);
        self.raft
            .change_membership(members, false)
            .await
            .map_err(|err| ReplicationError::Fatal(err.to_string()))?;
        Ok(())
    }
}
