use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use tonic::transport::Channel;
use vdb_proto::replication_transport_client::ReplicationTransportClient;
use vdb_proto::RaftPayload;

use crate::types::{NodeId, TypeConfig};

/// One outbound connection to a peer, opened lazily and reused for every
/// RPC openraft wants to send it.
pub struct PeerClient {
    target: NodeId,
    addr: String,
}

impl PeerClient {
    async fn client(&self) -> Result<ReplicationTransportClient<Channel>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let endpoint = format!("http://{}", self.addr);
        ReplicationTransportClient::connect(endpoint)
            .await
            .map_err(|err| RPCError::Unreachable(Unreachable::new(&std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> RaftPayload {
    RaftPayload {
        data: serde_json::to_vec(value).expect("raft payload always serializes"),
    }
}

fn decode<T: serde::de::DeserializeOwned>(payload: RaftPayload) -> Result<T, serde_json::Error> {
    serde_json::from_slice(&payload.data)
}

impl RaftNetwork<TypeConfig> for PeerClient {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: openraft::network::RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let mut client = self.client().await?;
        let reply = client
            .append_entries(encode(&rpc))
            .await
            .map_err(|status| RPCError::Network(openraft::error::NetworkError::new(&status)))?;
        decode(reply.into_inner())
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: openraft::network::RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let mut client = self.client().await.map_err(|err| match err {
            RPCError::Unreachable(u) => RPCError::Unreachable(u),
            other => RPCError::Network(openraft::error::NetworkError::new(&std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            ))),
        })?;
        let reply = client
            .install_snapshot(encode(&rpc))
            .await
            .map_err(|status| RPCError::Network(openraft::error::NetworkError::new(&status)))?;
        decode(reply.into_inner())
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: openraft::network::RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        let mut client = self.client().await?;
        let reply = client
            .vote(encode(&rpc))
            .await
            .map_err(|status| RPCError::Network(openraft::error::NetworkError::new(&status)))?;
        decode(reply.into_inner())
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }
}

/// Hands out a fresh `PeerClient` per target node; openraft calls this
/// once per RPC rather than holding a connection pool itself.
#[derive(Clone, Default)]
pub struct PeerClientFactory;

impl RaftNetworkFactory<TypeConfig> for PeerClientFactory {
    type Network = PeerClient;

    async fn new_client(&mut self, target: NodeId, node: &BasicNode) -> Self::Network {
        PeerClient {
            target,
            addr: node.addr.clone(),
        }
    }
}

/// Server-side half: receives the opaque envelopes `PeerClient` sends and
/// dispatches them into the local `openraft::Raft` handle.
pub struct TransportServer {
    raft: crate::types::Raft,
}

impl TransportServer {
    pub fn new(raft: crate::types::Raft) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl vdb_proto::replication_transport_server::ReplicationTransport for TransportServer {
    async fn vote(
        &self,
        request: tonic::Request<RaftPayload>,
    ) -> Result<tonic::Response<RaftPayload>, tonic::Status> {
        let rpc: VoteRequest<NodeId> = decode(request.into_inner())
            .map_err(|err| tonic::Status::invalid_argument(err.to_string()))?;
        let reply = self
            .raft
            .vote(rpc)
            .await
            .map_err(|err| tonic::Status::internal(err.to_string()))?;
        Ok(tonic::Response::new(encode(&reply)))
    }

    async fn append_entries(
        &self,
        request: tonic::Request<RaftPayload>,
    ) -> Result<tonic::Response<RaftPayload>, tonic::Status> {
        let rpc: AppendEntriesRequest<TypeConfig> = decode(request.into_inner())
            .map_err(|err| tonic::Status::invalid_argument(err.to_string()))?;
        let reply = self
            .raft
            .append_entries(rpc)
            .await
            .map_err(|err| tonic::Status::internal(err.to_string()))?;
        Ok(tonic::Response::new(encode(&reply)))
    }

    async fn install_snapshot(
        &self,
        request: tonic::Request<RaftPayload>,
    ) -> Result<tonic::Response<RaftPayload>, tonic::Status> {
        let rpc: InstallSnapshotRequest<TypeConfig> = decode(request.into_inner())
            .map_err(|err| tonic::Status::invalid_argument(err.to_string()))?;
        let reply = self
            .raft
            .install_snapshot(rpc)
            .await
            .map_err(|err| tonic::Status::internal(err.to_string()))?;
        Ok(tonic::Response::new(encode(&reply)))
    }
}
