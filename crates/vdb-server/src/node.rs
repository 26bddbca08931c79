use std::sync::Arc;

use tonic::transport::Server;
use vdb_db::VectorDatabase;
use vdb_proto::replication_transport_server::ReplicationTransportServer;
use vdb_replication::ReplicationCore;

use crate::config::NodeConfig;
use crate::error::ServerError;

/// Everything the HTTP handlers need: the database for reads and the
/// non-replicated `/insert` fast path, replication for durable writes.
/// Unidirectional ownership only — the replication core holds a handle to
/// the database, never the other way around.
pub struct Node {
    pub config: NodeConfig,
    pub db: Arc<VectorDatabase>,
    pub replication: ReplicationCore,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self, ServerError> {
        let db = Arc::new(VectorDatabase::open(
            &config.db_path,
            config.dimension,
            config.metric,
            config.hnsw_m,
            config.hnsw_ef_construction,
            config.wal_sync_mode,
        )?);

        let replication = ReplicationCore::new(config.node_id, config.endpoint.clone(), db.clone())
            .await?;

        let node = Self { config, db, replication };
        node.spawn_transport();
        Ok(node)
    }

    /// Starts the inter-node gRPC listener (§4.8 step 6). Its failures are
    /// logged, not propagated, since a transport outage should not prevent
    /// this node from serving reads off its own data.
    fn spawn_transport(&self) {
        let transport = self.replication.transport_server();
        let addr = self.config.endpoint.clone();
        tokio::spawn(async move {
            let Ok(bind) = addr.parse() else {
                tracing::error!(%addr, "invalid replication endpoint, transport not started");
                return;
            };
            if let Err(err) = Server::builder()
                .add_service(ReplicationTransportServer::new(transport))
                .serve(bind)
                .await
            {
                tracing::error!(%err, "replication transport stopped");
            }
        });
    }

    /// Periodic snapshot + shutdown snapshot share this path (§4.8 step 9).
    pub fn take_snapshot(&self) -> Result<(), ServerError> {
        self.db.take_snapshot()?;
        Ok(())
    }
}
