use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;
use vdb_core::{Durability, MetricKind};
use vdb_db::VectorDatabase;
use vdb_proto::replication_transport_server::ReplicationTransportServer;
use vdb_replication::ReplicationCore;

struct Harness {
    core: Arc<ReplicationCore>,
}

async fn spawn_node(id: u64, port: u16, dir: &std::path::Path) -> Harness {
    let db = Arc::new(
        VectorDatabase::open(dir, 4, MetricKind::L2, 16, 100, Durability::Strict).unwrap(),
    );
    let addr = format!("127.0.0.1:{port}");
    let core = Arc::new(ReplicationCore::new(id, addr.clone(), db).await.unwrap());

    let transport = core.transport_server();
    let bind: std::net::SocketAddr = addr.parse().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(ReplicationTransportServer::new(transport))
            .serve(bind)
            .await
            .ok();
    });

    Harness { core }
}

/// Three freshly joined nodes: only the node the cluster was initialized
/// on is leader, and writes proposed on either follower fail fast rather
/// than blocking, matching the leader-only-writes property.
#[tokio::test]
async fn followers_reject_writes_while_the_leader_commits_them() {
    let dir1 = tempfile::tempdir().unwrap();
    let dir2 = tempfile::tempdir().unwrap();
    let dir3 = tempfile::tempdir().unwrap();

    let leader = spawn_node(1, 19101, dir1.path()).await;
    let follower_a = spawn_node(2, 19102, dir2.path()).await;
    let follower_b = spawn_node(3, 19103, dir3.path()).await;

    leader
        .core
        .add_server(2, "127.0.0.1:19102".into())
        .await
        .unwrap();
    leader
        .core
        .add_server(3, "127.0.0.1:19103".into())
        .await
        .unwrap();
    leader.core.enable_election_timeout().await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(leader.core.is_leader().await);

    let rejected_a = follower_a
        .core
        .append(serde_json::json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0]}).to_string())
        .await;
    assert!(rejected_a.is_err());

    let rejected_b = follower_b
        .core
        .append(serde_json::json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0]}).to_string())
        .await;
    assert!(rejected_b.is_err());

    leader
        .core
        .append(serde_json::json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0]}).to_string())
        .await
        .unwrap();
}
