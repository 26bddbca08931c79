use std::sync::Arc;

use vdb_core::{Durability, MetricKind};
use vdb_db::VectorDatabase;
use vdb_replication::ReplicationCore;

/// A lone node is its own cluster; once initialized it must be its own
/// leader and able to commit writes without ever talking to a peer.
#[tokio::test]
async fn a_freshly_initialized_single_node_is_its_own_leader() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        VectorDatabase::open(dir.path(), 4, MetricKind::L2, 16, 100, Durability::Strict).unwrap(),
    );
    let core = ReplicationCore::new(1, "127.0.0.1:9001".into(), db)
        .await
        .unwrap();

    assert!(core.is_leader().await);
    assert_eq!(core.self_info(), 1);
}

#[tokio::test]
async fn a_leader_accepts_a_write_and_returns_a_monotonic_log_index() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        VectorDatabase::open(dir.path(), 4, MetricKind::L2, 16, 100, Durability::Strict).unwrap(),
    );
    let core = ReplicationCore::new(1, "127.0.0.1:9002".into(), db)
        .await
        .unwrap();

    let payload = serde_json::json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0]}).to_string();
    let first = core.append(payload.clone()).await.unwrap();
    let second = core.append(payload).await.unwrap();
    assert!(second > first);
}
