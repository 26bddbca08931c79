use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("this node is not the leader; forward the request instead")]
    NotLeader,

    #[error("no quorum is currently reachable, retry later")]
    NoQuorum,

    #[error("replication layer fatal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Db(#[from] vdb_db::DbError),

    #[error("transport error: {0}")]
    Transport(String),
}
