use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Db(#[from] vdb_db::DbError),

    #[error(transparent)]
    Replication(#[from] vdb_replication::ReplicationError),

    #[error("node is shutting down")]
    Fatal(String),
}

/// Converts an internal error into the `{retCode, msg}` envelope every
/// handler responds with on failure, choosing an HTTP status the same way
/// the request/transient/durability taxonomy separates them.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, ret_code) = match &self {
            ServerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, 1),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, 400),
            ServerError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
            ServerError::Replication(vdb_replication::ReplicationError::NotLeader) => {
                (StatusCode::SERVICE_UNAVAILABLE, 1001)
            }
            ServerError::Replication(vdb_replication::ReplicationError::NoQuorum) => {
                (StatusCode::SERVICE_UNAVAILABLE, 1002)
            }
            ServerError::Replication(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
            ServerError::Fatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
        };
        (status, Json(json!({ "retCode": ret_code, "msg": self.to_string() }))).into_response()
    }
}
