/// Shared error type for request-level failures: malformed input,
/// dimension mismatches, unknown index types. These map to HTTP 400 at
/// the server boundary and never reach the commit path.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("document is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown index type `{0}`")]
    UnknownIndexType(String),

    #[error("unknown filter operator `{0}`")]
    UnknownFilterOp(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

/// A condition that should take the node out of service rather than be
/// reported to a single caller: a durability-layer write failure, or a
/// WAL/snapshot that fails to replay cleanly at startup.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("durability failure: {0}")]
    Durability(String),

    #[error("replay failure: {0}")]
    Replay(String),
}
