#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open scalar store: {0}")]
    Open(String),

    #[error("scalar store write failed: {0}")]
    Write(String),

    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed wal line: {0}")]
    MalformedWalLine(String),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Open(e.to_string())
    }
}
impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        Self::Write(e.to_string())
    }
}
impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        Self::Write(e.to_string())
    }
}
impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Write(e.to_string())
    }
}
impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        Self::Write(e.to_string())
    }
}
