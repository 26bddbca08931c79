#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Core(#[from] vdb_core::CoreError),

    #[error(transparent)]
    Index(#[from] vdb_index::IndexError),

    #[error(transparent)]
    Store(#[from] vdb_store::StoreError),

    #[error("{0} not found")]
    NotFound(u64),

    #[error("WAL replay cannot continue past a malformed record: {0}")]
    Corrupt(String),
}
