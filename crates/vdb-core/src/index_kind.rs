/// Which vector index variant a write or search targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IndexKind {
    Flat,
    Hnsw,
}

impl IndexKind {
    /// Numeric tag used for snapshot file names (`<type_id>.index`),
    /// matching the numbering the filter index's "FILTER" slot follows
    /// in the durability layer (`2`).
    pub fn type_id(self) -> u8 {
        match self {
            Self::Flat => 0,
            Self::Hnsw => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::Hnsw => "HNSW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Some(Self::Flat),
            "HNSW" => Some(Self::Hnsw),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WAL fsync discipline, selectable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// fsync every append.
    Strict,
    /// Flush to the OS page cache only; fastest, weakest guarantee.
    Async,
    /// Flush every append, fsync on a background interval.
    Batch,
}

impl Durability {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "fsync" => Some(Self::Strict),
            "async" => Some(Self::Async),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

impl Default for Durability {
    fn default() -> Self {
        Self::Async
    }
}
