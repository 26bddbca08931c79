pub mod any;
pub mod error;
pub mod filter;
pub mod flat;
pub mod hnsw;

pub use any::AnyIndex;
pub use error::IndexError;
pub use filter::FilterIndex;
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
