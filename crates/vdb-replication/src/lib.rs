mod core;
mod error;
mod log_store;
mod network;
mod state_machine;
mod types;

pub use crate::core::{NodeStatus, ReplicationCore};
pub use error::ReplicationError;
pub use network::TransportServer;
pub use types::NodeId;
