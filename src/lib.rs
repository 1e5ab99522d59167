pub mod cluster;
pub mod command;
pub mod comms;
pub mod config;
pub mod erlang;
pub mod protocol;
pub mod state;

pub use cluster::{AsyncOutcome, Cluster, ClusterError};
pub use command::Command;
pub use comms::{ExecuteResult, Node, NodeState};
pub use config::{ClusterConfig, NodeConfig};
pub use protocol::ServerError;
