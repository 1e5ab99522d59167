//! Sockets, pools and nodes.
//!
//! A [`Connection`] owns one TCP socket and runs one command at a time. A
//! [`ConnectionManager`] bounds and recycles the connections to one address.
//! A [`Node`] wraps a pool with health tracking, and a [`NodeManager`] picks
//! the node each command runs on.
mod connection;
mod node;
mod node_manager;
mod pool;
mod thread;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{Connection, ConnectionError, ConnectionState, resolve};
pub use node::{
    ExecuteError, ExecuteResult, Executor, HealthCheckBuilder, Node, NodeError, NodeState,
};
pub use node_manager::{NodeManager, RoundRobinNodeManager};
pub use pool::{ConnectionManager, PoolError, PooledConnection};
pub use thread::{Job, PeriodicTask, ThreadPool};
