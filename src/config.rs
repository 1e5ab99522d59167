//! Client configuration.
//!
//! Configuration is plain data handed to [`Node`](crate::comms::Node) and
//! [`Cluster`](crate::Cluster) at construction; nothing is read from global
//! state. Defaults follow the settings Riak clients commonly ship with and can
//! all be overridden.
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8087;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("[{address}] max_connections must be at least 1")]
    NoConnections { address: String },

    #[error("[{address}] min_connections ({min}) exceeds max_connections ({max})")]
    MinAboveMax {
        address: String,
        min: usize,
        max: usize,
    },

    #[error("[{address}] {field} must be non-zero")]
    ZeroDuration {
        address: String,
        field: &'static str,
    },

    #[error("failure_threshold must be at least 1")]
    NoFailureThreshold,

    #[error("cluster has no nodes")]
    NoNodes,

    #[error("retry_count must be at least 1")]
    NoAttempts,

    #[error("worker_threads must be at least 1")]
    NoWorkers,
}

/// Settings for one Riak node and its connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// `host:port` or `ip:port`.
    pub address: String,
    pub min_connections: usize,
    pub max_connections: usize,
    /// Bounds connection establishment and waiting for a pooled connection.
    pub connect_timeout: Duration,
    /// Bounds one request/reply round trip.
    pub request_timeout: Duration,
    /// Idle connections older than this are closed by the sweeper.
    pub idle_timeout: Duration,
    pub idle_expiration_interval: Duration,
    pub health_check_interval: Duration,
    /// Consecutive failed executions before the node stops accepting commands
    /// and starts health checking.
    pub failure_threshold: u32,
}

impl NodeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = || self.address.clone();

        if self.max_connections == 0 {
            return Err(ConfigError::NoConnections { address: address() });
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::MinAboveMax {
                address: address(),
                min: self.min_connections,
                max: self.max_connections,
            });
        }
        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
            ("idle_timeout", self.idle_timeout),
            ("idle_expiration_interval", self.idle_expiration_interval),
            ("health_check_interval", self.health_check_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration {
                    address: address(),
                    field,
                });
            }
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::NoFailureThreshold);
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_PORT}"),
            min_connections: 1,
            max_connections: 256,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(4),
            idle_timeout: Duration::from_secs(3),
            idle_expiration_interval: Duration::from_secs(15),
            health_check_interval: Duration::from_millis(125),
            failure_threshold: 3,
        }
    }
}

/// Settings for the cluster facade and its outer retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeConfig>,
    /// Number of node manager passes made for one command.
    pub retry_count: usize,
    /// Pause between passes.
    pub retry_wait: Duration,
    /// Worker threads serving [`Cluster::execute_async`](crate::Cluster::execute_async).
    pub worker_threads: usize,
}

impl ClusterConfig {
    pub fn new(nodes: Vec<NodeConfig>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        if self.retry_count == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.nodes.iter().try_for_each(NodeConfig::validate)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            retry_count: 3,
            retry_wait: Duration::from_millis(200),
            worker_threads: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NodeConfig::default().validate().is_ok());
        assert!(ClusterConfig::new(vec![NodeConfig::default()]).validate().is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let config = NodeConfig {
            min_connections: 5,
            max_connections: 2,
            ..NodeConfig::new("127.0.0.1:8087")
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MinAboveMax {
                address: "127.0.0.1:8087".into(),
                min: 5,
                max: 2
            })
        );
    }

    #[test]
    fn zero_durations_are_rejected() {
        let config = NodeConfig {
            request_timeout: Duration::ZERO,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration {
                field: "request_timeout",
                ..
            })
        ));
    }

    #[test]
    fn cluster_requires_nodes_and_attempts() {
        assert_eq!(ClusterConfig::default().validate(), Err(ConfigError::NoNodes));
        let config = ClusterConfig {
            retry_count: 0,
            ..ClusterConfig::new(vec![NodeConfig::default()])
        };
        assert_eq!(config.validate(), Err(ConfigError::NoAttempts));
    }
}
