use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    Command,
    command::Ping,
    config::{ConfigError, NodeConfig},
    protocol::{ReadOutcome, ServerError, TransportError},
    state::{ManagedState, StateManager},
};

use super::{
    connection::ConnectionError,
    pool::{ConnectionManager, PoolError},
    thread::PeriodicTask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Running,
    HealthChecking,
    Shutdown,
}

impl ManagedState for NodeState {
    fn as_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NodeState::Created),
            1 => Some(NodeState::Running),
            2 => Some(NodeState::HealthChecking),
            3 => Some(NodeState::Shutdown),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            NodeState::Created => "created",
            NodeState::Running => "running",
            NodeState::HealthChecking => "health checking",
            NodeState::Shutdown => "shut down",
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to spawn node task: {0}")]
    Spawn(#[from] io::Error),
}

/// Why a command never reached a usable node.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("node {address} is {state}")]
    Unavailable {
        address: String,
        state: &'static str,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("no nodes to execute on")]
    NoNodes,
}

impl ExecuteError {
    /// False when the command itself is at fault, so no other node or later
    /// attempt can do better.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ExecuteError::Connection(ConnectionError::Transport(TransportError::InvalidRequest(_)))
        )
    }
}

/// Outcome of handing a command to one node.
#[derive(Debug)]
pub enum ExecuteResult {
    Success,
    /// The node answered with an application error.
    ServerError(ServerError),
    /// The command did not complete on this node and may be tried elsewhere.
    NotExecuted(ExecuteError),
}

impl ExecuteResult {
    /// True when the node gave a definitive answer, success or error.
    pub fn executed(&self) -> bool {
        !matches!(self, ExecuteResult::NotExecuted(_))
    }
}

/// Anything a [`NodeManager`](super::NodeManager) can route commands to.
pub trait Executor: Send + Sync {
    fn address(&self) -> &str;

    fn execute(&self, command: &mut dyn Command) -> ExecuteResult;
}

/// Builds the command a node runs to decide whether it has recovered.
pub type HealthCheckBuilder = Arc<dyn Fn() -> Box<dyn Command> + Send + Sync>;

struct NodeInner {
    config: NodeConfig,
    pool: Arc<ConnectionManager>,
    state: StateManager<NodeState>,
    consecutive_failures: AtomicU32,
    health_check: HealthCheckBuilder,
}

impl NodeInner {
    fn execute(&self, command: &mut dyn Command) -> ExecuteResult {
        let state = self.state.get_state();
        if state != NodeState::Running {
            return ExecuteResult::NotExecuted(ExecuteError::Unavailable {
                address: self.config.address.clone(),
                state: state.name(),
            });
        }

        let mut connection = match self.pool.acquire() {
            Ok(connection) => connection,
            Err(e) => {
                if e.is_node_fault() {
                    self.record_failure();
                }
                return ExecuteResult::NotExecuted(e.into());
            }
        };

        match connection.execute(command) {
            Ok(ReadOutcome::Success) => {
                self.record_success();
                ExecuteResult::Success
            }
            Ok(ReadOutcome::ServerError(e)) => {
                self.record_success();
                ExecuteResult::ServerError(e)
            }
            Err(e) => {
                debug!("{} failed on {}: {e}", command.request_code(), self.config.address);
                if e.is_node_fault() {
                    self.record_failure();
                }
                ExecuteResult::NotExecuted(e.into())
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.config.failure_threshold
            && self
                .state
                .compare_and_set(NodeState::Running, NodeState::HealthChecking)
        {
            warn!(
                "node {} failed {failures} times in a row, health checking",
                self.config.address
            );
            self.pool.drain_idle();
        }
    }

    fn health_check_tick(&self) {
        if !self.state.is_current_state(NodeState::HealthChecking) {
            return;
        }

        let mut command = (self.health_check)();
        let healthy = match self.pool.acquire() {
            Ok(mut connection) => match connection.execute(command.as_mut()) {
                Ok(ReadOutcome::Success) => true,
                Ok(ReadOutcome::ServerError(e)) => {
                    debug!("health check on {} answered {e}", self.config.address);
                    false
                }
                Err(e) => {
                    debug!("health check on {} failed: {e}", self.config.address);
                    false
                }
            },
            Err(e) => {
                debug!("health check on {} failed: {e}", self.config.address);
                false
            }
        };

        if healthy
            && self
                .state
                .compare_and_set(NodeState::HealthChecking, NodeState::Running)
        {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            info!("node {} is healthy again", self.config.address);
        }
    }
}

/// One Riak node: its connection pool, its health and its background tasks.
///
/// A node accepts commands only while running. After `failure_threshold`
/// consecutive connection-level failures it moves to health checking, stops
/// accepting commands and checks the server every `health_check_interval`
/// until a check succeeds. Server error replies are answers, not failures.
pub struct Node {
    inner: Arc<NodeInner>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_health_check(config, Arc::new(|| Box::new(Ping::new()) as Box<dyn Command>))
    }

    pub fn with_health_check(
        config: NodeConfig,
        health_check: HealthCheckBuilder,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let pool = ConnectionManager::new(config.clone())?;

        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                pool: Arc::new(pool),
                state: StateManager::from_enum(NodeState::Created),
                consecutive_failures: AtomicU32::new(0),
                health_check,
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Opens the minimum connections and starts the health check and idle
    /// sweep tasks. Starting a node that is not freshly created does nothing.
    pub fn start(&self) -> Result<(), NodeError> {
        if !self
            .inner
            .state
            .compare_and_set(NodeState::Created, NodeState::Running)
        {
            debug!("node {} already started", self.inner.config.address);
            return Ok(());
        }

        let opened = self.inner.pool.fill();
        if opened < self.inner.config.min_connections {
            warn!(
                "node {} started with {opened} of {} minimum connections",
                self.inner.config.address, self.inner.config.min_connections
            );
        }

        let inner = Arc::clone(&self.inner);
        let health = PeriodicTask::spawn(
            format!("riak-health-{}", self.inner.config.address),
            self.inner.config.health_check_interval,
            move || inner.health_check_tick(),
        )?;

        let pool = Arc::clone(&self.inner.pool);
        let sweeper = PeriodicTask::spawn(
            format!("riak-idle-{}", self.inner.config.address),
            self.inner.config.idle_expiration_interval,
            move || {
                pool.sweep();
            },
        )?;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(health);
        tasks.push(sweeper);
        info!("node {} running", self.inner.config.address);
        Ok(())
    }

    pub fn execute(&self, command: &mut dyn Command) -> ExecuteResult {
        self.inner.execute(command)
    }

    pub fn shutdown(&self) {
        if self.inner.state.is_current_state(NodeState::Shutdown) {
            return;
        }
        self.inner.state.set_state(NodeState::Shutdown);
        self.inner.pool.shutdown();

        let tasks: Vec<PeriodicTask> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drop(tasks);
        info!("node {} shut down", self.inner.config.address);
    }

    pub fn state(&self) -> NodeState {
        self.inner.state.get_state()
    }

    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.inner.pool
    }
}

impl Executor for Node {
    fn address(&self) -> &str {
        Node::address(self)
    }

    fn execute(&self, command: &mut dyn Command) -> ExecuteResult {
        Node::execute(self, command)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}
