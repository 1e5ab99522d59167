//! Entry point for applications: a set of nodes behind one `execute`.
use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    Command,
    comms::{
        ExecuteError, ExecuteResult, Executor, Node, NodeError, NodeManager,
        RoundRobinNodeManager, ThreadPool,
    },
    config::{ClusterConfig, ConfigError},
    protocol::ServerError,
};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("failed to start cluster workers: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Server(ServerError),

    #[error("command cannot be sent: {0}")]
    InvalidRequest(#[source] ExecuteError),

    #[error("no node executed the command after {attempts} attempt(s): {last}")]
    NoUsableNode {
        attempts: usize,
        #[source]
        last: ExecuteError,
    },

    #[error("cluster is shut down")]
    Shutdown,
}

/// A command handed back from [`Cluster::execute_async`] together with how
/// its execution ended.
pub struct AsyncOutcome {
    pub command: Box<dyn Command>,
    pub result: Result<(), ClusterError>,
}

struct ClusterInner {
    retry_count: usize,
    retry_wait: Duration,
    nodes: Vec<Arc<Node>>,
    executors: Vec<Arc<dyn Executor>>,
    node_manager: Box<dyn NodeManager>,
    shutdown: AtomicBool,
}

impl ClusterInner {
    fn execute(&self, command: &mut dyn Command) -> Result<(), ClusterError> {
        let mut last = ExecuteError::NoNodes;
        for attempt in 1..=self.retry_count {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(ClusterError::Shutdown);
            }
            match self.node_manager.execute_on_node(&self.executors, command) {
                ExecuteResult::Success => return Ok(()),
                ExecuteResult::ServerError(e) => return Err(ClusterError::Server(e)),
                ExecuteResult::NotExecuted(e) if !e.is_retryable() => {
                    return Err(ClusterError::InvalidRequest(e));
                }
                ExecuteResult::NotExecuted(e) => {
                    debug!(
                        "attempt {attempt}/{} for {} found no usable node: {e}",
                        self.retry_count,
                        command.request_code()
                    );
                    last = e;
                }
            }
            if attempt < self.retry_count {
                thread::sleep(self.retry_wait);
            }
        }

        warn!(
            "{} not executed after {} attempt(s)",
            command.request_code(),
            self.retry_count
        );
        Err(ClusterError::NoUsableNode {
            attempts: self.retry_count,
            last,
        })
    }
}

/// Runs commands against a set of Riak nodes.
///
/// Each call makes up to `retry_count` passes over the nodes, pausing
/// `retry_wait` between passes. A server error reply or a command that cannot
/// be encoded ends the call at once.
/// A streaming command retried after a partial reply may see the same chunks
/// more than once.
pub struct Cluster {
    inner: Arc<ClusterInner>,
    workers: Mutex<Option<ThreadPool>>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        Self::with_node_manager(config, Box::new(RoundRobinNodeManager::new()))
    }

    pub fn with_node_manager(
        config: ClusterConfig,
        node_manager: Box<dyn NodeManager>,
    ) -> Result<Self, ClusterError> {
        config.validate()?;

        let mut nodes = Vec::with_capacity(config.nodes.len());
        for node_config in &config.nodes {
            let node = Arc::new(Node::new(node_config.clone())?);
            node.start()?;
            nodes.push(node);
        }
        let executors = nodes
            .iter()
            .map(|node| Arc::clone(node) as Arc<dyn Executor>)
            .collect();

        let cluster = Self::assemble(&config, nodes, executors, node_manager)?;
        info!("cluster started with {} node(s)", config.nodes.len());
        Ok(cluster)
    }

    fn assemble(
        config: &ClusterConfig,
        nodes: Vec<Arc<Node>>,
        executors: Vec<Arc<dyn Executor>>,
        node_manager: Box<dyn NodeManager>,
    ) -> Result<Self, ClusterError> {
        let workers =
            ThreadPool::new("riak-worker", config.worker_threads).map_err(ClusterError::Spawn)?;
        Ok(Self {
            inner: Arc::new(ClusterInner {
                retry_count: config.retry_count,
                retry_wait: config.retry_wait,
                nodes,
                executors,
                node_manager,
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Some(workers)),
        })
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.inner.nodes
    }

    pub fn execute(&self, command: &mut dyn Command) -> Result<(), ClusterError> {
        self.inner.execute(command)
    }

    /// Runs the command on a worker thread. The receiver yields exactly one
    /// outcome.
    pub fn execute_async(&self, mut command: Box<dyn Command>) -> mpsc::Receiver<AsyncOutcome> {
        let (sender, receiver) = mpsc::channel();
        let inner = Arc::clone(&self.inner);

        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        match workers.as_ref() {
            Some(pool) if !self.inner.shutdown.load(Ordering::SeqCst) => {
                pool.execute(move || {
                    let result = inner.execute(command.as_mut());
                    let _ = sender.send(AsyncOutcome { command, result });
                });
            }
            _ => {
                debug!("rejecting {}, cluster is shut down", command.request_code());
                let _ = sender.send(AsyncOutcome {
                    command,
                    result: Err(ClusterError::Shutdown),
                });
            }
        }
        receiver
    }

    /// Stops the workers once queued commands finish, then shuts every node
    /// down.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(workers);

        for node in &self.inner.nodes {
            node.shutdown();
        }
        info!("cluster shut down");
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
