use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use log::debug;

use crate::Command;

use super::node::{ExecuteError, ExecuteResult, Executor};

/// Chooses which node runs a command.
pub trait NodeManager: Send + Sync {
    /// Offers the command to nodes until one executes it. Each node is tried
    /// at most once per call. A command that cannot be sent at all is not
    /// offered to further nodes.
    fn execute_on_node(
        &self,
        nodes: &[Arc<dyn Executor>],
        command: &mut dyn Command,
    ) -> ExecuteResult;
}

/// Starts each call one node further along the list than the previous call.
#[derive(Debug, Default)]
pub struct RoundRobinNodeManager {
    cursor: AtomicUsize,
}

impl RoundRobinNodeManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeManager for RoundRobinNodeManager {
    fn execute_on_node(
        &self,
        nodes: &[Arc<dyn Executor>],
        command: &mut dyn Command,
    ) -> ExecuteResult {
        if nodes.is_empty() {
            return ExecuteResult::NotExecuted(ExecuteError::NoNodes);
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
        let mut last = ExecuteError::NoNodes;
        for offset in 0..nodes.len() {
            let node = &nodes[(start + offset) % nodes.len()];
            match node.execute(command) {
                ExecuteResult::NotExecuted(e) if e.is_retryable() => {
                    debug!("{} not executed on {}: {e}", command.request_code(), node.address());
                    last = e;
                }
                executed => return executed,
            }
        }
        ExecuteResult::NotExecuted(last)
    }
}
