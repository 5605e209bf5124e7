//! Host collaborator — the game environment the engine schedules against.
//!
//! The engine never discovers topology or runs workload itself. It asks the
//! host for live worker capacity and target snapshots, and asks it to launch
//! workload scripts. Launching is fire-and-forget: there is no completion
//! signal, only the host clock.

use std::future::Future;

use hackbatch_core::{Actor, TargetState};
use serde::{Deserialize, Serialize};

/// Live view of one worker. Owned by the host, refreshed on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerNode {
    pub name: String,
    pub total_capacity: f64,
    pub used_capacity: f64,
    pub cores: u32,
}

/// A request to run `threads` threads of `script` on `worker`.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub script: String,
    pub worker: String,
    pub threads: u32,
    /// The script sleeps this long before operating on the target.
    pub delay_ms: f64,
    pub target: String,
}

/// Process id of a launched script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchHandle(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error("unknown worker: {0}")]
    UnknownWorker(String),
}

/// Everything the engine needs from the game.
pub trait Host: Send + Sync {
    /// Reachable workers with privileges, as of now.
    fn worker_nodes(&self) -> Vec<WorkerNode>;

    /// Live snapshot of a target.
    fn target_state(&self, name: &str) -> Result<TargetState, HostError>;

    /// The node whose skill and cores drive planning.
    fn actor(&self) -> Actor;

    /// Capacity one thread of `script` occupies.
    fn unit_cost(&self, script: &str) -> f64;

    /// Start a script. `None` means it did not start.
    fn launch(&self, request: &LaunchRequest) -> Option<LaunchHandle>;

    /// Host clock in ms.
    fn now_ms(&self) -> f64;

    /// Suspend the caller for `ms` of host time.
    fn sleep(&self, ms: f64) -> impl Future<Output = ()> + Send;
}
