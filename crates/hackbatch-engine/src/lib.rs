//! hackbatch-engine — batch construction and execution.
//!
//! Plans hack/grow/weaken jobs against a speculative target snapshot,
//! staggers their start delays so completions land in order, and spreads
//! each job's threads across a capacity-limited worker pool.

pub mod batch;
pub mod composer;
pub mod dispatch;
pub mod host;
pub mod planner;
pub mod pool;
pub mod run_loop;
pub mod sim;

pub use batch::{BatchInfo, PlannedJob};
pub use composer::Composer;
pub use dispatch::{DispatchError, DispatchReport, Dispatcher, Stall};
pub use host::{Host, HostError, LaunchHandle, LaunchRequest, WorkerNode};
pub use planner::{Plan, Planner};
pub use pool::{PoolCapacity, WorkerCapacity, WorkerPool};
pub use run_loop::{RunError, RunLoop, RunReport, RunState};
pub use sim::{NetworkError, NetworkSpec, SimHost, WorkerSpec};
