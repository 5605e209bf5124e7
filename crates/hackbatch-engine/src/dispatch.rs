//! Dispatch engine — spreads each job's threads across the worker pool.
//!
//! Jobs are taken strictly in list order. For the job at the front, workers
//! are polled fresh and tried largest-first; each takes as many whole threads
//! as fit. A job that cannot be fully placed stays at the front with its
//! remaining thread count and dispatch stops, leaving the caller to wait for
//! capacity. A thread that no single worker could ever hold is fatal.

use hackbatch_core::config::{PoolConfig, ScriptConfig};
use hackbatch_core::OperationKind;

use crate::batch::{BatchInfo, PlannedJob};
use crate::host::{Host, LaunchRequest};
use crate::pool::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(
        "{kind} x{threads} on {target} can never be placed: one thread needs {unit_cost} capacity, \
         largest worker offers {largest_worker} (pool total {pool_total})"
    )]
    Unsatisfiable {
        kind: OperationKind,
        target: String,
        threads: u32,
        unit_cost: f64,
        largest_worker: f64,
        pool_total: f64,
    },
}

/// The job dispatch stopped at for lack of capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Stall {
    pub cycle: u64,
    pub step: usize,
    pub kind: OperationKind,
    /// Threads still unplaced.
    pub remaining: u32,
    pub duration_ms: f64,
    /// Capacity free across the pool when dispatch gave up.
    pub available: f64,
}

/// What one [`Dispatcher::execute`] call achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Jobs fully placed and removed from the list.
    pub jobs_launched: usize,
    pub threads_launched: u64,
    pub launch_failures: usize,
    /// Jobs dropped because they planned zero threads.
    pub skipped: usize,
    pub stalled: Option<Stall>,
}

pub struct Dispatcher<'a, H: ?Sized> {
    host: &'a H,
    pool: WorkerPool<'a, H>,
    scripts: &'a ScriptConfig,
}

impl<'a, H: Host + ?Sized> Dispatcher<'a, H> {
    pub fn new(host: &'a H, pool: &'a PoolConfig, scripts: &'a ScriptConfig) -> Self {
        Self {
            host,
            pool: WorkerPool::new(host, pool),
            scripts,
        }
    }

    /// Place jobs from the front of `batch` until it is empty or capacity
    /// runs out. Placed jobs are removed; a partially placed job keeps its
    /// remaining thread count.
    pub fn execute(&self, batch: &mut BatchInfo) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        while let Some(job) = batch.front_mut() {
            if job.threads == 0 {
                if !job.is_partially_launched() {
                    tracing::warn!(
                        kind = %job.kind,
                        target_node = %job.target,
                        cycle = job.cycle,
                        "no work needed, skipping job"
                    );
                    report.skipped += 1;
                }
                batch.pop_front();
                continue;
            }

            let script = job.kind.script(self.scripts);
            let unit_cost = self.host.unit_cost(script);
            let capacity = self.pool.capacity();
            if unit_cost > capacity.largest {
                return Err(DispatchError::Unsatisfiable {
                    kind: job.kind,
                    target: job.target.clone(),
                    threads: job.threads,
                    unit_cost,
                    largest_worker: capacity.largest,
                    pool_total: capacity.total,
                });
            }

            self.allocate(job, script, unit_cost, &mut report);

            if job.threads > 0 {
                let available = self.pool.capacity().available;
                tracing::info!(
                    kind = %job.kind,
                    cycle = job.cycle,
                    step = job.step,
                    remaining = job.threads,
                    required = unit_cost * job.threads as f64,
                    available,
                    "insufficient capacity, job queued"
                );
                report.stalled = Some(Stall {
                    cycle: job.cycle,
                    step: job.step,
                    kind: job.kind,
                    remaining: job.threads,
                    duration_ms: job.duration_ms,
                    available,
                });
                return Ok(report);
            }

            report.jobs_launched += 1;
            batch.pop_front();
        }

        Ok(report)
    }

    fn allocate(
        &self,
        job: &mut PlannedJob,
        script: &str,
        unit_cost: f64,
        report: &mut DispatchReport,
    ) {
        for worker in self.pool.ranked() {
            if job.threads == 0 {
                break;
            }
            let fit = worker.threads_fitting(unit_cost);
            if fit == 0 {
                // Ranked by available capacity: nothing further down fits either.
                break;
            }
            let threads = fit.min(job.threads);
            let request = LaunchRequest {
                script: script.to_string(),
                worker: worker.name.clone(),
                threads,
                delay_ms: job.delay_ms,
                target: job.target.clone(),
            };

            match self.host.launch(&request) {
                Some(handle) => {
                    job.threads -= threads;
                    report.threads_launched += threads as u64;
                    tracing::debug!(
                        pid = handle.0,
                        kind = %job.kind,
                        worker = %worker.name,
                        threads,
                        delay_ms = job.delay_ms,
                        remaining = job.threads,
                        "job allocated"
                    );
                }
                None => {
                    report.launch_failures += 1;
                    tracing::warn!(
                        script,
                        worker = %worker.name,
                        threads,
                        "launch failed, trying next worker"
                    );
                }
            }
        }
    }
}
