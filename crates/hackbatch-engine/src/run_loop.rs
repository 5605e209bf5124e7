//! Run loop — prepares a target, then keeps it cycling through HWGW batches.
//!
//! State machine:
//!
//!   Idle ──► Preparing ──► Cycling ──► Draining ──► Terminated
//!                            │  ▲
//!                            └──┘  (infinite mode)
//!
//! The loop only suspends in two places: the pause between rounds and the
//! back-pressure wait after a capacity stall. Every suspension advances the
//! pending job list by the host time that actually passed. A stop request
//! is honoured at the next suspension point; launched work keeps running.

use hackbatch_core::config::{BatcherConfig, RunConfig};
use hackbatch_core::units::format_duration;
use hackbatch_core::{Formulas, OperationKind, TargetState};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::batch::BatchInfo;
use crate::composer::{Composer, HWGW};
use crate::dispatch::{DispatchError, Dispatcher, Stall};
use crate::host::{Host, HostError};
use crate::planner::Planner;
use crate::pool::WorkerPool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Preparing,
    Cycling,
    Draining,
    Terminated,
}

/// What a run did, returned once it terminates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub target: String,
    pub prepare_jobs: usize,
    pub cycles_composed: u64,
    pub jobs_launched: usize,
    pub threads_launched: u64,
    pub stalls: usize,
    pub launch_failures: usize,
    /// Jobs dropped because they planned zero threads.
    pub skipped_jobs: usize,
    /// Jobs whose completion time passed before they were fully placed.
    pub evicted_jobs: usize,
    /// Jobs still waiting for capacity when the run ended.
    pub unplaced_jobs: usize,
    pub stopped: bool,
    /// Target as observed when the run ended.
    pub final_state: Option<TargetState>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Host(#[from] HostError),
}

pub struct RunLoop<'a, H> {
    host: &'a H,
    formulas: &'a dyn Formulas,
    config: &'a BatcherConfig,
    shutdown: Option<broadcast::Receiver<()>>,
    stopped: bool,
    state: RunState,
    /// Jobs not yet fully placed, in dispatch order.
    pending: BatchInfo,
    /// End time of the latest planned job, relative to now.
    horizon_ms: f64,
    cycle: u64,
    report: RunReport,
}

impl<'a, H: Host> RunLoop<'a, H> {
    pub fn new(host: &'a H, formulas: &'a dyn Formulas, config: &'a BatcherConfig) -> Self {
        Self {
            host,
            formulas,
            config,
            shutdown: None,
            stopped: false,
            state: RunState::Idle,
            pending: BatchInfo::new(),
            horizon_ms: 0.0,
            cycle: 0,
            report: RunReport {
                target: config.target.name.clone(),
                ..RunReport::default()
            },
        }
    }

    /// Stop at the next suspension point once anything arrives on `rx`.
    pub fn with_shutdown(mut self, rx: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Jobs still waiting for capacity.
    pub fn pending(&self) -> &BatchInfo {
        &self.pending
    }

    /// Drive the target until the run finishes, is stopped, or hits an
    /// unsatisfiable plan. Errors are returned without being logged.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        let config = self.config;
        let snapshot = self.host.target_state(&config.target.name)?;
        let actor = self.host.actor();
        tracing::info!(
            target_node = %snapshot.name,
            actor = %actor.name,
            skill = actor.skill,
            security = snapshot.security,
            min_security = snapshot.min_security,
            resource = snapshot.resource,
            max_resource = snapshot.max_resource,
            "run starting"
        );

        let composer = Composer::new(Planner::new(self.formulas, &actor, &config.policy));
        let result = self.drive(&composer, snapshot).await;
        self.state = RunState::Terminated;
        result?;

        self.report.stopped = self.stopped;
        tracing::info!(
            cycles = self.report.cycles_composed,
            jobs = self.report.jobs_launched,
            threads = self.report.threads_launched,
            stalls = self.report.stalls,
            stopped = self.stopped,
            "run terminated"
        );
        Ok(self.report.clone())
    }

    async fn drive(&mut self, composer: &Composer<'_>, snapshot: TargetState) -> Result<(), RunError> {
        let config = self.config;
        let target = snapshot.name.clone();

        self.state = RunState::Preparing;
        if self.stop_requested() {
            return self.drain(&target);
        }
        let (prepare, _) = composer.prepare(snapshot.clone());
        let mut state = if prepare.is_empty() {
            tracing::info!(target_node = %target, "target already prepared");
            snapshot
        } else {
            self.report.prepare_jobs = prepare.len();
            self.horizon_ms = prepare.last_end_ms();
            tracing::info!(
                target_node = %target,
                jobs = prepare.len(),
                kinds = ?prepare.kinds(),
                ready_in = %format_duration(self.horizon_ms),
                "preparing target"
            );
            self.pending.append(prepare.with_cycle(0));
            if !self.dispatch_to_completion().await? {
                return self.drain(&target);
            }
            let wait = self.horizon_ms;
            if !self.suspend(wait).await {
                return self.drain(&target);
            }
            let observed = self.host.target_state(&target)?;
            tracing::info!(
                target_node = %target,
                security = observed.security,
                min_security = observed.min_security,
                resource = observed.resource,
                max_resource = observed.max_resource,
                "preparation landed"
            );
            observed
        };

        self.state = RunState::Cycling;
        loop {
            if self.stop_requested() {
                break;
            }
            state = self.compose_round(composer, state)?;

            if !config.run.infinite {
                self.dispatch_to_completion().await?;
                break;
            }
            self.dispatch()?;
            if !self.suspend(config.run.cycle_pause_ms).await {
                break;
            }
        }

        self.drain(&target)
    }

    fn drain(&mut self, target: &str) -> Result<(), RunError> {
        self.state = RunState::Draining;
        if !self.pending.is_empty() {
            tracing::info!(
                pending = self.pending.len(),
                "run ending with jobs never launched"
            );
        }
        self.report.unplaced_jobs = self.pending.len();
        self.report.final_state = self.host.target_state(target).ok();
        Ok(())
    }

    /// Queue up to `batches_per_round` cycles after the current horizon.
    /// Returns the state predicted once the last queued cycle lands.
    ///
    /// Cycles are only queued while the horizon is inside the schedule
    /// window and while the pool has room for them next to the jobs already
    /// pending. The first cycle of a round ignores the capacity check when
    /// nothing is pending, so an oversized cycle still reaches dispatch.
    fn compose_round(
        &mut self,
        composer: &Composer<'_>,
        mut state: TargetState,
    ) -> Result<TargetState, RunError> {
        let config = self.config;
        let run = &config.run;
        if !run.chain_speculative {
            state = self.host.target_state(&state.name)?;
        }

        // Every queued cycle lands within one weaken, one full round and one
        // pause of now, so start delays stay bounded in infinite mode.
        let round_span = f64::from(run.batches_per_round)
            * HWGW.len() as f64
            * config.policy.settle_gap_ms;
        let window = composer
            .planner()
            .plan(OperationKind::Weaken, &state)
            .duration_ms
            + round_span
            + run.cycle_pause_ms;

        let host = self.host;
        let unit_cost = |kind: OperationKind| host.unit_cost(kind.script(&config.scripts));
        let mut budget = WorkerPool::new(host, &config.pool).capacity().available
            - self.pending.capacity_needed(unit_cost);

        for _ in 0..run.batches_per_round {
            if self.pending.len() >= run.max_pending_jobs {
                tracing::debug!(pending = self.pending.len(), "pending limit reached");
                break;
            }
            if run.max_completion_ms > 0.0 && self.horizon_ms >= run.max_completion_ms {
                tracing::debug!(
                    horizon = %format_duration(self.horizon_ms),
                    "completion horizon reached"
                );
                break;
            }

            if self.horizon_ms >= window {
                tracing::debug!(
                    horizon = %format_duration(self.horizon_ms),
                    window = %format_duration(window),
                    "schedule window full"
                );
                break;
            }

            let (cycle, next) = composer.compose_cycle(state.clone(), self.horizon_ms);
            let needed = cycle.capacity_needed(unit_cost);
            if needed > budget && !self.pending.is_empty() {
                tracing::debug!(needed, available = budget, "no capacity for another cycle");
                break;
            }
            budget -= needed;
            self.cycle += 1;
            let cycle = cycle.with_cycle(self.cycle);
            self.horizon_ms = self.horizon_ms.max(cycle.last_end_ms());
            tracing::info!(
                cycle = self.cycle,
                jobs = cycle.len(),
                lands_in = %format_duration(cycle.last_end_ms()),
                "batch queued"
            );
            self.pending.append(cycle);
            self.report.cycles_composed += 1;
            state = next;
        }

        Ok(state)
    }

    /// One dispatch pass over the pending list.
    fn dispatch(&mut self) -> Result<Option<Stall>, RunError> {
        let config = self.config;
        let dispatcher = Dispatcher::new(self.host, &config.pool, &config.scripts);
        let outcome = dispatcher.execute(&mut self.pending)?;

        self.report.jobs_launched += outcome.jobs_launched;
        self.report.threads_launched += outcome.threads_launched;
        self.report.launch_failures += outcome.launch_failures;
        self.report.skipped_jobs += outcome.skipped;
        if outcome.stalled.is_some() {
            self.report.stalls += 1;
        }
        Ok(outcome.stalled)
    }

    /// Dispatch until the pending list is empty, waiting out every stall.
    /// `Ok(false)` means a stop request interrupted the wait.
    async fn dispatch_to_completion(&mut self) -> Result<bool, RunError> {
        while let Some(stall) = self.dispatch()? {
            let wait = backpressure_wait(&self.config.run, stall.duration_ms);
            tracing::info!(
                cycle = stall.cycle,
                kind = %stall.kind,
                remaining = stall.remaining,
                wait = %format_duration(wait),
                "paused for capacity"
            );
            if !self.suspend(wait).await {
                return Ok(false);
            }
            tracing::debug!(pending = self.pending.len(), "resuming dispatch");
        }
        Ok(true)
    }

    /// Sleep `ms` of host time, then shift the pending list by however much
    /// time actually passed. `false` if a stop request cut the sleep short.
    async fn suspend(&mut self, ms: f64) -> bool {
        if self.stop_requested() {
            return false;
        }

        let started = self.host.now_ms();
        let stopped = match self.shutdown.as_mut() {
            Some(rx) => tokio::select! {
                _ = self.host.sleep(ms) => false,
                _ = stop_signal(rx) => true,
            },
            None => {
                self.host.sleep(ms).await;
                false
            }
        };

        let elapsed = (self.host.now_ms() - started).max(0.0);
        let evicted = self.pending.advance(elapsed);
        if !evicted.is_empty() {
            tracing::warn!(
                evicted = evicted.len(),
                cycles = ?evicted.iter().map(|j| j.cycle).collect::<Vec<_>>(),
                "jobs expired before they could be placed"
            );
            self.report.evicted_jobs += evicted.len();
        }
        self.horizon_ms = (self.horizon_ms - elapsed).max(0.0);

        if stopped {
            self.mark_stopped();
        }
        !stopped
    }

    fn stop_requested(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        let requested = match self.shutdown.as_mut() {
            Some(rx) => matches!(rx.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_))),
            None => false,
        };
        if requested {
            self.mark_stopped();
        }
        requested
    }

    fn mark_stopped(&mut self) {
        tracing::info!(state = ?self.state, "stop requested");
        self.stopped = true;
    }
}

/// Half the stalled job's duration, within the configured bounds.
fn backpressure_wait(run: &RunConfig, duration_ms: f64) -> f64 {
    let min = run.backpressure_min_ms.max(1.0);
    let max = run.backpressure_max_ms.max(min);
    (duration_ms / 2.0).clamp(min, max)
}

/// Resolves on a stop request. A closed channel never requests a stop.
async fn stop_signal(rx: &mut broadcast::Receiver<()>) {
    match rx.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => std::future::pending::<()>().await,
    }
}
