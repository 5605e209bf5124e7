//! Batch composer — chains planned operations into a staggered job list.
//!
//! Every job must finish at least one settle gap after the job before it.
//! A job whose natural duration already lands past that floor starts
//! immediately; otherwise it is delayed so it ends exactly on the floor.

use hackbatch_core::units::approx_eq;
use hackbatch_core::{OperationKind, TargetState};

use crate::batch::{schedule, BatchInfo, PlannedJob};
use crate::planner::Planner;

/// Hack, then weaken off its security, grow back, weaken off grow's security.
pub const HWGW: [OperationKind; 4] = [
    OperationKind::Hack,
    OperationKind::Weaken,
    OperationKind::Grow,
    OperationKind::Weaken,
];

pub struct Composer<'a> {
    planner: Planner<'a>,
}

impl<'a> Composer<'a> {
    pub fn new(planner: Planner<'a>) -> Self {
        Self { planner }
    }

    pub fn planner(&self) -> &Planner<'a> {
        &self.planner
    }

    /// One HWGW cycle finishing after `prior_end_ms`. Returns the jobs and
    /// the predicted target state once all four have landed.
    pub fn compose_cycle(&self, state: TargetState, prior_end_ms: f64) -> (BatchInfo, TargetState) {
        self.chain(state, &HWGW, prior_end_ms)
    }

    /// Weaken, grow, weaken, each only if the target is not already within
    /// tolerance of its goal. Empty when the target is prepared.
    pub fn prepare(&self, state: TargetState) -> (BatchInfo, TargetState) {
        let tolerance = self.planner.policy.prepare_tolerance;
        let mut kinds = Vec::with_capacity(3);
        if !approx_eq(state.security, state.min_security, tolerance) {
            kinds.push(OperationKind::Weaken);
        }
        if !approx_eq(state.resource, state.max_resource, tolerance) {
            kinds.push(OperationKind::Grow);
            kinds.push(OperationKind::Weaken);
        }
        self.chain(state, &kinds, 0.0)
    }

    fn chain(
        &self,
        mut state: TargetState,
        kinds: &[OperationKind],
        prior_end_ms: f64,
    ) -> (BatchInfo, TargetState) {
        let gap = self.planner.policy.settle_gap_ms;
        let mut previous_end = (prior_end_ms > 0.0).then_some(prior_end_ms);
        let mut batch = BatchInfo::new();

        for (step, &kind) in kinds.iter().enumerate() {
            let plan = self.planner.plan(kind, &state);
            let floor = previous_end.map_or(0.0, |end| end + gap);
            let (delay_ms, end_ms) = schedule(floor, plan.duration_ms);

            tracing::debug!(
                target_node = %state.name,
                %kind,
                threads = plan.threads,
                delay_ms,
                end_ms,
                security_delta = plan.security_delta,
                "job planned"
            );

            let next = self.planner.apply(&state, &plan);
            batch.push(PlannedJob {
                cycle: 0,
                step,
                kind,
                target: state.name.clone(),
                threads: plan.threads,
                planned_threads: plan.threads,
                duration_ms: plan.duration_ms,
                delay_ms,
                end_ms,
                planned_against: state,
            });
            state = next;
            previous_end = Some(end_ms);
        }

        (batch, state)
    }
}
