//! Operation planner. Thread count, duration and security delta per kind.
//!
//! Each kind is a unit struct implementing [`Operation`]; [`Planner::plan`]
//! picks one with a single match. Planning is pure: folding the result into
//! the target snapshot is the caller's job (see `TargetState::applied`).

use hackbatch_core::config::PolicyConfig;
use hackbatch_core::{Actor, Formulas, OperationKind, TargetState};

/// Result of planning one operation against one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    pub kind: OperationKind,
    /// Threads required. Zero means there is nothing to do.
    pub threads: u32,
    pub duration_ms: f64,
    pub security_delta: f64,
}

/// Uniform interface over the three operation kinds.
pub trait Operation {
    const KIND: OperationKind;

    fn thread_count(&self, planner: &Planner<'_>, target: &TargetState) -> u32;

    fn duration(&self, planner: &Planner<'_>, target: &TargetState) -> f64 {
        planner.formulas.duration(Self::KIND, target, planner.actor)
    }

    fn security_delta(&self, planner: &Planner<'_>, threads: u32) -> f64 {
        planner
            .formulas
            .security_delta(Self::KIND, threads, planner.actor.cores)
    }
}

pub struct Hack;
pub struct Grow;
pub struct Weaken;

impl Operation for Hack {
    const KIND: OperationKind = OperationKind::Hack;

    /// Enough threads to take `hack_fraction` of the current resource, rounded.
    fn thread_count(&self, planner: &Planner<'_>, target: &TargetState) -> u32 {
        let per_thread = planner.formulas.hack_fraction(target, planner.actor);
        if per_thread <= 0.0 || target.resource <= 0.0 {
            return 0;
        }
        to_threads((planner.policy.hack_fraction / per_thread).round())
    }
}

impl Operation for Grow {
    const KIND: OperationKind = OperationKind::Grow;

    /// Enough threads to refill to max; never less than one.
    fn thread_count(&self, planner: &Planner<'_>, target: &TargetState) -> u32 {
        let floor = planner.policy.resource_floor.max(MIN_RESOURCE_FLOOR);
        let current = target.resource.max(floor);
        let multiplier = target.max_resource / current;
        let threads = planner
            .formulas
            .grow_threads(target, multiplier, planner.actor.cores);
        to_threads(threads.max(1.0).ceil())
    }
}

impl Operation for Weaken {
    const KIND: OperationKind = OperationKind::Weaken;

    /// Enough threads to bring security down to its minimum.
    fn thread_count(&self, planner: &Planner<'_>, target: &TargetState) -> u32 {
        let per_thread = -planner
            .formulas
            .security_delta(Self::KIND, 1, planner.actor.cores);
        if per_thread <= 0.0 {
            return 0;
        }
        let excess = (target.security - target.min_security).max(0.0);
        to_threads((excess / per_thread).ceil())
    }
}

/// Lowest resource level grow sizing will ever divide by.
const MIN_RESOURCE_FLOOR: f64 = 1.0;

fn to_threads(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.min(u32::MAX as f64) as u32
    }
}

/// Planning context: formulas, the acting node, and policy constants.
pub struct Planner<'a> {
    pub formulas: &'a dyn Formulas,
    pub actor: &'a Actor,
    pub policy: &'a PolicyConfig,
}

impl<'a> Planner<'a> {
    pub fn new(formulas: &'a dyn Formulas, actor: &'a Actor, policy: &'a PolicyConfig) -> Self {
        Self {
            formulas,
            actor,
            policy,
        }
    }

    pub fn plan(&self, kind: OperationKind, target: &TargetState) -> Plan {
        match kind {
            OperationKind::Hack => self.plan_with(&Hack, target),
            OperationKind::Grow => self.plan_with(&Grow, target),
            OperationKind::Weaken => self.plan_with(&Weaken, target),
        }
    }

    fn plan_with<O: Operation>(&self, op: &O, target: &TargetState) -> Plan {
        let threads = op.thread_count(self, target);
        Plan {
            kind: O::KIND,
            threads,
            duration_ms: op.duration(self, target),
            security_delta: op.security_delta(self, threads),
        }
    }

    /// Snapshot after `plan` lands.
    pub fn apply(&self, target: &TargetState, plan: &Plan) -> TargetState {
        target.applied(
            plan.kind,
            plan.threads,
            self.formulas,
            self.actor,
            self.policy.max_security,
        )
    }
}
