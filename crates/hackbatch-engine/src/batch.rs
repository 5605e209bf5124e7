//! Planned jobs and the ordered job list the dispatcher consumes.
//!
//! All times are ms relative to "now" for the owning run loop. Pausing
//! shifts every job toward zero and evicts those whose completion time has
//! already passed.

use std::collections::VecDeque;

use hackbatch_core::{OperationKind, TargetState};
use serde::Serialize;

/// One scheduled unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedJob {
    /// Cycle this job belongs to. Prepare jobs use cycle 0.
    pub cycle: u64,
    /// Position inside its cycle.
    pub step: usize,
    pub kind: OperationKind,
    pub target: String,
    /// Threads still waiting for capacity. Decremented as workers take them.
    pub threads: u32,
    /// Threads originally planned.
    pub planned_threads: u32,
    pub duration_ms: f64,
    pub delay_ms: f64,
    /// `delay_ms + duration_ms` when planned.
    pub end_ms: f64,
    /// Snapshot the job was planned against.
    #[serde(skip)]
    pub planned_against: TargetState,
}

impl PlannedJob {
    pub fn is_partially_launched(&self) -> bool {
        self.threads < self.planned_threads
    }
}

/// Start delay and end time for a job of `duration_ms` that must finish
/// no earlier than `floor_ms`.
pub fn schedule(floor_ms: f64, duration_ms: f64) -> (f64, f64) {
    let delay = if duration_ms >= floor_ms {
        0.0
    } else {
        floor_ms - duration_ms
    };
    (delay, delay + duration_ms)
}

/// Ordered job list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchInfo {
    jobs: VecDeque<PlannedJob>,
}

impl BatchInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: PlannedJob) {
        self.jobs.push_back(job);
    }

    /// Append `other` after the jobs already queued.
    pub fn append(&mut self, other: BatchInfo) {
        self.jobs.extend(other.jobs);
    }

    /// Tag every job with `cycle`.
    pub fn with_cycle(mut self, cycle: u64) -> Self {
        for job in &mut self.jobs {
            job.cycle = cycle;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &PlannedJob> {
        self.jobs.iter()
    }

    pub fn kinds(&self) -> Vec<OperationKind> {
        self.jobs.iter().map(|j| j.kind).collect()
    }

    pub fn front(&self) -> Option<&PlannedJob> {
        self.jobs.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut PlannedJob> {
        self.jobs.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<PlannedJob> {
        self.jobs.pop_front()
    }

    /// Latest end time in the list, 0 when empty.
    pub fn last_end_ms(&self) -> f64 {
        self.jobs.iter().map(|j| j.end_ms).fold(0.0, f64::max)
    }

    /// Capacity still required by the list, given a per-thread cost per kind.
    pub fn capacity_needed<F: Fn(OperationKind) -> f64>(&self, unit_cost: F) -> f64 {
        self.jobs
            .iter()
            .map(|j| unit_cost(j.kind) * j.threads as f64)
            .sum()
    }

    /// Advance time by `elapsed_ms` and evict jobs that have finished.
    pub fn pause(mut self, elapsed_ms: f64) -> BatchInfo {
        self.advance(elapsed_ms);
        self
    }

    /// In-place form of [`BatchInfo::pause`]. Returns the evicted jobs.
    pub fn advance(&mut self, elapsed_ms: f64) -> Vec<PlannedJob> {
        let elapsed = elapsed_ms.max(0.0);
        for job in &mut self.jobs {
            job.delay_ms = (job.delay_ms - elapsed).max(0.0);
            job.end_ms = (job.end_ms - elapsed).max(0.0);
        }
        if elapsed == 0.0 {
            return Vec::new();
        }
        let (done, pending): (Vec<_>, Vec<_>) =
            self.jobs.drain(..).partition(|job| job.end_ms <= 0.0);
        self.jobs = pending.into();
        done
    }
}

impl FromIterator<PlannedJob> for BatchInfo {
    fn from_iter<I: IntoIterator<Item = PlannedJob>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().collect(),
        }
    }
}
