//! Operation formulas: the externally supplied cost, time and effect model.
//!
//! The engine only ever talks to [`Formulas`]. [`StandardFormulas`] is a
//! simplified reference model used by the simulated host and the daemon.

use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;
use crate::target::TargetState;

/// The node whose skill and cores drive operation timing and strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    /// Skill level. Higher skill shortens every operation.
    pub skill: u32,
    /// CPU cores. More cores strengthen grow and weaken.
    #[serde(default = "default_cores")]
    pub cores: u32,
}

fn default_cores() -> u32 {
    1
}

/// Injected economic model for the three operation kinds.
pub trait Formulas: Send + Sync {
    /// Milliseconds an operation launched against `target` now takes.
    fn duration(&self, kind: OperationKind, target: &TargetState, actor: &Actor) -> f64;

    /// Security change caused by `threads` threads. Negative for weaken.
    fn security_delta(&self, kind: OperationKind, threads: u32, cores: u32) -> f64;

    /// Fraction of the current resource removed by a single hack thread.
    fn hack_fraction(&self, target: &TargetState, actor: &Actor) -> f64;

    /// Fractional resource increase produced by `threads` grow threads.
    fn grow_percent(&self, target: &TargetState, threads: u32, cores: u32) -> f64;

    /// Grow threads (fractional) needed to multiply the resource by `multiplier`.
    fn grow_threads(&self, target: &TargetState, multiplier: f64, cores: u32) -> f64;
}

const HACK_SECURITY_PER_THREAD: f64 = 0.002;
const GROW_SECURITY_PER_THREAD: f64 = 0.004;
const WEAKEN_PER_THREAD: f64 = 0.05;

const GROW_TIME_MULT: f64 = 3.2;
const WEAKEN_TIME_MULT: f64 = 4.0;

const BASE_GROWTH_RATE: f64 = 0.03;
const MAX_GROWTH_RATE: f64 = 1.0035;

/// Reference model. Times rise with security and fall with skill.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFormulas;

impl StandardFormulas {
    fn core_bonus(cores: u32) -> f64 {
        1.0 + (cores.max(1) as f64 - 1.0) / 16.0
    }

    fn hack_seconds(target: &TargetState, actor: &Actor) -> f64 {
        let difficulty = 25.0 * target.security + 500.0;
        5.0 * difficulty / (actor.skill as f64 + 50.0)
    }

    /// Per-thread grow exponent base and exponent for this target.
    fn growth_terms(target: &TargetState, cores: u32) -> (f64, f64) {
        let rate = (1.0 + BASE_GROWTH_RATE / target.security.max(1.0)).min(MAX_GROWTH_RATE);
        let exponent = target.growth.max(0.0) / 100.0 * Self::core_bonus(cores);
        (rate, exponent)
    }
}

impl Formulas for StandardFormulas {
    fn duration(&self, kind: OperationKind, target: &TargetState, actor: &Actor) -> f64 {
        let mult = match kind {
            OperationKind::Hack => 1.0,
            OperationKind::Grow => GROW_TIME_MULT,
            OperationKind::Weaken => WEAKEN_TIME_MULT,
        };
        Self::hack_seconds(target, actor) * mult * 1000.0
    }

    fn security_delta(&self, kind: OperationKind, threads: u32, cores: u32) -> f64 {
        let threads = threads as f64;
        match kind {
            OperationKind::Hack => HACK_SECURITY_PER_THREAD * threads,
            OperationKind::Grow => GROW_SECURITY_PER_THREAD * threads,
            OperationKind::Weaken => -WEAKEN_PER_THREAD * threads * Self::core_bonus(cores),
        }
    }

    fn hack_fraction(&self, target: &TargetState, actor: &Actor) -> f64 {
        let difficulty = ((100.0 - target.security) / 100.0).max(0.0);
        let skill = actor.skill as f64;
        let skill_mult = skill / (skill + 25.0);
        (difficulty * skill_mult / 240.0).clamp(0.0, 1.0)
    }

    fn grow_percent(&self, target: &TargetState, threads: u32, cores: u32) -> f64 {
        let (rate, exponent) = Self::growth_terms(target, cores);
        rate.powf(threads as f64 * exponent) - 1.0
    }

    fn grow_threads(&self, target: &TargetState, multiplier: f64, cores: u32) -> f64 {
        if multiplier <= 1.0 {
            return 0.0;
        }
        let (rate, exponent) = Self::growth_terms(target, cores);
        let per_thread = rate.ln() * exponent;
        if per_thread <= 0.0 {
            return f64::INFINITY;
        }
        multiplier.ln() / per_thread
    }
}
