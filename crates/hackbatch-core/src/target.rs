//! Speculative snapshot of one target's security and resource levels.
//!
//! Planning never waits for real completions. Each planned operation is
//! folded into the snapshot with [`TargetState::applied`], which returns the
//! predicted state after that operation lands; the next step plans against it.

use serde::{Deserialize, Serialize};

use crate::formulas::{Actor, Formulas};
use crate::operation::OperationKind;

/// Upper bound for security when the caller has no configured ceiling.
pub const DEFAULT_MAX_SECURITY: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub name: String,
    /// Current security level. Never below `min_security`.
    pub security: f64,
    pub min_security: f64,
    /// Current resource level, within `[0, max_resource]`.
    pub resource: f64,
    pub max_resource: f64,
    /// Growth factor used by the grow formula.
    pub growth: f64,
}

impl TargetState {
    /// True when security is at its floor and resource at its ceiling,
    /// each within `tolerance` (a fraction of the goal value).
    pub fn is_prepared(&self, tolerance: f64) -> bool {
        crate::units::approx_eq(self.security, self.min_security, tolerance)
            && crate::units::approx_eq(self.resource, self.max_resource, tolerance)
    }

    /// Predicted state once `threads` threads of `kind` have completed.
    ///
    /// Hack removes `fraction_per_thread * threads` of the current resource,
    /// grow sets it to `(resource + threads) * (1 + grow_percent)` capped at the
    /// maximum, weaken leaves it alone. Security moves by the kind's delta and
    /// is clamped to `[min_security, max_security]`.
    pub fn applied<F: Formulas + ?Sized>(
        &self,
        kind: OperationKind,
        threads: u32,
        formulas: &F,
        actor: &Actor,
        max_security: f64,
    ) -> TargetState {
        let mut next = self.clone();
        if threads == 0 {
            return next;
        }

        match kind {
            OperationKind::Hack => {
                let fraction =
                    (formulas.hack_fraction(self, actor) * threads as f64).clamp(0.0, 1.0);
                next.resource -= self.resource * fraction;
            }
            OperationKind::Grow => {
                let percent = formulas.grow_percent(self, threads, actor.cores);
                next.resource = ((self.resource + threads as f64) * (1.0 + percent))
                    .min(self.max_resource);
            }
            OperationKind::Weaken => {}
        }

        next.resource = next.resource.clamp(0.0, self.max_resource.max(0.0));
        let delta = formulas.security_delta(kind, threads, actor.cores);
        next.security = (self.security + delta)
            .min(max_security)
            .max(self.min_security);
        next
    }
}
