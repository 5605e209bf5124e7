//! The closed set of operations a batch is built from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ScriptConfig;

/// Hack removes resource, grow restores it, weaken lowers security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Hack,
    Grow,
    Weaken,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [Self::Hack, Self::Grow, Self::Weaken];

    /// Workload script that performs this operation on a worker.
    pub fn script<'a>(&self, scripts: &'a ScriptConfig) -> &'a str {
        match self {
            Self::Hack => &scripts.hack,
            Self::Grow => &scripts.grow,
            Self::Weaken => &scripts.weaken,
        }
    }

    /// Reverse of [`OperationKind::script`].
    pub fn from_script(scripts: &ScriptConfig, script: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.script(scripts) == script)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hack => "hack",
            Self::Grow => "grow",
            Self::Weaken => "weaken",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
