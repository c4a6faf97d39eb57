//! Repair strategies and how one is chosen

use bulwark_types::PriorityClass;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repair actions, ordered from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    Restart,
    Reset,
    Rollback,
    Isolate,
    Replace,
}

impl RepairStrategy {
    /// Next rung up the ladder; `Replace` is the top.
    pub fn escalate(&self) -> RepairStrategy {
        match self {
            RepairStrategy::Restart => RepairStrategy::Reset,
            RepairStrategy::Reset => RepairStrategy::Rollback,
            RepairStrategy::Rollback => RepairStrategy::Isolate,
            RepairStrategy::Isolate | RepairStrategy::Replace => RepairStrategy::Replace,
        }
    }

    /// First-attempt strategy for a component.
    ///
    /// Class decides first: critical components restart, optional ones reset
    /// on timeouts and are isolated otherwise. Components that hold state or
    /// config roll back. Everything else restarts.
    pub fn select(priority: PriorityClass, component: &str, error: &str) -> RepairStrategy {
        let error = error.to_lowercase();
        let name = component.to_lowercase();
        match priority {
            PriorityClass::Critical => RepairStrategy::Restart,
            PriorityClass::Optional if error.contains("timeout") || error.contains("timed out") => {
                RepairStrategy::Reset
            }
            PriorityClass::Optional => RepairStrategy::Isolate,
            PriorityClass::Essential if name.contains("state") || name.contains("config") => {
                RepairStrategy::Rollback
            }
            PriorityClass::Essential => RepairStrategy::Restart,
        }
    }
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairStrategy::Restart => "restart",
            RepairStrategy::Reset => "reset",
            RepairStrategy::Rollback => "rollback",
            RepairStrategy::Isolate => "isolate",
            RepairStrategy::Replace => "replace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_follows_class_then_name() {
        use RepairStrategy::*;
        let cases = [
            (PriorityClass::Critical, "config-store", "boom", Restart),
            (PriorityClass::Optional, "reporter", "request timeout", Reset),
            (PriorityClass::Optional, "reporter", "Timed out waiting", Reset),
            (PriorityClass::Optional, "reporter", "crashed", Isolate),
            (PriorityClass::Essential, "state-sync", "crashed", Rollback),
            (PriorityClass::Essential, "Config-Loader", "crashed", Rollback),
            (PriorityClass::Essential, "planner", "crashed", Restart),
        ];
        for (priority, name, error, expected) in cases {
            assert_eq!(RepairStrategy::select(priority, name, error), expected, "{name}/{error}");
        }
    }

    #[test]
    fn ladder_tops_out_at_replace() {
        let mut s = RepairStrategy::Restart;
        let mut seen = vec![s];
        for _ in 0..5 {
            s = s.escalate();
            seen.push(s);
        }
        assert_eq!(
            seen,
            vec![
                RepairStrategy::Restart,
                RepairStrategy::Reset,
                RepairStrategy::Rollback,
                RepairStrategy::Isolate,
                RepairStrategy::Replace,
                RepairStrategy::Replace,
            ]
        );
    }
}
