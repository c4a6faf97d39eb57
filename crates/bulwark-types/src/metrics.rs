//! Fleet-level health figures

use serde::{Deserialize, Serialize};

/// Point-in-time health of the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FleetMetrics {
    /// Registered components
    pub total_components: usize,

    /// Components currently reporting healthy
    pub healthy_components: usize,

    /// Fraction of failing components (0.0-1.0)
    pub error_rate: f64,
}

impl FleetMetrics {
    /// Derive metrics from a healthy/total count.
    pub fn from_counts(total_components: usize, healthy_components: usize) -> Self {
        let error_rate = if total_components == 0 {
            0.0
        } else {
            (total_components - healthy_components.min(total_components)) as f64
                / total_components as f64
        };
        Self {
            total_components,
            healthy_components,
            error_rate,
        }
    }
}
