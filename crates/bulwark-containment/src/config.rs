//! Containment and forensic configuration

use serde::{Deserialize, Serialize};

use crate::forensics::ThreatCategory;
use crate::level::ContainmentLevel;

/// Containment configuration: capacity left to a component per level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    pub partial_capacity: f64,
    pub full_capacity: f64,
    pub emergency_capacity: f64,
    pub quarantine_capacity: f64,
}

impl ContainmentConfig {
    /// Fraction of normal capacity a component keeps at `level`.
    pub fn capacity_for(&self, level: ContainmentLevel) -> f64 {
        let fraction = match level {
            ContainmentLevel::Partial => self.partial_capacity,
            ContainmentLevel::Full => self.full_capacity,
            ContainmentLevel::Emergency => self.emergency_capacity,
            ContainmentLevel::Quarantine => self.quarantine_capacity,
        };
        fraction.clamp(0.0, 1.0)
    }
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            partial_capacity: 0.5,
            full_capacity: 0.25,
            emergency_capacity: 0.1,
            quarantine_capacity: 0.1,
        }
    }
}

/// Extra pattern for a threat category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub category: ThreatCategory,
    /// Case-insensitive regular expression
    pub pattern: String,
}

/// Forensic analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicConfig {
    /// Indicator score at or above which severity is CRITICAL
    pub critical_score: u32,
    /// Indicator score at or above which severity is HIGH
    pub high_score: u32,
    /// Indicator score at or above which severity is MEDIUM
    pub medium_score: u32,
    /// Patterns added to the built-in tables
    pub extra_patterns: Vec<PatternSpec>,
}

impl Default for ForensicConfig {
    fn default() -> Self {
        Self {
            critical_score: 8,
            high_score: 5,
            medium_score: 2,
            extra_patterns: Vec::new(),
        }
    }
}
