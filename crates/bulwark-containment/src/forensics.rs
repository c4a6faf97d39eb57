//! Forensic analysis of containment evidence.
//!
//! Evidence is a flat map of collected facts (log excerpts, process lists,
//! network summaries). The analyzer matches its text against per-category
//! pattern tables, scores the indicators it finds and decides whether the
//! component is safe to release.

use std::collections::BTreeMap;
use std::fmt;

use bulwark_types::ComponentId;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ForensicConfig;
use crate::error::ContainmentResult;

/// Collected evidence, keyed by what was collected.
pub type Evidence = BTreeMap<String, serde_json::Value>;

/// Kind of compromise the evidence points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Intrusion,
    Malware,
    DataExfiltration,
    PrivilegeEscalation,
    Rootkit,
    /// No pattern matched
    Unknown,
}

impl ThreatCategory {
    /// Categories with pattern tables, in tie-break order.
    pub const SCANNED: [ThreatCategory; 5] = [
        ThreatCategory::Intrusion,
        ThreatCategory::Malware,
        ThreatCategory::DataExfiltration,
        ThreatCategory::PrivilegeEscalation,
        ThreatCategory::Rootkit,
    ];

    fn builtin_patterns(&self) -> &'static [&'static str] {
        match self {
            ThreatCategory::Intrusion => &[
                r"unauthori[sz]ed access",
                r"brute[- ]?force",
                r"failed (login|password)",
                r"port scan",
                r"backdoor",
                r"reverse shell",
            ],
            ThreatCategory::Malware => &[
                r"trojan",
                r"ransomware",
                r"malicious (payload|binary|script)",
                r"\bvirus\b",
                r"\bworm\b",
                r"crypto ?miner",
            ],
            ThreatCategory::DataExfiltration => &[
                r"exfiltrat",
                r"data (dump|leak)",
                r"large (outbound|upload)",
                r"unusual egress",
                r"dns tunnel",
            ],
            ThreatCategory::PrivilegeEscalation => &[
                r"privilege escalation",
                r"\bsudo\b",
                r"setuid",
                r"root access",
                r"admin(istrator)? rights",
                r"token (theft|impersonation)",
            ],
            ThreatCategory::Rootkit => &[
                r"rootkit",
                r"kernel module",
                r"hidden process",
                r"syscall hook",
                r"ld_preload",
            ],
            ThreatCategory::Unknown => &[],
        }
    }

    fn recommendations(&self) -> &'static [&'static str] {
        match self {
            ThreatCategory::Intrusion => &[
                "Rotate credentials used by the component",
                "Review access logs for the intrusion window",
                "Tighten network ingress rules",
            ],
            ThreatCategory::Malware => &[
                "Rebuild the component from a known-good image",
                "Scan shared volumes for the same payload",
            ],
            ThreatCategory::DataExfiltration => &[
                "Block outbound traffic from the component",
                "Identify and notify owners of exposed data",
                "Audit egress destinations",
            ],
            ThreatCategory::PrivilegeEscalation => &[
                "Revoke elevated grants held by the component",
                "Audit sudo and setuid usage on the host",
            ],
            ThreatCategory::Rootkit => &[
                "Reimage the host; in-place cleanup is not trustworthy",
                "Verify kernel module signatures fleet-wide",
            ],
            ThreatCategory::Unknown => &["Continue monitoring the component"],
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreatCategory::Intrusion => "intrusion",
            ThreatCategory::Malware => "malware",
            ThreatCategory::DataExfiltration => "data_exfiltration",
            ThreatCategory::PrivilegeEscalation => "privilege_escalation",
            ThreatCategory::Rootkit => "rootkit",
            ThreatCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Threat severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Result of one analysis. Never mutated; re-analysis produces a new report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub component: ComponentId,
    pub category: ThreatCategory,
    pub severity: Severity,

    /// Patterns that matched, across all categories
    pub matched_patterns: Vec<String>,

    /// Weighted indicator count severity was derived from
    pub indicator_score: u32,

    /// Whether any critical-indicator keyword was present
    pub critical_indicators: bool,

    /// In `[0, 1]`
    pub confidence: f64,

    pub safe_to_release: bool,
    pub recommendations: Vec<String>,

    /// SHA-256 of the evidence as submitted
    pub evidence_digest: String,

    /// Evidence plus collection metadata
    pub evidence: Evidence,

    pub analyzed_at: DateTime<Utc>,
}

struct CriticalMarkers {
    critical: Regex,
    root: Regex,
    encrypted: Regex,
}

/// Matches evidence against threat pattern tables.
pub struct ForensicAnalyzer {
    config: ForensicConfig,
    tables: Vec<(ThreatCategory, Vec<Regex>)>,
    markers: CriticalMarkers,
}

impl ForensicAnalyzer {
    pub fn new(config: ForensicConfig) -> ContainmentResult<Self> {
        let mut tables = Vec::with_capacity(ThreatCategory::SCANNED.len());
        for category in ThreatCategory::SCANNED {
            let mut patterns = category
                .builtin_patterns()
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>, _>>()?;
            for extra in config.extra_patterns.iter().filter(|e| e.category == category) {
                patterns.push(compile(&extra.pattern)?);
            }
            tables.push((category, patterns));
        }

        let markers = CriticalMarkers {
            critical: compile(r"\bcritical\b")?,
            root: compile(r"\broot\b")?,
            encrypted: compile(r"\bencrypt(ed|ion|s)?\b")?,
        };

        Ok(Self {
            config,
            tables,
            markers,
        })
    }

    pub fn with_defaults() -> ContainmentResult<Self> {
        Self::new(ForensicConfig::default())
    }

    /// Analyze `evidence` collected from `component`.
    pub fn analyze(&self, component: &ComponentId, evidence: &Evidence) -> ForensicReport {
        let analyzed_at = Utc::now();
        let digest = evidence_digest(evidence);
        let text = evidence_text(evidence);

        let mut matched_patterns = Vec::new();
        let mut best = (ThreatCategory::Unknown, 0usize);
        for (category, patterns) in &self.tables {
            let hits: Vec<&Regex> = patterns.iter().filter(|re| re.is_match(&text)).collect();
            if hits.len() > best.1 {
                best = (*category, hits.len());
            }
            matched_patterns.extend(hits.iter().map(|re| format!("{category}:{}", re.as_str())));
        }
        let category = best.0;

        let critical_hits = self.markers.critical.find_iter(&text).count() as u32;
        let root_hits = self.markers.root.find_iter(&text).count() as u32;
        let encrypted_hits = self.markers.encrypted.find_iter(&text).count() as u32;
        let critical_indicators = critical_hits + root_hits + encrypted_hits > 0;

        let indicator_score =
            critical_hits * 3 + root_hits * 2 + encrypted_hits * 2 + matched_patterns.len() as u32;
        let severity = self.severity_for(indicator_score);

        let confidence = (0.2
            + 0.05 * evidence.len().min(6) as f64
            + 0.1 * matched_patterns.len().min(5) as f64)
            .clamp(0.0, 1.0);

        let safe_to_release = severity == Severity::Low && !critical_indicators;

        let mut recommendations: Vec<String> =
            category.recommendations().iter().map(|r| r.to_string()).collect();
        if severity >= Severity::High {
            recommendations.push("Keep the component quarantined pending manual review".into());
        }
        if !safe_to_release && severity < Severity::High {
            recommendations.push("Collect further evidence and re-run analysis".into());
        }

        let mut enriched = evidence.clone();
        enriched.insert("collected_at".into(), serde_json::json!(analyzed_at.to_rfc3339()));
        enriched.insert("collected_from".into(), serde_json::json!(component));
        enriched.insert("evidence_items".into(), serde_json::json!(evidence.len()));
        enriched.insert("evidence_digest".into(), serde_json::json!(digest));

        debug!(
            component = %component,
            category = %category,
            severity = %severity,
            score = indicator_score,
            "Forensic analysis complete"
        );

        ForensicReport {
            component: component.clone(),
            category,
            severity,
            matched_patterns,
            indicator_score,
            critical_indicators,
            confidence,
            safe_to_release,
            recommendations,
            evidence_digest: digest,
            evidence: enriched,
            analyzed_at,
        }
    }

    fn severity_for(&self, score: u32) -> Severity {
        if score >= self.config.critical_score {
            Severity::Critical
        } else if score >= self.config.high_score {
            Severity::High
        } else if score >= self.config.medium_score {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Lowercased text of every evidence key and value.
fn evidence_text(evidence: &Evidence) -> String {
    let mut text = String::new();
    for (key, value) in evidence {
        text.push_str(key);
        text.push(' ');
        match value {
            serde_json::Value::String(s) => text.push_str(s),
            other => text.push_str(&other.to_string()),
        }
        text.push('\n');
    }
    text.to_lowercase()
}

fn evidence_digest(evidence: &Evidence) -> String {
    let canonical = serde_json::to_vec(evidence).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evidence(entries: &[(&str, &str)]) -> Evidence {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn benign_evidence_is_safe_to_release() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("planner"),
            &evidence(&[("logs", "request latency spiked after deploy")]),
        );
        assert_eq!(report.category, ThreatCategory::Unknown);
        assert_eq!(report.severity, Severity::Low);
        assert!(report.safe_to_release);
        assert!(report.evidence.contains_key("collected_at"));
    }

    #[test]
    fn rootkit_with_root_markers_is_critical() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("worker-3"),
            &evidence(&[
                ("processes", "hidden process found; kernel module loaded as root"),
                ("alerts", "CRITICAL: syscall hook detected, root shell"),
            ]),
        );
        assert_eq!(report.category, ThreatCategory::Rootkit);
        assert_eq!(report.severity, Severity::Critical);
        assert!(!report.safe_to_release);
        assert!(report.critical_indicators);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("manual review")));
    }

    #[test]
    fn best_represented_category_wins() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("exporter"),
            &evidence(&[(
                "network",
                "large outbound transfer, dns tunnel suspected, data dump to unknown host; one failed login",
            )]),
        );
        assert_eq!(report.category, ThreatCategory::DataExfiltration);
        assert!(!report.safe_to_release);
    }

    #[test]
    fn single_pattern_without_markers_is_low() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("gateway"),
            &evidence(&[("auth", "one failed password for user svc")]),
        );
        assert_eq!(report.category, ThreatCategory::Intrusion);
        assert_eq!(report.indicator_score, 1);
        assert_eq!(report.severity, Severity::Low);
        assert!(report.safe_to_release);
    }

    #[test]
    fn encrypted_marker_blocks_release() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("store"),
            &evidence(&[("files", "several files encrypted overnight")]),
        );
        assert_eq!(report.severity, Severity::Medium);
        assert!(!report.safe_to_release);
    }

    #[test]
    fn confidence_grows_with_evidence_and_stays_bounded() {
        let analyzer = ForensicAnalyzer::with_defaults().unwrap();
        let sparse = analyzer.analyze(&ComponentId::new("a"), &Evidence::new());
        let rich = analyzer.analyze(
            &ComponentId::new("a"),
            &evidence(&[
                ("a", "trojan"),
                ("b", "ransomware"),
                ("c", "backdoor"),
                ("d", "rootkit"),
                ("e", "setuid"),
                ("f", "exfiltration"),
                ("g", "sudo"),
            ]),
        );
        assert!(sparse.confidence < rich.confidence);
        assert!((0.0..=1.0).contains(&rich.confidence));
    }

    #[test]
    fn digest_is_stable_for_same_evidence() {
        let e = evidence(&[("x", "y")]);
        assert_eq!(evidence_digest(&e), evidence_digest(&e.clone()));
        assert_eq!(evidence_digest(&e).len(), 64);
    }

    #[test]
    fn extra_patterns_extend_tables() {
        let analyzer = ForensicAnalyzer::new(ForensicConfig {
            extra_patterns: vec![crate::config::PatternSpec {
                category: ThreatCategory::Malware,
                pattern: "evil\\.so".into(),
            }],
            ..Default::default()
        })
        .unwrap();
        let report = analyzer.analyze(
            &ComponentId::new("x"),
            &evidence(&[("libs", "loaded evil.so")]),
        );
        assert_eq!(report.category, ThreatCategory::Malware);

        let bad = ForensicAnalyzer::new(ForensicConfig {
            extra_patterns: vec![crate::config::PatternSpec {
                category: ThreatCategory::Malware,
                pattern: "(".into(),
            }],
            ..Default::default()
        });
        assert!(bad.is_err());
    }
}
