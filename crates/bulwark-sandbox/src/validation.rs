//! Static and runtime checks run against a staged change

use bulwark_types::{ComponentId, FleetMetrics};
use serde_json::Value;

use crate::change::{CheckResult, SandboxChange};
use crate::config::SandboxConfig;
use crate::metrics::MetricsProvider;

/// Stage `change` on top of `current`.
///
/// Config objects are merged key by key; anything else replaces the state.
pub(crate) fn stage(current: Option<&Value>, change: &SandboxChange) -> Value {
    match (&change.kind, current, &change.payload) {
        (crate::ChangeKind::Config, Some(Value::Object(base)), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (k, v) in patch {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => change.payload.clone(),
    }
}

pub(crate) fn config_checks(config: &SandboxConfig, payload: &Value) -> Vec<CheckResult> {
    let structure = match payload {
        Value::Object(map) if map.is_empty() => CheckResult::fail("structure", "empty config"),
        Value::Object(map) if map.keys().any(|k| k.trim().is_empty()) => {
            CheckResult::fail("structure", "blank config key")
        }
        Value::Object(_) => CheckResult::pass("structure"),
        _ => CheckResult::fail("structure", "config change must be a JSON object"),
    };

    let text = payload.to_string().to_lowercase();
    let hits = markers_in(&text, &config.forbidden_config_markers);
    let forbidden = if hits.is_empty() {
        CheckResult::pass("forbidden_values")
    } else {
        CheckResult::fail("forbidden_values", format!("contains {}", hits.join(", ")))
    };

    vec![structure, forbidden]
}

pub(crate) fn code_checks(config: &SandboxConfig, payload: &Value) -> Vec<CheckResult> {
    let Some(source) = payload.as_str() else {
        return vec![CheckResult::fail("syntax", "code change must be a string")];
    };

    let syntax = if source.trim().is_empty() {
        CheckResult::fail("syntax", "empty source")
    } else {
        match unbalanced_delimiter(source) {
            Some(detail) => CheckResult::fail("syntax", detail),
            None => CheckResult::pass("syntax"),
        }
    };

    let hits = markers_in(&source.to_lowercase(), &config.interface_break_markers);
    let interface = if hits.is_empty() {
        CheckResult::pass("interface")
    } else {
        CheckResult::fail("interface", format!("contains {}", hits.join(", ")))
    };

    vec![syntax, interface]
}

pub(crate) async fn system_checks(
    config: &SandboxConfig,
    metrics: &dyn MetricsProvider,
    target: &ComponentId,
) -> Vec<CheckResult> {
    let health = match metrics.component_healthy(target).await {
        Some(true) => CheckResult::pass("target_health"),
        Some(false) => CheckResult::fail("target_health", format!("{target} is unhealthy")),
        None => CheckResult::fail("target_health", format!("{target} is not registered")),
    };

    let fleet = metrics.fleet_metrics().await;
    let error_rate = if fleet.error_rate <= config.error_rate_ceiling {
        CheckResult::pass("error_rate")
    } else {
        CheckResult::fail(
            "error_rate",
            format!(
                "{:.3} exceeds ceiling {:.3}",
                fleet.error_rate, config.error_rate_ceiling
            ),
        )
    };

    vec![health, error_rate]
}

/// Error rate grew by more than `ratio`, or healthy components were lost.
pub(crate) fn degraded(before: &FleetMetrics, after: &FleetMetrics, ratio: f64) -> bool {
    if after.healthy_components < before.healthy_components {
        return true;
    }
    if before.error_rate <= f64::EPSILON {
        return after.error_rate > f64::EPSILON;
    }
    after.error_rate > before.error_rate * ratio
}

fn markers_in<'a>(text: &str, markers: &'a [String]) -> Vec<&'a str> {
    markers
        .iter()
        .filter(|m| !m.is_empty() && text.contains(&m.to_lowercase()))
        .map(String::as_str)
        .collect()
}

/// Bracket balance check that ignores string literal contents.
fn unbalanced_delimiter(source: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (line_no, line) in source.lines().enumerate() {
        for c in line.chars() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return Some(format!("unexpected '{c}' on line {}", line_no + 1));
                    }
                }
                _ => {}
            }
        }
    }

    if in_string {
        return Some("unterminated string literal".to_string());
    }
    stack.last().map(|open| format!("unclosed '{open}'"))
}
