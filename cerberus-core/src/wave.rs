//! Wave gating: should the next review wave run?
//!
//! A pure predicate over the current wave's verdicts. Escalation is blocked
//! by any finding at or above the configured gate severity, by malformed
//! artifacts, and optionally by SKIP verdicts; tier depth caps how deep a
//! cheap-tier run may escalate. Advancing is the workflow's responsibility;
//! this module only decides.

use serde::{Deserialize, Serialize};

use crate::config::{Config, GateSeverity, ModelTier};
use crate::verdict::{ReviewerVerdict, Severity, VerdictKind};
use crate::{Error, Result};

/// Counts feeding the gate decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub review_count: usize,
    pub major_count: u64,
    pub critical_count: u64,
    pub skip_count: usize,
    pub malformed_count: usize,
}

/// The gate's structured decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub wave: String,
    pub tier: String,
    pub escalate: bool,
    pub blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wave: Option<String>,
    pub reason: String,
    pub stats: GateStats,
}

/// Whether tier depth allows escalating past `wave`, and to which wave
fn resolve_wave_depth(config: &Config, wave: &str, tier: ModelTier) -> Result<Option<String>> {
    let order = &config.waves.order;
    let current_index = order
        .iter()
        .position(|w| w == wave)
        .ok_or_else(|| Error::Config(format!("unknown wave '{}'", wave)))?;

    let max_wave = config
        .waves
        .max_for_tier
        .get(tier.as_str())
        .or_else(|| config.waves.max_for_tier.get("standard"));
    let allowed_last_index = match max_wave {
        Some(name) => order.iter().position(|w| w == name).unwrap_or(order.len() - 1),
        None => order.len() - 1,
    };

    if current_index >= allowed_last_index {
        return Ok(None);
    }
    Ok(Some(order[current_index + 1].clone()))
}

fn severity_counts(verdict: &ReviewerVerdict) -> (u64, u64) {
    let major_from_findings = verdict
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Major)
        .count() as u64;
    let critical_from_findings = verdict
        .findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count() as u64;
    (
        verdict.stats.major.max(major_from_findings),
        verdict.stats.critical.max(critical_from_findings),
    )
}

/// Evaluate the gate for the wave that just finished
pub fn evaluate_gate(
    config: &Config,
    verdicts: &[ReviewerVerdict],
    malformed_count: usize,
    wave: &str,
    tier: ModelTier,
) -> Result<GateDecision> {
    if !config.waves.enabled() {
        return Ok(GateDecision {
            wave: wave.to_string(),
            tier: tier.as_str().to_string(),
            escalate: false,
            blocking: false,
            next_wave: None,
            reason: "waves_disabled".to_string(),
            stats: GateStats::default(),
        });
    }

    let next_wave_by_depth = resolve_wave_depth(config, wave, tier)?;

    let mut stats = GateStats {
        review_count: verdicts.len(),
        malformed_count,
        ..Default::default()
    };
    for verdict in verdicts {
        let (major, critical) = severity_counts(verdict);
        stats.major_count += major;
        stats.critical_count += critical;
        if verdict.verdict == VerdictKind::Skip {
            stats.skip_count += 1;
        }
    }

    let gate = &config.waves.gate;
    let mut blocking_reasons = Vec::new();
    if malformed_count > 0 {
        blocking_reasons.push("malformed_artifacts");
    }
    if verdicts.is_empty() && malformed_count > 0 {
        blocking_reasons.push("no_valid_verdicts");
    }
    if stats.critical_count > 0 && gate.severity.blocks(Severity::Critical) {
        blocking_reasons.push("critical_findings");
    }
    if stats.major_count > 0 && gate.severity == GateSeverity::Major {
        blocking_reasons.push("major_findings");
    }
    if gate.block_on_skip && stats.skip_count > 0 {
        blocking_reasons.push("skip_verdicts");
    }

    let blocking = !blocking_reasons.is_empty();
    let (escalate, next_wave, reason) = if blocking {
        (false, None, blocking_reasons.join(","))
    } else {
        match next_wave_by_depth {
            Some(next) => (true, Some(next), "passed_gate".to_string()),
            None => (false, None, "max_wave_reached".to_string()),
        }
    };

    Ok(GateDecision {
        wave: wave.to_string(),
        tier: tier.as_str().to_string(),
        escalate,
        blocking,
        next_wave,
        reason,
        stats,
    })
}
