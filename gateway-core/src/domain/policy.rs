// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Shared value types for policy evaluation (§4.3). Evaluation logic itself
//! lives in `application::policy_engine`; this module holds the
//! configuration-shaped data it consumes.

use serde::{Deserialize, Serialize};

use crate::domain::decision::Verdict;

/// One configured prefix rule: tool names starting with `prefix` resolve to
/// `verdict` with `reason`/`risk` unless a built-in rule fires first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRule {
    pub verdict: String,
    pub reason: String,
    #[serde(default)]
    pub risk: Option<f64>,
}

/// The outcome of evaluating one rule, with risk already clamped to `[0,1]`.
#[derive(Debug, Clone)]
pub struct PolicyOutcome {
    pub verdict: Verdict,
    pub reason: String,
    pub risk_score: Option<f64>,
}

/// Clamps a risk score into `[0, 1]`, per §4.3.
pub fn clamp_risk(risk: f64) -> f64 {
    risk.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_risk() {
        assert_eq!(clamp_risk(-0.5), 0.0);
        assert_eq!(clamp_risk(1.5), 1.0);
        assert_eq!(clamp_risk(0.7), 0.7);
    }
}
