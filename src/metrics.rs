use std::collections::BTreeMap;

use serde::Serialize;

use crate::result::FixResult;

/// Confidence above which a result counts as a success for its strategy.
const STRATEGY_SUCCESS_CONFIDENCE: f64 = 0.5;

/// Confidence above which a result counts as having removed its defect.
const RESOLVED_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStats {
    pub usage_count: usize,
    pub success_rate: f64,
}

/// Summary over a batch of fix results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixMetrics {
    pub total_results: usize,
    /// Results whose strategy is neither `no_fix_applied` nor `error`.
    pub effective_fixes: usize,
    /// `effective_fixes / total_results`, 0 for an empty batch.
    pub success_rate: f64,
    pub average_confidence: f64,
    pub strategies: BTreeMap<String, StrategyStats>,
}

impl FixMetrics {
    pub fn from_results(results: &[FixResult]) -> Self {
        let total = results.len();
        let effective = results.iter().filter(|r| r.is_effective()).count();

        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for result in results {
            let entry = counts.entry(result.strategy_used.clone()).or_default();
            entry.0 += 1;
            if result.confidence > STRATEGY_SUCCESS_CONFIDENCE {
                entry.1 += 1;
            }
        }
        let strategies = counts
            .into_iter()
            .map(|(name, (used, succeeded))| {
                let stats = StrategyStats {
                    usage_count: used,
                    success_rate: ratio(succeeded, used),
                };
                (name, stats)
            })
            .collect();

        let average_confidence = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.confidence).sum::<f64>() / total as f64
        };

        Self {
            total_results: total,
            effective_fixes: effective,
            success_rate: ratio(effective, total),
            average_confidence,
            strategies,
        }
    }

    /// Results confident enough to count the defect as resolved.
    pub fn resolved(results: &[FixResult]) -> usize {
        results
            .iter()
            .filter(|r| r.confidence > RESOLVED_CONFIDENCE)
            .count()
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Percentage of defects removed; 0 when there were none to begin with.
pub fn defect_reduction(original: usize, remaining: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    original.saturating_sub(remaining) as f64 / original as f64 * 100.0
}
