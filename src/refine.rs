//! Feedback-driven refinement of a previous fix.
//!
//! [`refine_round`] is the single-round transition; [`Refinement`] tracks a
//! sequence of rounds and decides when to stop.

use tracing::{debug, info, warn};

use crate::oracle::{Proposal, RepairOracle, RepairRequest};
use crate::result::FixResult;

const ROUND_MARKER: &str = "_round";
const CONFIDENCE_STEP: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 1.0;

/// `strategy` with its round marker advanced: no marker becomes `_round2`,
/// `_roundN` becomes `_round{N+1}`.
///
/// A suffix that is not plain ASCII digits, or a round that cannot be
/// incremented, is treated as no marker.
pub fn next_round_strategy(strategy: &str) -> String {
    if let Some(pos) = strategy.rfind(ROUND_MARKER) {
        let digits = &strategy[pos + ROUND_MARKER.len()..];
        if !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && let Some(next) = digits.parse::<u32>().ok().and_then(|r| r.checked_add(1))
        {
            return format!("{}{ROUND_MARKER}{next}", &strategy[..pos]);
        }
    }
    format!("{strategy}{ROUND_MARKER}2")
}

/// Ask the oracle to revise `previous` in light of `feedback`.
///
/// `None` when the oracle is unavailable, fails, or `previous` is a
/// pipeline sentinel with no file attached.
pub fn refine_round(
    oracle: &dyn RepairOracle,
    language: &str,
    previous: &FixResult,
    feedback: &str,
) -> Option<FixResult> {
    if previous.is_sentinel() {
        debug!(strategy = %previous.strategy_used, "sentinel result, nothing to refine");
        return None;
    }

    let instruction = format!("Previous fix feedback: {feedback}. Please fix the code again.");
    let request = RepairRequest {
        problem_code: &previous.fixed_code,
        error_description: &instruction,
        context_code: &previous.original_code,
        language,
    };

    match oracle.propose(&request) {
        Proposal::Fixed(code) => {
            let mut changes_made = previous.changes_made.clone();
            changes_made.push(format!("revised per feedback: {feedback}"));
            let refined = FixResult {
                file_path: previous.file_path.clone(),
                original_code: previous.original_code.clone(),
                fixed_code: code,
                strategy_used: next_round_strategy(&previous.strategy_used),
                changes_made,
                confidence: (previous.confidence + CONFIDENCE_STEP).min(MAX_CONFIDENCE),
            };
            info!(
                file = %refined.file_path,
                strategy = %refined.strategy_used,
                confidence = refined.confidence,
                "refinement round applied"
            );
            Some(refined)
        }
        Proposal::Failed(msg) => {
            warn!(file = %previous.file_path, error = %msg, "refinement round failed");
            None
        }
        Proposal::Unavailable => {
            warn!(file = %previous.file_path, "repair oracle not available, keeping previous result");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Initial,
    Refining { round: u32 },
    Converged { rounds: u32 },
    Abandoned { rounds: u32 },
}

impl RoundState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundState::Converged { .. } | RoundState::Abandoned { .. })
    }

    pub fn rounds(self) -> u32 {
        match self {
            RoundState::Initial => 0,
            RoundState::Refining { round } => round,
            RoundState::Converged { rounds } | RoundState::Abandoned { rounds } => rounds,
        }
    }
}

/// A bounded sequence of refinement rounds over one result.
///
/// The caller supplies feedback and the round function; this type only
/// tracks state and applies the stop rules: the round bound, an oracle that
/// declines, and saturated confidence.
#[derive(Debug, Clone)]
pub struct Refinement {
    state: RoundState,
    current: FixResult,
    max_rounds: u32,
}

impl Refinement {
    pub fn new(initial: FixResult, max_rounds: u32) -> Self {
        Self {
            state: RoundState::Initial,
            current: initial,
            max_rounds,
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn current(&self) -> &FixResult {
        &self.current
    }

    pub fn into_result(self) -> FixResult {
        self.current
    }

    /// Run one round with `round`, unless already finished.
    pub fn advance<F>(&mut self, round: F) -> RoundState
    where
        F: FnOnce(&FixResult) -> Option<FixResult>,
    {
        if self.state.is_terminal() {
            return self.state;
        }

        let done = self.state.rounds();
        if done >= self.max_rounds {
            debug!(rounds = done, max_rounds = self.max_rounds, "round bound reached");
            self.state = RoundState::Abandoned { rounds: done };
            return self.state;
        }

        self.state = match round(&self.current) {
            None => RoundState::Abandoned { rounds: done },
            Some(next) => {
                self.current = next;
                let rounds = done + 1;
                if self.current.confidence >= MAX_CONFIDENCE {
                    RoundState::Converged { rounds }
                } else {
                    RoundState::Refining { round: rounds }
                }
            }
        };
        self.state
    }

    /// Caller declares the current result good enough.
    pub fn accept(&mut self) -> RoundState {
        if !self.state.is_terminal() {
            self.state = RoundState::Converged {
                rounds: self.state.rounds(),
            };
        }
        self.state
    }
}
