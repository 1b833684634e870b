use std::cell::RefCell;
use std::time::Duration;

use crate::defect::{Defect, DefectCategory, Severity};
use crate::oracle::{Proposal, RepairOracle, RepairRequest, Sleeper};

/// Create an eval `Defect` at `line` with sensible defaults for tests.
pub fn make_defect(line: usize) -> Defect {
    Defect {
        category: DefectCategory::Security,
        message: "Use of insecure function 'eval'".to_string(),
        line_number: line,
        severity: Severity::Critical,
        tool: "bandit".to_string(),
        confidence: 0.95,
    }
}

/// Sleeper that records requested pauses instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Owned copy of a `RepairRequest`, captured by `ScriptedOracle`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub problem_code: String,
    pub error_description: String,
    pub context_code: String,
    pub language: String,
}

/// Oracle that replays canned proposals in order, then reports `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    proposals: RefCell<Vec<Proposal>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedOracle {
    pub fn new(proposals: Vec<Proposal>) -> Self {
        Self {
            proposals: RefCell::new(proposals),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }
}

impl RepairOracle for ScriptedOracle {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal {
        self.requests.borrow_mut().push(RecordedRequest {
            problem_code: request.problem_code.to_string(),
            error_description: request.error_description.to_string(),
            context_code: request.context_code.to_string(),
            language: request.language.to_string(),
        });
        let mut proposals = self.proposals.borrow_mut();
        if proposals.is_empty() {
            Proposal::Unavailable
        } else {
            proposals.remove(0)
        }
    }
}
