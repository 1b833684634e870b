#![allow(dead_code)]

use std::cell::RefCell;

use remedy::defect::{Defect, DefectCategory, DefectReport, FileDefects, Severity};
use remedy::oracle::{Proposal, RepairOracle, RepairRequest};

pub const CALC_PY: &str = "import os\n\n\ndef calculate(expression):\n    result = eval(expression)\n    return result\n";

pub const CHECK_PY: &str = "def check(data):\n    if data = None:\n        return False\n    return True\n";

pub const PROFILE_PY: &str = "def load(repo, key):\n    profile = repo.get(key)\n    return profile.name\n";

pub fn defect(category: DefectCategory, message: &str, line: usize, severity: Severity) -> Defect {
    Defect {
        category,
        message: message.to_string(),
        line_number: line,
        severity,
        tool: "pylint".to_string(),
        confidence: 0.9,
    }
}

/// Report covering the three sample files above.
pub fn sample_report() -> DefectReport {
    DefectReport::from_files(vec![
        FileDefects {
            file_path: "calc.py".to_string(),
            defects: vec![defect(
                DefectCategory::Security,
                "Use of insecure function 'eval'",
                5,
                Severity::Critical,
            )],
        },
        FileDefects {
            file_path: "check.py".to_string(),
            defects: vec![defect(
                DefectCategory::Syntax,
                "invalid syntax: assignment in condition",
                2,
                Severity::High,
            )],
        },
        FileDefects {
            file_path: "profile.py".to_string(),
            defects: vec![defect(
                DefectCategory::Logic,
                "possible None dereference",
                2,
                Severity::Medium,
            )],
        },
    ])
}

/// Observations matching `sample_report`, plus one incomplete record.
pub const SAMPLE_OBSERVATIONS: &str = r#"[
  {"file_path": "profile.py", "defect_index": 0, "context": {"defect_type": "null_pointer"}},
  {"file_path": "check.py", "defect_index": 0, "context": {"defect_type": "syntax_error"}},
  {"file_path": "calc.py", "defect_index": 0, "impact": "critical_system",
   "context": {"defect_type": "eval_injection", "tool": "bandit"}},
  {"defect_index": 0, "context": {"defect_type": "eval_injection"}}
]"#;

/// Oracle that replays canned proposals and records what it was asked.
#[derive(Default)]
pub struct CannedOracle {
    proposals: RefCell<Vec<Proposal>>,
    pub descriptions: RefCell<Vec<String>>,
}

impl CannedOracle {
    pub fn new(proposals: Vec<Proposal>) -> Self {
        Self {
            proposals: RefCell::new(proposals),
            descriptions: RefCell::new(Vec::new()),
        }
    }
}

impl RepairOracle for CannedOracle {
    fn propose(&self, request: &RepairRequest<'_>) -> Proposal {
        self.descriptions
            .borrow_mut()
            .push(request.error_description.to_string());
        let mut proposals = self.proposals.borrow_mut();
        if proposals.is_empty() {
            Proposal::Unavailable
        } else {
            proposals.remove(0)
        }
    }
}
