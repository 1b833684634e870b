use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `strategy_used` when nothing was changed.
pub const NO_FIX_APPLIED: &str = "no_fix_applied";

/// `strategy_used` when the pipeline itself failed.
pub const ERROR_STRATEGY: &str = "error";

/// Confidence attached to any applied rule-based or oracle-assisted fix.
pub const APPLIED_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    /// Empty for pipeline-level sentinels.
    pub file_path: String,
    pub original_code: String,
    pub fixed_code: String,
    pub strategy_used: String,
    #[serde(default)]
    pub changes_made: Vec<String>,
    pub confidence: f64,
}

impl FixResult {
    /// Pipeline-level result with no file attached.
    pub fn sentinel(strategy: &str, change: impl Into<String>) -> Self {
        Self {
            file_path: String::new(),
            original_code: String::new(),
            fixed_code: String::new(),
            strategy_used: strategy.to_string(),
            changes_made: vec![change.into()],
            confidence: 0.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.file_path.is_empty()
    }

    /// False when `fixed_code` must not be trusted as a change.
    pub fn is_effective(&self) -> bool {
        self.strategy_used != NO_FIX_APPLIED && self.strategy_used != ERROR_STRATEGY
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
