use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered severity scale shared by detected defects and planned tasks.
///
/// Variants are declared most urgent first, so the derived `Ord` sorts
/// `Critical` ahead of `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Sort rank: CRITICAL(0) < HIGH(1) < MEDIUM(2) < LOW(3).
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
        }
    }

    /// One level more urgent, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Critical | Severity::High => Severity::Critical,
            Severity::Medium => Severity::High,
            Severity::Low => Severity::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectCategory {
    Syntax,
    Security,
    Logic,
    Performance,
    #[serde(alias = "code-smell")]
    CodeSmell,
}

fn default_confidence() -> f64 {
    0.8
}

/// One issue reported by a detector at a specific line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    #[serde(rename = "type")]
    pub category: DefectCategory,
    pub message: String,
    /// 1-based line within the owning file.
    pub line_number: usize,
    pub severity: Severity,
    pub tool: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDefects {
    pub file_path: String,
    #[serde(default)]
    pub defects: Vec<Defect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectReport {
    pub files: Vec<FileDefects>,
    #[serde(default)]
    pub summary: BTreeMap<String, usize>,
}

impl DefectReport {
    /// Build a report whose summary counts every severity, zero-filled.
    pub fn from_files(files: Vec<FileDefects>) -> Self {
        let mut summary: BTreeMap<String, usize> = Severity::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for defect in files.iter().flat_map(|f| &f.defects) {
            *summary.entry(defect.severity.as_str().to_string()).or_default() += 1;
        }
        Self { files, summary }
    }

    pub fn find_file(&self, file_path: &str) -> Option<&FileDefects> {
        self.files.iter().find(|f| f.file_path == file_path)
    }

    pub fn total_defects(&self) -> usize {
        self.files.iter().map(|f| f.defects.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strict parse: required fields must be present and every confidence
    /// must lie in `[0, 1]`.
    pub fn from_json(json: &str) -> Result<Self> {
        let report: DefectReport = serde_json::from_str(json)?;
        for file in &report.files {
            for (idx, defect) in file.defects.iter().enumerate() {
                if !(0.0..=1.0).contains(&defect.confidence) {
                    return Err(Error::Plan(format!(
                        "defect #{idx} in {} has confidence {} outside [0, 1]",
                        file.file_path, defect.confidence
                    )));
                }
            }
        }
        Ok(report)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
