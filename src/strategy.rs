//! Named repair strategies.
//!
//! Deterministic rules work on line-oriented text: the defect's 1-based line
//! is located by splitting on `\n`, rewritten with substring/regex edits, and
//! the text is joined back with `\n`. Oracle-backed strategies hand the whole
//! file to a [`RepairOracle`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{info, warn};

use crate::defect::Defect;
use crate::oracle::{Proposal, RepairOracle, RepairRequest};
use crate::plan::Context;

pub const REPLACE_EVAL: &str = "replace_eval_with_ast_literal_eval";
pub const FIX_SYNTAX_ERROR: &str = "fix_syntax_error";
pub const ADD_NULL_CHECK: &str = "add_null_check";
pub const FIX_INDENTATION: &str = "fix_indentation";
pub const ADD_TYPE_HINT: &str = "add_type_hint";
pub const ORACLE_REPAIR: &str = "ai_automatic_fix";

const SAFE_EVAL_IMPORT: &str = "import ast";
const SAFE_EVAL_CALL: &str = "ast.literal_eval";
const INDENT: &str = "    ";

/// Reserved words that can open a line but never name an assignment target.
const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

static EVAL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w.])(eval)\(").unwrap());
static CONDITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:if|elif|while)\b").unwrap());
static ASSIGN_NONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^=!<>\s])\s*=\s*None\b").unwrap());
static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bis\b").unwrap());
static BLOCK_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:for|if|while|def|class|elif|else|try|except|finally)\b").unwrap()
});
static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)([A-Za-z_][\w.]*)\s*(?::[^=]*)?=(?:[^=]|$)").unwrap()
});

/// Revised text plus the change log of one strategy run.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub code: String,
    pub changes: Vec<String>,
    /// False when `code` is the untouched input.
    pub applied: bool,
}

impl StrategyOutcome {
    fn applied(code: String, changes: Vec<String>) -> Self {
        Self {
            code,
            changes,
            applied: true,
        }
    }

    fn unchanged(code: &str, change: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            changes: vec![change.into()],
            applied: false,
        }
    }
}

/// The oracle plus the language tag every consultation is sent with.
#[derive(Clone, Copy)]
pub struct OracleFallback<'a> {
    pub oracle: &'a dyn RepairOracle,
    pub language: &'a str,
}

impl<'a> OracleFallback<'a> {
    pub fn new(oracle: &'a dyn RepairOracle, language: &'a str) -> Self {
        Self { oracle, language }
    }

    fn consult(&self, code: &str, instruction: &str) -> Proposal {
        self.oracle.propose(&RepairRequest {
            problem_code: code,
            error_description: instruction,
            context_code: "",
            language: self.language,
        })
    }

    /// Generic oracle-backed repair shared by every delegating strategy.
    pub fn repair(&self, code: &str, instruction: &str) -> StrategyOutcome {
        match self.consult(code, instruction) {
            Proposal::Fixed(fixed) => {
                info!(instruction, "applied oracle repair");
                StrategyOutcome::applied(fixed, vec![format!("oracle repair: {instruction}")])
            }
            Proposal::Failed(msg) => {
                warn!(error = %msg, "oracle repair failed");
                StrategyOutcome::unchanged(code, format!("oracle repair failed: {msg}"))
            }
            Proposal::Unavailable => {
                warn!("repair oracle not available, cannot repair automatically");
                StrategyOutcome::unchanged(code, "repair oracle not available")
            }
        }
    }
}

/// Every strategy the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    ReplaceEval,
    FixSyntaxError,
    AddNullCheck,
    FixIndentation,
    AddTypeHint,
    OracleRepair,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::ReplaceEval,
        Strategy::FixSyntaxError,
        Strategy::AddNullCheck,
        Strategy::FixIndentation,
        Strategy::AddTypeHint,
        Strategy::OracleRepair,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Strategy::ReplaceEval => REPLACE_EVAL,
            Strategy::FixSyntaxError => FIX_SYNTAX_ERROR,
            Strategy::AddNullCheck => ADD_NULL_CHECK,
            Strategy::FixIndentation => FIX_INDENTATION,
            Strategy::AddTypeHint => ADD_TYPE_HINT,
            Strategy::OracleRepair => ORACLE_REPAIR,
        }
    }

    pub fn apply(
        self,
        code: &str,
        defect: &Defect,
        _context: &Context,
        fallback: &OracleFallback<'_>,
    ) -> StrategyOutcome {
        match self {
            Strategy::ReplaceEval => replace_eval(code, defect),
            Strategy::FixSyntaxError => fix_syntax_error(code, defect, fallback),
            Strategy::AddNullCheck => add_null_check(code, defect),
            Strategy::FixIndentation => fallback.repair(code, "fix indentation"),
            Strategy::AddTypeHint => fallback.repair(code, "add type hints"),
            Strategy::OracleRepair => fallback.repair(code, &defect.message),
        }
    }
}

/// Maps strategy identifiers from a plan onto runnable strategies.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    entries: HashMap<String, Strategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self {
            entries: Strategy::ALL
                .iter()
                .map(|s| (s.id().to_string(), *s))
                .collect(),
        }
    }
}

impl StrategyRegistry {
    /// Register an extra identifier for an existing strategy.
    pub fn with_alias(mut self, id: &str, strategy: Strategy) -> Self {
        self.entries.insert(id.to_string(), strategy);
        self
    }

    /// `None` for unregistered identifiers; callers pick the fallback.
    pub fn resolve(&self, id: &str) -> Option<Strategy> {
        self.entries.get(id).copied()
    }
}

fn split_lines(code: &str) -> Vec<String> {
    code.split('\n').map(str::to_string).collect()
}

/// 0-based index of a 1-based line number, if it exists.
fn line_index(lines: &[String], line_number: usize) -> Option<usize> {
    (1..=lines.len())
        .contains(&line_number)
        .then(|| line_number - 1)
}

/// Where the safe-eval import goes: after the last import in the leading
/// header of blank, comment and import lines; else before the first code
/// line; else at the top.
fn import_insert_index(lines: &[String]) -> usize {
    let mut last_import = None;
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            last_import = Some(idx);
            continue;
        }
        return last_import.map_or(idx, |i| i + 1);
    }
    last_import.map_or(0, |i| i + 1)
}

/// Whether some `import` statement binds the name `ast`, including
/// `import os, ast` and `import ast as ast`.
fn binds_ast(lines: &[String]) -> bool {
    lines.iter().any(|line| {
        let statement = line.split('#').next().unwrap_or_default().trim();
        let Some(names) = statement.strip_prefix("import ") else {
            return false;
        };
        names.split(',').any(|item| {
            let words: Vec<&str> = item.split_whitespace().collect();
            matches!(words.as_slice(), ["ast"] | ["ast", "as", "ast"])
        })
    })
}

pub fn replace_eval(code: &str, defect: &Defect) -> StrategyOutcome {
    let line_number = defect.line_number;
    let mut lines = split_lines(code);
    let Some(idx) = line_index(&lines, line_number) else {
        return StrategyOutcome::unchanged(code, format!("line {line_number} is out of range"));
    };

    let Some(call) = EVAL_CALL_RE
        .captures(&lines[idx])
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
    else {
        return StrategyOutcome::unchanged(
            code,
            format!("no eval() call found on line {line_number}"),
        );
    };

    let mut changes = Vec::new();
    lines[idx].replace_range(call, SAFE_EVAL_CALL);

    if !binds_ast(&lines) {
        let at = import_insert_index(&lines);
        lines.insert(at, SAFE_EVAL_IMPORT.to_string());
        changes.push(format!("added `{SAFE_EVAL_IMPORT}`"));
    }
    changes.push(format!(
        "replaced eval() with ast.literal_eval() on line {line_number}"
    ));

    StrategyOutcome::applied(lines.join("\n"), changes)
}

/// Deterministic syntax rules; `None` when neither applies.
fn fix_syntax_line(line: &str, line_number: usize) -> Option<(String, String)> {
    if CONDITION_RE.is_match(line) && !line.contains("==") && ASSIGN_NONE_RE.is_match(line) {
        let op = if IDENTITY_RE.is_match(line) { "is" } else { "==" };
        let fixed = ASSIGN_NONE_RE
            .replacen(line, 1, |caps: &Captures| format!("{} {op} None", &caps[1]))
            .into_owned();
        return Some((
            fixed,
            format!("fixed syntax error on line {line_number}: replaced `= None` with `{op} None`"),
        ));
    }

    if BLOCK_KEYWORD_RE.is_match(line) && !line.trim_end().ends_with(':') {
        return Some((
            format!("{}:", line.trim_end()),
            format!("fixed syntax error on line {line_number}: added missing colon"),
        ));
    }

    None
}

pub fn fix_syntax_error(
    code: &str,
    defect: &Defect,
    fallback: &OracleFallback<'_>,
) -> StrategyOutcome {
    let mut lines = split_lines(code);
    if let Some(idx) = line_index(&lines, defect.line_number)
        && let Some((fixed, change)) = fix_syntax_line(&lines[idx], defect.line_number)
    {
        lines[idx] = fixed;
        return StrategyOutcome::applied(lines.join("\n"), vec![change]);
    }

    match fallback.consult(code, &defect.message) {
        Proposal::Fixed(fixed) => StrategyOutcome::applied(
            fixed,
            vec!["repaired syntax error with the repair oracle".to_string()],
        ),
        Proposal::Failed(msg) => {
            StrategyOutcome::unchanged(code, format!("unable to auto-fix the syntax error: {msg}"))
        }
        Proposal::Unavailable => StrategyOutcome::unchanged(
            code,
            "unable to auto-fix the syntax error: repair oracle not available",
        ),
    }
}

pub fn add_null_check(code: &str, defect: &Defect) -> StrategyOutcome {
    let line_number = defect.line_number;
    let mut lines = split_lines(code);
    let Some(idx) = line_index(&lines, line_number) else {
        return StrategyOutcome::unchanged(
            code,
            format!("unable to add a None check: line {line_number} is out of range"),
        );
    };

    let Some(caps) = ASSIGNMENT_RE.captures(&lines[idx]) else {
        return StrategyOutcome::unchanged(
            code,
            format!("unable to add a None check: no assignment on line {line_number}"),
        );
    };
    let indent = caps[1].to_string();
    let name = caps[2].to_string();
    if PYTHON_KEYWORDS.contains(&name.as_str()) {
        return StrategyOutcome::unchanged(
            code,
            format!("unable to add a None check: no assignment on line {line_number}"),
        );
    }

    lines.insert(idx + 1, format!("{indent}if {name} is None:"));
    lines.insert(
        idx + 2,
        format!("{indent}{INDENT}raise ValueError(\"{name} cannot be None\")"),
    );

    StrategyOutcome::applied(
        lines.join("\n"),
        vec![format!(
            "added None check for `{name}` at line {}",
            line_number + 1
        )],
    )
}
