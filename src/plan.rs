use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::defect::Severity;
use crate::error::{Error, Result};

/// Open metadata carried from a defect observation onto its task.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Context key holding the raw defect pattern, e.g. `"eval_injection"`.
pub const DEFECT_TYPE_KEY: &str = "defect_type";

pub const SECURITY_FALLBACK_STRATEGY: &str = "apply_security_best_practices";
pub const ISSUE_FALLBACK_STRATEGY: &str = "fix_general_issue";
pub const GENERIC_FALLBACK_STRATEGY: &str = "general_repair_strategy";

const DEFAULT_PRIORITIES: &[(&str, Severity)] = &[
    ("security_vulnerability", Severity::Critical),
    ("injection_vulnerability", Severity::Critical),
    ("authentication_issue", Severity::Critical),
    ("syntax_error", Severity::High),
    ("runtime_error", Severity::High),
    ("logic_error", Severity::High),
    ("performance_issue", Severity::Medium),
    ("memory_leak", Severity::Medium),
    ("code_smell", Severity::Medium),
    ("duplicate_code", Severity::Low),
    ("naming_issue", Severity::Low),
    ("comment_issue", Severity::Low),
];

const DEFAULT_STRATEGIES: &[(&str, &str)] = &[
    ("eval_injection", "replace_eval_with_ast_literal_eval"),
    ("null_pointer", "add_null_check"),
    ("division_by_zero", "add_divisor_check"),
    ("syntax_error", "fix_syntax_issue"),
    ("unauthorized_access", "implement_proper_auth_check"),
    ("hardcoded_credentials", "move_credentials_to_env"),
    ("duplicate_code", "extract_common_function"),
    ("unoptimized_loop", "optimize_loop_structure"),
    ("missing_error_handling", "add_exception_handling"),
];

/// How far a defect's effects reach; drives priority escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    Normal,
    Widespread,
    CriticalSystem,
}

impl Impact {
    /// Unrecognized hints are treated as `Normal`.
    pub fn parse(s: &str) -> Self {
        match s {
            "widespread" => Impact::Widespread,
            "critical_system" => Impact::CriticalSystem,
            "normal" => Impact::Normal,
            other => {
                debug!(impact = other, "unrecognized impact hint, treating as normal");
                Impact::Normal
            }
        }
    }

    pub fn apply(self, priority: Severity) -> Severity {
        match self {
            Impact::Normal => priority,
            Impact::Widespread => priority.escalate(),
            Impact::CriticalSystem => Severity::Critical,
        }
    }
}

/// Lookup tables used to turn a `defect_type` into a priority and strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerRules {
    priorities: HashMap<String, Severity>,
    strategies: HashMap<String, String>,
    default_priority: Severity,
}

impl Default for PlannerRules {
    fn default() -> Self {
        Self {
            priorities: DEFAULT_PRIORITIES
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            strategies: DEFAULT_STRATEGIES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            default_priority: Severity::Medium,
        }
    }
}

impl PlannerRules {
    /// Empty tables; every lookup takes the fallback path.
    pub fn empty() -> Self {
        Self {
            priorities: HashMap::new(),
            strategies: HashMap::new(),
            default_priority: Severity::Medium,
        }
    }

    pub fn with_priority(mut self, defect_type: &str, priority: Severity) -> Self {
        self.priorities.insert(defect_type.to_string(), priority);
        self
    }

    pub fn with_strategy(mut self, defect_type: &str, strategy: &str) -> Self {
        self.strategies
            .insert(defect_type.to_string(), strategy.to_string());
        self
    }

    /// Layer config-supplied entries over the current tables.
    pub fn extend(
        mut self,
        priorities: &BTreeMap<String, Severity>,
        strategies: &BTreeMap<String, String>,
    ) -> Self {
        for (k, v) in priorities {
            self.priorities.insert(k.clone(), *v);
        }
        for (k, v) in strategies {
            self.strategies.insert(k.clone(), v.clone());
        }
        self
    }
}

/// One raw record from the detection stage, as handed to the builder.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DefectObservation {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub defect_index: Option<usize>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub context: Context,
}

impl DefectObservation {
    fn defect_type(&self) -> Option<&str> {
        self.context
            .get(DEFECT_TYPE_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTask {
    pub file_path: String,
    pub defect_index: usize,
    pub strategy: String,
    pub priority: Severity,
    #[serde(default)]
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub tasks: Vec<RepairTask>,
    pub total_tasks: usize,
}

impl RepairPlan {
    pub fn new(tasks: Vec<RepairTask>) -> Self {
        let total_tasks = tasks.len();
        Self { tasks, total_tasks }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strict parse: rejects missing fields and a `total_tasks` that
    /// disagrees with the task list.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: RepairPlan = serde_json::from_str(json)?;
        if plan.total_tasks != plan.tasks.len() {
            return Err(Error::Plan(format!(
                "total_tasks is {} but plan contains {} task(s)",
                plan.total_tasks,
                plan.tasks.len()
            )));
        }
        Ok(plan)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), tasks = self.total_tasks, "repair plan saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let plan = Self::from_json(&content).inspect_err(|e| {
            error!(path = %path.display(), error = %e, "failed to load repair plan");
        })?;
        info!(path = %path.display(), tasks = plan.total_tasks, "repair plan loaded");
        Ok(plan)
    }
}

/// Turns raw defect observations into a priority-ordered repair plan.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    rules: PlannerRules,
}

impl PlanBuilder {
    pub fn new(rules: PlannerRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PlannerRules {
        &self.rules
    }

    pub fn determine_priority(&self, defect_type: &str, impact: Impact) -> Severity {
        let base = self
            .rules
            .priorities
            .get(defect_type)
            .copied()
            .unwrap_or(self.rules.default_priority);
        let adjusted = impact.apply(base);
        if adjusted != base {
            debug!(defect_type, %base, %adjusted, "priority escalated by impact");
        }
        adjusted
    }

    /// Exact table lookup, then a substring heuristic. Always yields an id.
    pub fn determine_strategy(&self, defect_type: &str) -> String {
        if let Some(strategy) = self.rules.strategies.get(defect_type) {
            return strategy.clone();
        }

        warn!(defect_type, "no dedicated repair strategy, using fallback");
        let fallback = if defect_type.contains("security") {
            SECURITY_FALLBACK_STRATEGY
        } else if defect_type.contains("error") || defect_type.contains("issue") {
            ISSUE_FALLBACK_STRATEGY
        } else {
            GENERIC_FALLBACK_STRATEGY
        };
        fallback.to_string()
    }

    /// Build one task per complete observation and stable-sort by priority.
    ///
    /// Observations without a file path or a `defect_type` are skipped.
    pub fn build(&self, observations: &[DefectObservation]) -> RepairPlan {
        info!(count = observations.len(), "building repair plan");

        let mut tasks = Vec::with_capacity(observations.len());
        for (position, observation) in observations.iter().enumerate() {
            let file_path = observation.file_path.as_deref().filter(|p| !p.is_empty());
            let (Some(file_path), Some(defect_type)) = (file_path, observation.defect_type())
            else {
                error!(
                    position,
                    ?observation,
                    "incomplete defect observation (missing file path or defect_type), skipping"
                );
                continue;
            };

            let impact = Impact::parse(observation.impact.as_deref().unwrap_or("normal"));
            let priority = self.determine_priority(defect_type, impact);
            let strategy = self.determine_strategy(defect_type);
            let defect_index = observation.defect_index.unwrap_or(position);

            debug!(
                file = file_path,
                defect_index,
                %priority,
                strategy = %strategy,
                "created repair task"
            );

            tasks.push(RepairTask {
                file_path: file_path.to_string(),
                defect_index,
                strategy,
                priority,
                context: observation.context.clone(),
            });
        }

        tasks.sort_by_key(|t| t.priority.rank());

        let plan = RepairPlan::new(tasks);
        info!(tasks = plan.total_tasks, "repair plan built");
        plan
    }

    /// Parse a JSON array of observations and build a plan.
    ///
    /// Only a malformed top level is an error; individual records that do
    /// not deserialize are skipped like incomplete ones.
    pub fn build_from_json(&self, json: &str) -> Result<RepairPlan> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let observations: Vec<DefectObservation> = values
            .into_iter()
            .enumerate()
            .map(|(position, value)| {
                serde_json::from_value(value).unwrap_or_else(|e| {
                    warn!(position, error = %e, "malformed defect observation");
                    DefectObservation::default()
                })
            })
            .collect();
        Ok(self.build(&observations))
    }
}
