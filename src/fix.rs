use tracing::{debug, error, info, warn};

use crate::defect::DefectReport;
use crate::error::Result;
use crate::oracle::RepairOracle;
use crate::plan::{RepairPlan, RepairTask};
use crate::refine::refine_round;
use crate::result::{APPLIED_CONFIDENCE, ERROR_STRATEGY, FixResult, NO_FIX_APPLIED};
use crate::store::TextStore;
use crate::strategy::{ORACLE_REPAIR, OracleFallback, Strategy, StrategyRegistry};

/// Runs repair tasks against a text store, consulting the oracle when a
/// strategy needs it.
///
/// Per-task failures (unknown file, bad defect index, unreadable source) skip
/// the task. The top-level entry points never return an error; failures come
/// back as sentinel results.
pub struct FixExecutor<S, O> {
    store: S,
    oracle: O,
    language: String,
    registry: StrategyRegistry,
}

impl<S: TextStore, O: RepairOracle> FixExecutor<S, O> {
    pub fn new(store: S, oracle: O, language: impl Into<String>) -> Self {
        Self {
            store,
            oracle,
            language: language.into(),
            registry: StrategyRegistry::default(),
        }
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn fallback(&self) -> OracleFallback<'_> {
        OracleFallback::new(&self.oracle, &self.language)
    }

    /// Execute one task. `None` means the task was skipped.
    pub fn execute_task(&self, task: &RepairTask, report: &DefectReport) -> Option<FixResult> {
        let file = task.file_path.as_str();

        let Some(entry) = report
            .find_file(file)
            .filter(|entry| !entry.defects.is_empty())
        else {
            debug!(file, "no defects reported for file, skipping task");
            return None;
        };

        let Some(defect) = entry.defects.get(task.defect_index) else {
            warn!(
                file,
                defect_index = task.defect_index,
                defects = entry.defects.len(),
                "defect index out of range, skipping task"
            );
            return None;
        };

        let original = match self.store.read(file) {
            Ok(text) => text,
            Err(e) => {
                error!(file, error = %e, "failed to read source, skipping task");
                return None;
            }
        };

        let (strategy, strategy_id) = match self.registry.resolve(&task.strategy) {
            Some(strategy) => (strategy, task.strategy.as_str()),
            None => {
                warn!(
                    file,
                    strategy = %task.strategy,
                    "unregistered repair strategy, falling back to oracle repair"
                );
                (Strategy::OracleRepair, ORACLE_REPAIR)
            }
        };

        info!(
            file,
            defect_index = task.defect_index,
            strategy = strategy_id,
            priority = %task.priority,
            "executing repair task"
        );
        let outcome = strategy.apply(&original, defect, &task.context, &self.fallback());

        let result = if outcome.applied {
            FixResult {
                file_path: task.file_path.clone(),
                original_code: original,
                fixed_code: outcome.code,
                strategy_used: strategy_id.to_string(),
                changes_made: outcome.changes,
                confidence: APPLIED_CONFIDENCE,
            }
        } else {
            info!(file, strategy = strategy_id, "strategy made no change");
            FixResult {
                file_path: task.file_path.clone(),
                fixed_code: original.clone(),
                original_code: original,
                strategy_used: NO_FIX_APPLIED.to_string(),
                changes_made: outcome.changes,
                confidence: 0.0,
            }
        };
        Some(result)
    }

    /// Every result produced by the plan, in plan order.
    pub fn fix_all(&self, plan: &RepairPlan, report: &DefectReport) -> Vec<FixResult> {
        let results: Vec<FixResult> = plan
            .tasks
            .iter()
            .filter_map(|task| self.execute_task(task, report))
            .collect();
        info!(
            tasks = plan.total_tasks,
            results = results.len(),
            "repair plan executed"
        );
        results
    }

    /// First result in plan order, or a `no_fix_applied` sentinel.
    pub fn fix(&self, plan: &RepairPlan, report: &DefectReport) -> FixResult {
        for task in &plan.tasks {
            if let Some(result) = self.execute_task(task, report) {
                return result;
            }
        }
        warn!(tasks = plan.total_tasks, "no task produced a fix result");
        FixResult::sentinel(NO_FIX_APPLIED, "no repair task produced a result")
    }

    /// Like [`fix`](Self::fix), from serialized inputs. A malformed plan or
    /// report yields an `error` sentinel carrying the parse message.
    pub fn fix_json(&self, plan_json: &str, report_json: &str) -> FixResult {
        match parse_inputs(plan_json, report_json) {
            Ok((plan, report)) => self.fix(&plan, &report),
            Err(e) => error_sentinel(&e),
        }
    }

    /// Like [`fix_all`](Self::fix_all), from serialized inputs.
    pub fn fix_all_json(&self, plan_json: &str, report_json: &str) -> Vec<FixResult> {
        match parse_inputs(plan_json, report_json) {
            Ok((plan, report)) => self.fix_all(&plan, &report),
            Err(e) => vec![error_sentinel(&e)],
        }
    }

    /// One feedback round; `None` when the oracle declines or is unavailable.
    pub fn refine_round(&self, previous: &FixResult, feedback: &str) -> Option<FixResult> {
        refine_round(&self.oracle, &self.language, previous, feedback)
    }

    /// One feedback round; the previous result comes back unchanged when the
    /// oracle cannot revise it.
    pub fn refine(&self, previous: &FixResult, feedback: &str) -> FixResult {
        self.refine_round(previous, feedback)
            .unwrap_or_else(|| previous.clone())
    }
}

fn parse_inputs(plan_json: &str, report_json: &str) -> Result<(RepairPlan, DefectReport)> {
    let plan = RepairPlan::from_json(plan_json)?;
    let report = DefectReport::from_json(report_json)?;
    Ok((plan, report))
}

fn error_sentinel(e: &crate::error::Error) -> FixResult {
    error!(error = %e, "failed to parse fix inputs");
    FixResult::sentinel(ERROR_STRATEGY, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defect::{Defect, DefectCategory, FileDefects, Severity};
    use crate::oracle::{NoOracle, Proposal};
    use crate::plan::Context;
    use crate::store::MemoryStore;
    use crate::strategy::{ADD_NULL_CHECK, FIX_INDENTATION, FIX_SYNTAX_ERROR, REPLACE_EVAL};
    use crate::test_helpers::{ScriptedOracle, make_defect};

    const EVAL_SRC: &str = "def f(e):\n    r = eval(e)\n    return r\n";

    fn task(file: &str, index: usize, strategy: &str) -> RepairTask {
        RepairTask {
            file_path: file.to_string(),
            defect_index: index,
            strategy: strategy.to_string(),
            priority: Severity::Critical,
            context: Context::new(),
        }
    }

    fn report(file: &str, defects: Vec<Defect>) -> DefectReport {
        DefectReport::from_files(vec![FileDefects {
            file_path: file.to_string(),
            defects,
        }])
    }

    fn executor(store: MemoryStore) -> FixExecutor<MemoryStore, NoOracle> {
        FixExecutor::new(store, NoOracle, "python")
    }

    #[test]
    fn test_eval_task_applied() {
        let exec = executor(MemoryStore::new().with_file("a.py", EVAL_SRC));
        let result = exec
            .execute_task(&task("a.py", 0, REPLACE_EVAL), &report("a.py", vec![make_defect(2)]))
            .unwrap();
        assert_eq!(result.file_path, "a.py");
        assert_eq!(result.original_code, EVAL_SRC);
        assert!(result.fixed_code.contains("import ast"));
        assert!(result.fixed_code.contains("ast.literal_eval(e)"));
        assert_eq!(result.strategy_used, REPLACE_EVAL);
        assert_eq!(result.confidence, APPLIED_CONFIDENCE);
        assert!(result.is_effective());
    }

    #[test]
    fn test_no_change_yields_no_fix_applied() {
        let exec = executor(MemoryStore::new().with_file("a.py", "x = 1\n"));
        let result = exec
            .execute_task(&task("a.py", 0, REPLACE_EVAL), &report("a.py", vec![make_defect(1)]))
            .unwrap();
        assert_eq!(result.strategy_used, NO_FIX_APPLIED);
        assert_eq!(result.fixed_code, result.original_code);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.changes_made, vec!["no eval() call found on line 1"]);
        assert!(!result.is_effective());
    }

    #[test]
    fn test_missing_file_entry_skips() {
        let exec = executor(MemoryStore::new().with_file("a.py", EVAL_SRC));
        let rep = report("other.py", vec![make_defect(2)]);
        assert!(exec.execute_task(&task("a.py", 0, REPLACE_EVAL), &rep).is_none());
    }

    #[test]
    fn test_empty_defect_list_skips() {
        let exec = executor(MemoryStore::new().with_file("a.py", EVAL_SRC));
        let rep = report("a.py", vec![]);
        assert!(exec.execute_task(&task("a.py", 0, REPLACE_EVAL), &rep).is_none());
    }

    #[test]
    fn test_defect_index_out_of_range_skips() {
        let exec = executor(MemoryStore::new().with_file("a.py", EVAL_SRC));
        let rep = report("a.py", vec![make_defect(2)]);
        assert!(exec.execute_task(&task("a.py", 1, REPLACE_EVAL), &rep).is_none());
    }

    #[test]
    fn test_unreadable_file_skips() {
        let exec = executor(MemoryStore::new());
        let rep = report("a.py", vec![make_defect(2)]);
        assert!(exec.execute_task(&task("a.py", 0, REPLACE_EVAL), &rep).is_none());
    }

    #[test]
    fn test_unknown_strategy_uses_oracle_fallback() {
        let oracle = ScriptedOracle::new(vec![Proposal::Fixed("x = 2\n".to_string())]);
        let exec = FixExecutor::new(
            MemoryStore::new().with_file("a.py", "x = 1\n"),
            &oracle,
            "python",
        );
        let result = exec
            .execute_task(
                &task("a.py", 0, "implement_proper_auth_check"),
                &report("a.py", vec![make_defect(1)]),
            )
            .unwrap();
        assert_eq!(result.strategy_used, ORACLE_REPAIR);
        assert_eq!(result.fixed_code, "x = 2\n");
        assert_eq!(oracle.requests()[0].error_description, make_defect(1).message);
    }

    #[test]
    fn test_unknown_strategy_without_oracle_is_no_fix() {
        let exec = executor(MemoryStore::new().with_file("a.py", "x = 1\n"));
        let result = exec
            .execute_task(
                &task("a.py", 0, "general_repair_strategy"),
                &report("a.py", vec![make_defect(1)]),
            )
            .unwrap();
        assert_eq!(result.strategy_used, NO_FIX_APPLIED);
        assert_eq!(result.changes_made, vec!["repair oracle not available"]);
    }

    #[test]
    fn test_oracle_strategy_receives_language() {
        let oracle = ScriptedOracle::new(vec![Proposal::Fixed("fixed".to_string())]);
        let exec = FixExecutor::new(
            MemoryStore::new().with_file("a.js", "broken"),
            &oracle,
            "javascript",
        );
        exec.execute_task(&task("a.js", 0, FIX_INDENTATION), &report("a.js", vec![make_defect(1)]))
            .unwrap();
        assert_eq!(oracle.requests()[0].language, "javascript");
    }

    #[test]
    fn test_registry_alias_dispatches() {
        let exec = executor(MemoryStore::new().with_file("a.py", "if data = None:\n    pass"))
            .with_registry(
                StrategyRegistry::default().with_alias("fix_syntax_issue", Strategy::FixSyntaxError),
            );
        let result = exec
            .execute_task(
                &task("a.py", 0, "fix_syntax_issue"),
                &report("a.py", vec![make_defect(1)]),
            )
            .unwrap();
        assert_eq!(result.strategy_used, "fix_syntax_issue");
        assert_eq!(result.fixed_code, "if data == None:\n    pass");
    }

    #[test]
    fn test_fix_returns_first_result_in_plan_order() {
        let store = MemoryStore::new()
            .with_file("a.py", EVAL_SRC)
            .with_file("b.py", "if data = None:\n    pass");
        let exec = executor(store);
        let rep = DefectReport::from_files(vec![
            FileDefects {
                file_path: "a.py".to_string(),
                defects: vec![make_defect(2)],
            },
            FileDefects {
                file_path: "b.py".to_string(),
                defects: vec![make_defect(1)],
            },
        ]);
        let plan = RepairPlan::new(vec![
            task("missing.py", 0, REPLACE_EVAL),
            task("b.py", 0, FIX_SYNTAX_ERROR),
            task("a.py", 0, REPLACE_EVAL),
        ]);

        let first = exec.fix(&plan, &rep);
        assert_eq!(first.file_path, "b.py");

        let all = exec.fix_all(&plan, &rep);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].file_path, "b.py");
        assert_eq!(all[1].file_path, "a.py");
    }

    #[test]
    fn test_fix_without_results_returns_sentinel() {
        let exec = executor(MemoryStore::new());
        let plan = RepairPlan::new(vec![task("a.py", 0, REPLACE_EVAL)]);
        let result = exec.fix(&plan, &report("a.py", vec![make_defect(1)]));
        assert!(result.is_sentinel());
        assert_eq!(result.strategy_used, NO_FIX_APPLIED);
        assert_eq!(result.changes_made.len(), 1);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_fix_empty_plan_returns_sentinel() {
        let exec = executor(MemoryStore::new());
        let result = exec.fix(&RepairPlan::new(vec![]), &DefectReport::from_files(vec![]));
        assert_eq!(result.strategy_used, NO_FIX_APPLIED);
    }

    #[test]
    fn test_fix_json_round_trip() {
        let exec = executor(MemoryStore::new().with_file("a.py", "x = compute()\nprint(x.y)"));
        let plan = RepairPlan::new(vec![task("a.py", 0, ADD_NULL_CHECK)]);
        let rep = report(
            "a.py",
            vec![Defect {
                category: DefectCategory::Logic,
                message: "possible None dereference".to_string(),
                line_number: 1,
                severity: Severity::High,
                tool: "pylint".to_string(),
                confidence: 0.7,
            }],
        );
        let result = exec.fix_json(&plan.to_json().unwrap(), &rep.to_json().unwrap());
        assert_eq!(result.strategy_used, ADD_NULL_CHECK);
        assert!(result.fixed_code.contains("if x is None:"));
    }

    #[test]
    fn test_fix_json_malformed_plan_is_error_sentinel() {
        let exec = executor(MemoryStore::new());
        let rep = DefectReport::from_files(vec![]).to_json().unwrap();
        let result = exec.fix_json("{not json", &rep);
        assert!(result.is_sentinel());
        assert_eq!(result.strategy_used, ERROR_STRATEGY);
        assert_eq!(result.changes_made.len(), 1);
        assert!(!result.is_effective());
    }

    #[test]
    fn test_fix_json_malformed_report_is_error_sentinel() {
        let exec = executor(MemoryStore::new());
        let plan = RepairPlan::new(vec![]).to_json().unwrap();
        let result = exec.fix_json(&plan, r#"{"summary": {}}"#);
        assert_eq!(result.strategy_used, ERROR_STRATEGY);
        assert!(result.changes_made[0].contains("files"));
    }

    #[test]
    fn test_fix_all_json_error_is_single_sentinel() {
        let exec = executor(MemoryStore::new());
        let results = exec.fix_all_json("[]", "{}");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy_used, ERROR_STRATEGY);
    }

    #[test]
    fn test_refine_without_oracle_returns_previous() {
        let exec = executor(MemoryStore::new().with_file("a.py", EVAL_SRC));
        let first = exec
            .execute_task(&task("a.py", 0, REPLACE_EVAL), &report("a.py", vec![make_defect(2)]))
            .unwrap();
        let refined = exec.refine(&first, "also validate input");
        assert_eq!(refined, first);
    }

    #[test]
    fn test_refine_with_oracle() {
        let oracle = ScriptedOracle::new(vec![Proposal::Fixed("revised".to_string())]);
        let exec = FixExecutor::new(MemoryStore::new().with_file("a.py", EVAL_SRC), &oracle, "python");
        let first = exec
            .execute_task(&task("a.py", 0, REPLACE_EVAL), &report("a.py", vec![make_defect(2)]))
            .unwrap();
        let refined = exec.refine(&first, "keep the import sorted");
        assert_eq!(refined.fixed_code, "revised");
        assert_eq!(refined.original_code, EVAL_SRC);
        assert_eq!(refined.strategy_used, format!("{REPLACE_EVAL}_round2"));
        assert_eq!(refined.changes_made.len(), first.changes_made.len() + 1);
        let requests = oracle.requests();
        assert_eq!(requests[0].problem_code, first.fixed_code);
        assert_eq!(requests[0].context_code, EVAL_SRC);
        assert!(requests[0].error_description.contains("keep the import sorted"));
    }
}
