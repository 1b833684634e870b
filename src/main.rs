use std::collections::HashSet;
use std::path::Path;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use remedy::cli::{Cli, CliCommand};
use remedy::config::Config;
use remedy::defect::DefectReport;
use remedy::error::{Error, Result};
use remedy::fix::FixExecutor;
use remedy::metrics::{FixMetrics, defect_reduction};
use remedy::oracle::HttpOracle;
use remedy::plan::PlanBuilder;
use remedy::refine::Refinement;
use remedy::result::FixResult;
use remedy::store::{FsStore, TextStore};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

fn emit(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
            info!(path = %path.display(), "output written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_plan(config: &Config, observations: &Path, output: Option<&Path>) -> Result<()> {
    let content = read_input(observations)?;
    let plan = PlanBuilder::new(config.planner_rules()).build_from_json(&content)?;
    match output {
        Some(path) => plan.save(path),
        None => emit(&plan.to_json()?, None),
    }
}

/// Write effective results back through `store`.
///
/// Each `fixed_code` is built from the unmodified file, so only the first
/// effective result per file is written; later ones would erase it.
fn apply_results(store: &FsStore, results: &[FixResult]) -> Result<()> {
    let mut written: HashSet<&str> = HashSet::new();
    for result in results {
        if result.is_sentinel() || !result.is_effective() {
            continue;
        }
        if !written.insert(result.file_path.as_str()) {
            warn!(
                file = %result.file_path,
                strategy = %result.strategy_used,
                "file already rewritten by an earlier fix, not applying this one"
            );
            continue;
        }
        store.write(&result.file_path, &result.fixed_code)?;
        info!(file = %result.file_path, strategy = %result.strategy_used, "applied fix");
    }
    Ok(())
}

struct FixArgs<'a> {
    plan: &'a Path,
    report: &'a Path,
    all: bool,
    apply: bool,
    root: Option<&'a Path>,
    output: Option<&'a Path>,
}

fn run_fix(config: &Config, args: FixArgs<'_>) -> Result<()> {
    let plan_json = read_input(args.plan)?;
    let report_json = read_input(args.report)?;

    let store = match args.root {
        Some(root) => FsStore::with_root(root),
        None => FsStore::new(),
    };
    let executor = FixExecutor::new(store, HttpOracle::from_config(config), config.language.clone())
        .with_registry(config.registry());

    if args.all {
        let results = executor.fix_all_json(&plan_json, &report_json);
        if args.apply {
            apply_results(executor.store(), &results)?;
        }

        let metrics = FixMetrics::from_results(&results);
        let original = DefectReport::from_json(&report_json)
            .map(|r| r.total_defects())
            .unwrap_or(0);
        let remaining = original.saturating_sub(FixMetrics::resolved(&results));
        let reduction = defect_reduction(original, remaining);
        info!(
            results = metrics.total_results,
            success_rate = metrics.success_rate,
            average_confidence = metrics.average_confidence,
            defect_reduction = reduction,
            "fix metrics"
        );

        let body = serde_json::json!({
            "results": results,
            "metrics": metrics,
            "defect_reduction": reduction,
        });
        emit(&serde_json::to_string_pretty(&body)?, args.output)
    } else {
        let result = executor.fix_json(&plan_json, &report_json);
        if args.apply {
            apply_results(executor.store(), std::slice::from_ref(&result))?;
        }
        emit(&result.to_json()?, args.output)
    }
}

fn run_refine(config: &Config, result: &Path, feedback: &str, output: Option<&Path>) -> Result<()> {
    let previous = FixResult::from_json(&read_input(result)?)?;
    let executor = FixExecutor::new(
        FsStore::new(),
        HttpOracle::from_config(config),
        config.language.clone(),
    );

    let mut refinement = Refinement::new(previous, config.max_rounds);
    while !refinement.state().is_terminal() {
        let state = refinement.advance(|prev| executor.refine_round(prev, feedback));
        debug!(?state, "refinement round finished");
    }
    let state = refinement.state();
    if state.rounds() == 0 {
        warn!("no refinement round succeeded, returning the previous result");
    } else {
        info!(rounds = state.rounds(), ?state, "refinement finished");
    }

    emit(&refinement.into_result().to_json()?, output)
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        CliCommand::Plan {
            observations,
            output,
        } => run_plan(config, observations, output.as_deref()),
        CliCommand::Fix {
            plan,
            report,
            all,
            apply,
            root,
            output,
        } => run_fix(
            config,
            FixArgs {
                plan,
                report,
                all: *all,
                apply: *apply,
                root: root.as_deref(),
                output: output.as_deref(),
            },
        ),
        CliCommand::Refine {
            result,
            feedback,
            output,
            ..
        } => run_refine(config, result, feedback, output.as_deref()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    debug!(?config, "config loaded");

    if let Err(e) = run(&cli, &config) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
