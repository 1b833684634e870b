use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Plan and apply automated fixes for detected code defects
#[derive(Parser, Debug, Clone)]
#[command(name = "remedy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: remedy.toml, if present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Language tag sent to the repair oracle (default: python)
    #[arg(long, global = true)]
    pub language: Option<String>,

    /// Model for the repair oracle
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Maximum attempts per oracle consultation
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: Option<u32>,

    /// Oracle request timeout in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Build a priority-ordered repair plan from defect observations
    Plan {
        /// JSON array of defect observations
        observations: PathBuf,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a repair plan against a defect report
    Fix {
        /// Repair plan JSON
        #[arg(long)]
        plan: PathBuf,

        /// Defect report JSON
        #[arg(long)]
        report: PathBuf,

        /// Return every result plus metrics instead of only the first result
        #[arg(long)]
        all: bool,

        /// Write fixed code back to the source files
        #[arg(long)]
        apply: bool,

        /// Directory that file paths in the plan are relative to
        #[arg(long)]
        root: Option<PathBuf>,

        /// Write the result JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Revise a previous fix result using feedback
    Refine {
        /// Fix result JSON from a previous run
        result: PathBuf,

        /// Feedback on the previous fix
        #[arg(long)]
        feedback: String,

        /// Maximum refinement rounds (default: max_rounds from config)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        rounds: Option<u32>,

        /// Write the refined result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
