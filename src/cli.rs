use clap::Parser;
use std::path::PathBuf;

/// Runs each agent against each task and scores the outcome. Argument
/// parsing itself is thin wiring over the orchestration engine; the
/// interesting behavior lives in `orchestrator::Harness`.
#[derive(Parser)]
#[command(name = "benchharness")]
#[command(about = "Benchmark harness for AI coding agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[arg(long, value_name = "DIR", help = "Directory of agent definitions")]
    pub agents_dir: PathBuf,

    #[arg(long, value_name = "DIR", help = "Directory of task definitions")]
    pub tasks_dir: PathBuf,

    #[arg(long, value_name = "DIR", help = "Root directory for timestamped run output")]
    pub runs_dir: PathBuf,

    #[arg(long, value_name = "NAME", help = "Run only this agent")]
    pub agent: Option<String>,

    #[arg(long, value_name = "NAME", help = "Run only this task (requires --agent)")]
    pub task: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
