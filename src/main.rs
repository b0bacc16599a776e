use std::collections::HashMap;

use anyhow::Result;
use benchharness::cli::Cli;
use benchharness::{logging, orchestrator::Harness};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse_args();
    let environment: HashMap<String, String> = std::env::vars().collect();

    let harness = Harness::new(cli.agents_dir, cli.tasks_dir, cli.runs_dir, environment);

    // Individual pair failures are logged by the harness itself; the
    // process exits 0 regardless.
    match (cli.agent, cli.task) {
        (Some(agent), Some(task)) => {
            if let Err(e) = harness.run_one(&agent, &task).await {
                tracing::error!(error = %e, "run failed");
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            anyhow::bail!("--agent and --task must both be provided to run a single pair");
        }
        (None, None) => harness.run().await?,
    }

    Ok(())
}
