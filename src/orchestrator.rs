use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config;
use crate::container::{ContainerHandle, ContainerManager};
use crate::env_gate::{self, EnvGateResult};
use crate::error::HarnessError;
use crate::image;
use crate::model::{AgentConfig, TaskConfig};
use crate::persistence;
use crate::template;
use crate::test_runner;

/// Sequential (agents × tasks) runner. One instance per harness invocation.
pub struct Harness {
    agents_dir: PathBuf,
    tasks_dir: PathBuf,
    runs_dir: PathBuf,
    environment: HashMap<String, String>,
}

/// Per-pair state, recorded as `run_pair` advances through it and emitted to
/// the run log on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Pending,
    EnvBlocked,
    ImageBuilding,
    ContainerUp,
    AgentRunning,
    TestRunning,
    Terminal,
}

fn advance(state: &mut PairState, next: PairState, agent: &str, task: &str) {
    tracing::debug!(agent, task, from = ?*state, to = ?next, "pair state transition");
    *state = next;
}

impl Harness {
    pub fn new(
        agents_dir: PathBuf,
        tasks_dir: PathBuf,
        runs_dir: PathBuf,
        environment: HashMap<String, String>,
    ) -> Self {
        Self {
            agents_dir,
            tasks_dir,
            runs_dir,
            environment,
        }
    }

    /// Runs every (agent, task) pair to completion, logging and skipping any
    /// pair that fails at any stage — no pair's failure aborts the harness,
    /// which always returns success overall.
    pub async fn run(&self) -> Result<()> {
        let agents = config::load_agents(&self.agents_dir);
        let tasks = config::load_tasks(&self.tasks_dir);
        tracing::info!(agents = agents.len(), tasks = tasks.len(), "loaded config");

        let run_root = persistence::prepare_run_root(&self.runs_dir)?;
        let container_manager = ContainerManager::connect().context("failed to connect to Docker")?;

        for agent in &agents {
            for task in &tasks {
                tracing::info!(agent = %agent.name, task = %task.name, "running pair");
                if let Err(e) = self
                    .run_pair(&container_manager, &run_root, agent, task)
                    .await
                {
                    tracing::error!(agent = %agent.name, task = %task.name, error = %e, "pair failed");
                }
            }
        }

        Ok(())
    }

    /// Filters to a single (agent, task) pair by name, for focused re-runs.
    pub async fn run_one(&self, agent_name: &str, task_name: &str) -> Result<()> {
        let agents: Vec<AgentConfig> = config::load_agents(&self.agents_dir)
            .into_iter()
            .filter(|a| a.name == agent_name)
            .collect();
        let tasks: Vec<TaskConfig> = config::load_tasks(&self.tasks_dir)
            .into_iter()
            .filter(|t| t.name == task_name)
            .collect();

        let (Some(agent), Some(task)) = (agents.into_iter().next(), tasks.into_iter().next()) else {
            anyhow::bail!("agent '{agent_name}' or task '{task_name}' not found");
        };

        let run_root = persistence::prepare_run_root(&self.runs_dir)?;
        let container_manager = ContainerManager::connect().context("failed to connect to Docker")?;
        self.run_pair(&container_manager, &run_root, &agent, &task).await
    }

    async fn run_pair(
        &self,
        container_manager: &ContainerManager,
        run_root: &Path,
        agent: &AgentConfig,
        task: &TaskConfig,
    ) -> Result<()> {
        let run_dir = persistence::prepare_pair_dir(run_root, &agent.name, &task.name)?;
        let mut state = PairState::Pending;

        let container_env = match env_gate::check(agent, task, &self.environment) {
            EnvGateResult::Ready(env) => env,
            EnvGateResult::Blocked(missing) => {
                advance(&mut state, PairState::EnvBlocked, &agent.name, &task.name);
                advance(&mut state, PairState::Terminal, &agent.name, &task.name);
                tracing::error!(
                    agent = %agent.name,
                    task = %task.name,
                    ?missing,
                    "missing required environment variables"
                );
                return Err(HarnessError::EnvMissing {
                    agent: agent.name.clone(),
                    task: task.name.clone(),
                    missing,
                }
                .into());
            }
        };

        advance(&mut state, PairState::ImageBuilding, &agent.name, &task.name);
        let image_tag = image::image_tag_for(&agent.name, &task.name);
        let dockerfile = image::render_dockerfile(agent, task);
        image::build_image(&container_manager.client(), &dockerfile, &image_tag).await?;
        tracing::info!(image = %image_tag, "built image");

        let handle = container_manager
            .create_and_start(&image_tag, &container_env)
            .await?;
        advance(&mut state, PairState::ContainerUp, &agent.name, &task.name);
        let guard = PairGuard::new(handle, image_tag);

        let body_result = self
            .run_pair_body(guard.handle(), &run_dir, agent, task, &mut state)
            .await;
        guard.teardown().await;
        advance(&mut state, PairState::Terminal, &agent.name, &task.name);
        body_result
    }

    async fn run_pair_body(
        &self,
        handle: &ContainerHandle,
        run_dir: &Path,
        agent: &AgentConfig,
        task: &TaskConfig,
        state: &mut PairState,
    ) -> Result<()> {
        advance(state, PairState::AgentRunning, &agent.name, &task.name);
        let command = template::render(
            &agent.command_template,
            &[("task_instructions", task.instructions.as_str())],
        );
        tracing::info!(command = %command, "executing agent command");

        handle
            .exec(
                vec!["bash".to_string(), "-c".to_string(), command],
                run_dir,
                "agent_output.log",
                None,
                None,
            )
            .await
            .context("agent exec failed")?;
        tracing::info!(path = %run_dir.join("agent_output.log").display(), "agent output saved");

        advance(state, PairState::TestRunning, &agent.name, &task.name);
        test_runner::run(handle, task, run_dir).await?;
        Ok(())
    }
}

/// Holds the container handle for the body of a pair and guarantees
/// `destroy` runs on every exit path the body takes, success or error. Not
/// `Drop`-based — cleanup is async I/O and can't ride along with a
/// synchronous destructor, so `teardown` must be awaited explicitly.
struct PairGuard {
    handle: ContainerHandle,
    image_tag: String,
}

impl PairGuard {
    fn new(handle: ContainerHandle, image_tag: String) -> Self {
        Self { handle, image_tag }
    }

    fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    async fn teardown(self) {
        if let Err(e) = self.handle.destroy(&self.image_tag).await {
            tracing::warn!(image = %self.image_tag, error = %e, "teardown failed");
        }
    }
}
