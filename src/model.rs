use serde::Deserialize;
use std::path::PathBuf;

/// One entry under `agents_dir`: how to install the agent's CLI into the
/// image and how to invoke it against a task's instructions.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub required_env_vars: Vec<String>,
    pub agent_installation: String,
    pub command_template: String,
}

/// Difficulty/flake metadata carried alongside a task, surfaced to report
/// consumers but otherwise opaque to the harness.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    pub difficulty: String,
    pub non_deterministic_evals: bool,
}

/// One entry under `tasks_dir`.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: String,
    pub required_env_vars: Vec<String>,
    pub task_installation: String,
    pub instructions: String,
    pub test_script: PathBuf,
    pub test_commands_script: Option<PathBuf>,
    pub task_info: TaskInfo,
}

/// Result of a single deterministic test run, already persisted to
/// `test_results.json` by the time this is returned.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub score: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub test_output: String,
}

/// Result of a single audit sub-agent invocation. `metadata` holds every
/// rubric key except `score`, passed through unchanged.
#[derive(Debug, Clone)]
pub struct SemanticTestResult {
    pub score: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
