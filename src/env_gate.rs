use std::collections::{BTreeSet, HashMap};

use crate::model::{AgentConfig, TaskConfig};

/// Outcome of checking a pair's environment requirements against what the
/// harness process was actually started with.
pub enum EnvGateResult {
    /// All required vars are present; here is the subset to hand the container.
    Ready(HashMap<String, String>),
    /// At least one required var is absent from the process environment.
    Blocked(Vec<String>),
}

/// `required = agent.required_env_vars ∪ task.required_env_vars`. If every
/// name in `required` is a key of `environment`, returns the subset mapping
/// to pass to the container — never the full process environment. Otherwise
/// returns the sorted list of missing names.
pub fn check(
    agent: &AgentConfig,
    task: &TaskConfig,
    environment: &HashMap<String, String>,
) -> EnvGateResult {
    let required: BTreeSet<&str> = agent
        .required_env_vars
        .iter()
        .chain(task.required_env_vars.iter())
        .map(String::as_str)
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|name| !environment.contains_key(**name))
        .map(|name| name.to_string())
        .collect();

    if !missing.is_empty() {
        return EnvGateResult::Blocked(missing);
    }

    let container_env = required
        .into_iter()
        .map(|name| (name.to_string(), environment[name].clone()))
        .collect();
    EnvGateResult::Ready(container_env)
}
