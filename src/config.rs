use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::model::{AgentConfig, TaskConfig, TaskInfo};

#[derive(Debug, Deserialize, Default)]
struct AgentManifest {
    #[serde(default)]
    required_env_vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskManifest {
    #[serde(default)]
    required_env_vars: Vec<String>,
    task_info: Option<TaskInfoManifest>,
}

#[derive(Debug, Deserialize)]
struct TaskInfoManifest {
    difficulty: String,
    #[serde(default)]
    non_deterministic_evals: bool,
}

/// Scans `agents_dir` for subdirectories that carry all three required
/// files; anything incomplete is skipped silently, since not every directory
/// under `agents_dir` need be a real agent. Directories are sorted by name so
/// repeated runs iterate agents in a stable order.
pub fn load_agents(agents_dir: &Path) -> Vec<AgentConfig> {
    let dirs = match sorted_subdirs(agents_dir) {
        Some(dirs) => dirs,
        None => {
            tracing::warn!(?agents_dir, "agents directory does not exist");
            return Vec::new();
        }
    };

    let mut agents = Vec::new();
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let install_file = dir.join("install.dockerfile");
        let command_file = dir.join("command_template.txt");
        let manifest_file = dir.join("agent.yaml");
        if !install_file.is_file() || !command_file.is_file() || !manifest_file.is_file() {
            continue;
        }

        let manifest = match read_yaml::<AgentManifest>(&manifest_file) {
            Some(m) => m,
            None => {
                tracing::warn!(agent = %name, "failed to parse agent.yaml; skipping");
                continue;
            }
        };

        let (Ok(agent_installation), Ok(command_template)) =
            (fs::read_to_string(&install_file), fs::read_to_string(&command_file))
        else {
            tracing::warn!(agent = %name, "failed to read agent files; skipping");
            continue;
        };

        agents.push(AgentConfig {
            name,
            required_env_vars: manifest.required_env_vars,
            agent_installation,
            command_template,
        });
    }

    agents
}

/// Scans `tasks_dir`. A task directory is skipped (with a warning, since a
/// missing `task.yaml` is more likely an authoring mistake than an
/// intentionally non-task directory) if it lacks `task_info` in its
/// manifest.
pub fn load_tasks(tasks_dir: &Path) -> Vec<TaskConfig> {
    let dirs = match sorted_subdirs(tasks_dir) {
        Some(dirs) => dirs,
        None => {
            tracing::warn!(?tasks_dir, "tasks directory does not exist");
            return Vec::new();
        }
    };

    let mut tasks = Vec::new();
    for dir in dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let manifest_file = dir.join("task.yaml");
        let setup_file = dir.join("setup.dockerfile");
        let instructions_file = dir.join("instructions.txt");
        let test_script = dir.join("test.py");
        if !manifest_file.is_file() || !instructions_file.is_file() || !test_script.is_file() {
            continue;
        }

        let manifest = match read_yaml::<TaskManifest>(&manifest_file) {
            Some(m) => m,
            None => {
                tracing::warn!(task = %name, "failed to parse task.yaml; skipping");
                continue;
            }
        };

        let Some(task_info_manifest) = manifest.task_info else {
            tracing::warn!(task = %name, "task.yaml is missing task_info; skipping");
            continue;
        };

        let Ok(instructions) = fs::read_to_string(&instructions_file) else {
            tracing::warn!(task = %name, "failed to read task files; skipping");
            continue;
        };

        let task_installation = if setup_file.is_file() {
            match fs::read_to_string(&setup_file) {
                Ok(s) => s,
                Err(_) => {
                    tracing::warn!(task = %name, "failed to read setup.dockerfile; skipping");
                    continue;
                }
            }
        } else {
            String::new()
        };

        let test_commands_script = dir.join("test_commands.sh");
        let test_commands_script = test_commands_script.is_file().then_some(test_commands_script);

        tasks.push(TaskConfig {
            name,
            required_env_vars: manifest.required_env_vars,
            task_installation,
            instructions,
            test_script,
            test_commands_script,
            task_info: TaskInfo {
                difficulty: task_info_manifest.difficulty,
                non_deterministic_evals: task_info_manifest.non_deterministic_evals,
            },
        });
    }

    tasks
}

fn sorted_subdirs(dir: &Path) -> Option<Vec<std::path::PathBuf>> {
    let entries = fs::read_dir(dir).ok()?;
    let mut dirs: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Some(dirs)
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_well_formed_agent() {
        let root = tempdir().unwrap();
        let dir = root.path().join("claude");
        write(&dir.join("agent.yaml"), "required_env_vars:\n  - ANTHROPIC_API_KEY\n");
        write(&dir.join("install.dockerfile"), "RUN npm install -g claude\n");
        write(&dir.join("command_template.txt"), "claude --print {{task_instructions}}\n");

        let agents = load_agents(root.path());
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "claude");
        assert_eq!(agents[0].required_env_vars, vec!["ANTHROPIC_API_KEY".to_string()]);
    }

    #[test]
    fn skips_agent_directory_missing_a_required_file() {
        let root = tempdir().unwrap();
        let dir = root.path().join("incomplete");
        write(&dir.join("agent.yaml"), "required_env_vars: []\n");
        // no install.dockerfile or command_template.txt

        let agents = load_agents(root.path());
        assert!(agents.is_empty());
    }

    #[test]
    fn skips_task_missing_task_info() {
        let root = tempdir().unwrap();
        let dir = root.path().join("t1");
        write(&dir.join("task.yaml"), "required_env_vars: []\n");
        write(&dir.join("instructions.txt"), "do the thing\n");
        write(&dir.join("test.py"), "print('ok')\n");

        let tasks = load_tasks(root.path());
        assert!(tasks.is_empty());
    }

    #[test]
    fn loads_task_with_optional_pre_step() {
        let root = tempdir().unwrap();
        let dir = root.path().join("t2");
        write(
            &dir.join("task.yaml"),
            "required_env_vars:\n  - OPENAI_API_KEY\ntask_info:\n  difficulty: easy\n  non_deterministic_evals: false\n",
        );
        write(&dir.join("setup.dockerfile"), "RUN true\n");
        write(&dir.join("instructions.txt"), "do the thing\n");
        write(&dir.join("test.py"), "print('ok')\n");
        write(&dir.join("test_commands.sh"), "#!/bin/bash\necho setup\n");

        let tasks = load_tasks(root.path());
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].test_commands_script.is_some());
        assert_eq!(tasks[0].task_info.difficulty, "easy");
    }

    #[test]
    fn task_without_setup_dockerfile_gets_empty_installation() {
        let root = tempdir().unwrap();
        let dir = root.path().join("t3");
        write(
            &dir.join("task.yaml"),
            "required_env_vars: []\ntask_info:\n  difficulty: hard\n  non_deterministic_evals: true\n",
        );
        write(&dir.join("instructions.txt"), "do the thing\n");
        write(&dir.join("test.py"), "print('ok')\n");

        let tasks = load_tasks(root.path());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_installation, "");
        assert!(tasks[0].test_commands_script.is_none());
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let tasks = load_tasks(Path::new("/nonexistent/path/for/sure"));
        assert!(tasks.is_empty());
    }
}
