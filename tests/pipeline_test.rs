//! End-to-end (non-Docker) exercise of config loading → env gate → image
//! rendering → command templating, the parts of the pipeline that don't
//! need a live daemon.

use std::collections::HashMap;
use std::fs;

use benchharness::{config, env_gate, image, template};
use benchharness::env_gate::EnvGateResult;
use tempfile::tempdir;

fn write(path: &std::path::Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn scaffold_agent_and_task(root: &std::path::Path) {
    let agents_dir = root.join("agents").join("claude-code");
    write(
        &agents_dir.join("agent.yaml"),
        "required_env_vars:\n  - ANTHROPIC_API_KEY\n",
    );
    write(
        &agents_dir.join("install.dockerfile"),
        "RUN npm install -g @anthropic-ai/claude-code\n",
    );
    write(
        &agents_dir.join("command_template.txt"),
        "claude --print \"{{task_instructions}}\"\n",
    );

    let task_dir = root.join("tasks").join("git_changelog_generator");
    write(
        &task_dir.join("task.yaml"),
        "required_env_vars:\n  - OPENAI_API_KEY\ntask_info:\n  difficulty: easy\n  non_deterministic_evals: false\n",
    );
    write(&task_dir.join("setup.dockerfile"), "RUN pip install gitpython\n");
    write(
        &task_dir.join("instructions.txt"),
        "Generate a changelog from recent {{weird}} commits.\n",
    );
    write(&task_dir.join("test.py"), "print('scored')\n");
}

#[test]
fn full_pair_setup_renders_without_docker() {
    let root = tempdir().unwrap();
    scaffold_agent_and_task(root.path());

    let agents = config::load_agents(&root.path().join("agents"));
    let tasks = config::load_tasks(&root.path().join("tasks"));
    assert_eq!(agents.len(), 1);
    assert_eq!(tasks.len(), 1);

    let agent = &agents[0];
    let task = &tasks[0];

    let mut environment = HashMap::new();
    environment.insert("ANTHROPIC_API_KEY".to_string(), "sk-ant-test".to_string());
    environment.insert("OPENAI_API_KEY".to_string(), "sk-oai-test".to_string());
    environment.insert("UNRELATED".to_string(), "should-not-leak".to_string());

    let container_env = match env_gate::check(agent, task, &environment) {
        EnvGateResult::Ready(env) => env,
        EnvGateResult::Blocked(missing) => panic!("unexpectedly blocked on {missing:?}"),
    };
    assert_eq!(container_env.len(), 2);
    assert!(!container_env.contains_key("UNRELATED"));

    let dockerfile = image::render_dockerfile(agent, task);
    assert!(dockerfile.contains("RUN npm install -g @anthropic-ai/claude-code"));
    assert!(dockerfile.contains("RUN pip install gitpython"));

    let tag = image::image_tag_for(&agent.name, &task.name);
    assert_eq!(tag, "benchmark-claude-code-git_changelog_generator");

    // The instructions' own literal braces must survive substitution into
    // the command template untouched, and the instructions text itself
    // must appear verbatim in the rendered command.
    let command = template::render(
        &agent.command_template,
        &[("task_instructions", task.instructions.as_str())],
    );
    assert!(command.contains(&task.instructions));
    assert!(command.contains("{{weird}}"));
}

#[test]
fn pair_blocked_when_required_var_absent() {
    let root = tempdir().unwrap();
    scaffold_agent_and_task(root.path());

    let agents = config::load_agents(&root.path().join("agents"));
    let tasks = config::load_tasks(&root.path().join("tasks"));

    let mut environment = HashMap::new();
    environment.insert("ANTHROPIC_API_KEY".to_string(), "sk-ant-test".to_string());
    // OPENAI_API_KEY intentionally missing.

    match env_gate::check(&agents[0], &tasks[0], &environment) {
        EnvGateResult::Blocked(missing) => assert_eq!(missing, vec!["OPENAI_API_KEY".to_string()]),
        EnvGateResult::Ready(_) => panic!("expected Blocked"),
    }
}
