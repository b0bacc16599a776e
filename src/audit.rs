use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::HarnessError;
use crate::model::SemanticTestResult;
use crate::template;

const AUDIT_SYSTEM_PROMPT: &str = "You are performing a quality and compliance audit of another \
AI agent's deliverables. It is of utmost importance that you remain impartial, critical, and \
objective in your evaluation. You will be provided a set of steps to take to perform the audit \
and a rubric to evaluate against. The agent's work was done within a Docker container, so your \
first goal will be to explore the container according to the provided steps and gather the \
necessary information to complete the audit.";

const AUDIT_PROMPT_TEMPLATE: &str = "\
The agent was asked to do the following:
{{context}}

You will evaluate the agent's work against the following rubric:
{{rubric}}

You should not include any other fields that are not present in the rubric's schema.

Now take the following steps (make a todo list):
{{steps}}

Do not take any actions that are not related to figuring out how to complete the rubric based on \
the steps above. You can take different steps if as you explore it becomes necessary, but you \
must be focused on the rubric provided.

RULES:
- You must NEVER under ANY circumstances change the code or files that were created by the agent. \
You must use its code and outputs as is, changing its output is akin to a teacher changing a \
student's exam answers.
- Your goal is NOT to troubleshoot or debug the agent's work, but to evaluate it as is. If it is \
not working after following the steps and instructions that the agent may have created, move on, \
and evaluate it as is.
- You should not need to get any API keys - they are provided to you as env vars already. \
However, you can install dependencies based on the instructions if needed. If after following \
the instructions whatever you are testing is not working, move on and evaluate as is. DO NOT try \
to fix it.
- If the tool times out or does not complete in the time stated by either the instructions or the \
agent's own comments, that is a failure. Do not keep trying to run or fix things.
- There may be remnants of created files and build artifacts from when the agent previously ran \
or was tested. These file outputs should NOT be considered as part of your evaluation - make sure \
to validate based on what the agent did during your current audit only.
- These rules are ABSOLUTE and NON-NEGOTIABLE.";

const GENERATE_RUBRIC_PROMPT_TEMPLATE: &str = "\
Now make a structured JSON report that addresses the following rubric:
{{rubric}}

You must place the JSON file at the path ./audit_output/rubric.json so that it can be parsed \
later. Make sure the JSON is valid and can be parsed.
IMPORTANT: Under all circumstances, you must follow the rules defined in your system prompt.";

/// The restricted tool surface the sub-agent is allowed during the explore
/// turn: read-only exploration plus a write tool reserved for the report
/// turn, no tools that would let it reach outside `working_dir`.
const ALLOWED_TOOLS: &[&str] = &[
    "Read", "Glob", "Grep", "Bash", "Write", "WebFetch", "WebSearch", "TodoRead", "TodoWrite",
    "Agent",
];

/// Abstracts the two-turn conversation with the model-backed sub-agent so
/// `semantic_test` can be unit tested against a mock instead of a real CLI.
#[async_trait]
pub trait SubAgentBackend: Send + Sync {
    /// Turn 1 ("Explore"): send the audit prompt and let the sub-agent
    /// explore `working_dir` autonomously.
    async fn explore(&self, system_prompt: &str, prompt: &str, working_dir: &Path) -> Result<()>;
    /// Turn 2 ("Report"): instruct the sub-agent to write the rubric JSON.
    async fn generate(&self, system_prompt: &str, prompt: &str, working_dir: &Path) -> Result<()>;
}

/// Default backend: shells out to an agent CLI, mirroring the way
/// `command_template` dispatches an agent under audit, just pointed at the
/// audit prompts instead of task instructions.
pub struct CliSubAgentBackend {
    pub binary: String,
    pub extra_args: Vec<String>,
}

impl CliSubAgentBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: vec![
                "--allowed-tools".to_string(),
                ALLOWED_TOOLS.join(","),
                "--permission-mode".to_string(),
                "acceptEdits".to_string(),
            ],
        }
    }

    async fn turn(&self, system_prompt: &str, prompt: &str, working_dir: &Path) -> Result<()> {
        let status = Command::new(&self.binary)
            .current_dir(working_dir)
            .arg("--append-system-prompt")
            .arg(system_prompt)
            .arg("--print")
            .arg(prompt)
            .args(&self.extra_args)
            .status()
            .await
            .with_context(|| format!("failed to invoke audit sub-agent '{}'", self.binary))?;

        if !status.success() {
            anyhow::bail!("audit sub-agent '{}' exited with {status}", self.binary);
        }
        Ok(())
    }
}

#[async_trait]
impl SubAgentBackend for CliSubAgentBackend {
    async fn explore(&self, system_prompt: &str, prompt: &str, working_dir: &Path) -> Result<()> {
        self.turn(system_prompt, prompt, working_dir).await
    }

    async fn generate(&self, system_prompt: &str, prompt: &str, working_dir: &Path) -> Result<()> {
        self.turn(system_prompt, prompt, working_dir).await
    }
}

/// Drives the two-turn audit protocol and returns the rubric-scored verdict.
/// `rubric` must contain a `score` field.
pub async fn semantic_test(
    backend: &dyn SubAgentBackend,
    steps: &str,
    rubric: &serde_json::Map<String, Value>,
    context: &str,
    working_dir: &Path,
) -> Result<SemanticTestResult> {
    if !rubric.contains_key("score") {
        return Err(HarnessError::InvalidRubric.into());
    }

    let rubric_str = serde_json::to_string_pretty(rubric)?;
    let audit_prompt = template::render(
        AUDIT_PROMPT_TEMPLATE,
        &[("context", context), ("rubric", &rubric_str), ("steps", steps)],
    );
    let generate_prompt = template::render(GENERATE_RUBRIC_PROMPT_TEMPLATE, &[("rubric", &rubric_str)]);

    backend
        .explore(AUDIT_SYSTEM_PROMPT, &audit_prompt, working_dir)
        .await
        .context("audit explore turn failed")?;
    backend
        .generate(AUDIT_SYSTEM_PROMPT, &generate_prompt, working_dir)
        .await
        .context("audit report turn failed")?;

    collect_rubric(working_dir).await
}

fn rubric_path(working_dir: &Path) -> PathBuf {
    working_dir.join("audit_output").join("rubric.json")
}

async fn collect_rubric(working_dir: &Path) -> Result<SemanticTestResult> {
    let path = rubric_path(working_dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(HarnessError::RubricMissing(path).into()),
    };

    let mut rubric_data: serde_json::Map<String, Value> = serde_json::from_slice(&bytes)
        .with_context(|| format!("rubric file at {} is not valid JSON", path.display()))?;

    let score = rubric_data
        .remove("score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);

    Ok(SemanticTestResult {
        score,
        metadata: rubric_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    struct RecordingBackend {
        rubric_to_write: serde_json::Value,
    }

    #[async_trait]
    impl SubAgentBackend for RecordingBackend {
        async fn explore(&self, _system_prompt: &str, prompt: &str, _working_dir: &Path) -> Result<()> {
            assert!(prompt.contains("make a todo list"));
            Ok(())
        }

        async fn generate(&self, _system_prompt: &str, _prompt: &str, working_dir: &Path) -> Result<()> {
            let dir = working_dir.join("audit_output");
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(
                dir.join("rubric.json"),
                serde_json::to_vec(&self.rubric_to_write)?,
            )
            .await?;
            Ok(())
        }
    }

    fn rubric() -> serde_json::Map<String, Value> {
        let mut m = serde_json::Map::new();
        m.insert("score".to_string(), json!(0));
        m.insert("notes".to_string(), json!("what to look for"));
        m
    }

    #[tokio::test]
    async fn rejects_rubric_without_score() {
        let backend = RecordingBackend {
            rubric_to_write: json!({}),
        };
        let dir = tempdir().unwrap();
        let mut bad_rubric = serde_json::Map::new();
        bad_rubric.insert("notes".to_string(), json!("x"));

        let result = semantic_test(&backend, "steps", &bad_rubric, "context", dir.path()).await;
        assert!(matches!(
            result.unwrap_err().downcast::<HarnessError>().unwrap(),
            HarnessError::InvalidRubric
        ));
    }

    #[tokio::test]
    async fn clamps_score_and_strips_it_from_metadata() {
        let backend = RecordingBackend {
            rubric_to_write: json!({"score": 137, "notes": "great work"}),
        };
        let dir = tempdir().unwrap();

        let result = semantic_test(&backend, "steps", &rubric(), "context", dir.path())
            .await
            .unwrap();
        assert_eq!(result.score, 100.0);
        assert_eq!(result.metadata.get("notes").unwrap(), "great work");
        assert!(!result.metadata.contains_key("score"));
    }

    #[tokio::test]
    async fn negative_score_clamps_to_zero() {
        let backend = RecordingBackend {
            rubric_to_write: json!({"score": -5}),
        };
        let dir = tempdir().unwrap();
        let result = semantic_test(&backend, "steps", &rubric(), "context", dir.path())
            .await
            .unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn missing_rubric_file_is_an_error() {
        struct SilentBackend;
        #[async_trait]
        impl SubAgentBackend for SilentBackend {
            async fn explore(&self, _: &str, _: &str, _: &Path) -> Result<()> {
                Ok(())
            }
            async fn generate(&self, _: &str, _: &str, _: &Path) -> Result<()> {
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        let result = semantic_test(&SilentBackend, "steps", &rubric(), "context", dir.path()).await;
        assert!(matches!(
            result.unwrap_err().downcast::<HarnessError>().unwrap(),
            HarnessError::RubricMissing(_)
        ));
    }
}
