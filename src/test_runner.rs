use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::container::ContainerHandle;
use crate::error::HarnessError;
use crate::model::{TaskConfig, TestResult};

const EVAL_RECIPES_TEST_ID: &str = "EVAL_RECIPES_TEST_ID";

/// Copies the task's test script (and optional pre-step) into `/project`,
/// runs the optional pre-step non-fatally, runs the test under a fresh
/// `test_id`, and parses whatever scorecard it produced — synthesizing a
/// zeroed one if the file is missing or unparseable.
pub async fn run(
    container: &ContainerHandle,
    task: &TaskConfig,
    run_dir: &Path,
) -> Result<TestResult> {
    let test_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(test_id = %test_id, task = %task.name, "running test");

    let test_script_bytes = tokio::fs::read(&task.test_script)
        .await
        .with_context(|| format!("failed to read test script {}", task.test_script.display()))?;

    let mut files = HashMap::new();
    files.insert("test.py".to_string(), test_script_bytes);
    let mut executable = Vec::new();

    if let Some(pre_step) = &task.test_commands_script {
        let bytes = tokio::fs::read(pre_step)
            .await
            .with_context(|| format!("failed to read pre-test script {}", pre_step.display()))?;
        files.insert("test_commands.sh".to_string(), bytes);
        executable.push("test_commands.sh");
    }

    container
        .inject_files(&files, "/project", &executable)
        .await
        .context("failed to inject test files")?;

    if task.test_commands_script.is_some() {
        match container
            .exec(
                vec!["bash".to_string(), "/project/test_commands.sh".to_string()],
                run_dir,
                "test_install_output.log",
                None,
                Some("/project"),
            )
            .await
        {
            Ok(result) if result.exit_code != 0 => {
                tracing::warn!(
                    exit_code = result.exit_code,
                    "pre-test commands script exited non-zero; continuing anyway"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "pre-test commands script failed to run; continuing anyway");
            }
            Ok(_) => {}
        }
        tracing::info!(path = %run_dir.join("test_install_output.log").display(), "pre-test output saved");
    }

    let mut test_env = HashMap::new();
    test_env.insert(EVAL_RECIPES_TEST_ID.to_string(), test_id.clone());

    let exec_result = container
        .exec(
            vec![
                "uv".to_string(),
                "run".to_string(),
                "--no-project".to_string(),
                "/project/test.py".to_string(),
            ],
            run_dir,
            "test_output.log",
            Some(test_env),
            None,
        )
        .await
        .context("failed to run test script")?;
    tracing::info!(path = %run_dir.join("test_output.log").display(), "test output saved");

    let scorecard_path = format!("/project/.eval_recipes_test_results_{test_id}.json");
    let raw = container
        .read_file(&scorecard_path)
        .await
        .context("failed to read scorecard from container")?;

    let result_data = match raw.as_deref().map(serde_json::from_slice::<serde_json::Value>) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            let err = HarnessError::ScorecardInvalid {
                path: scorecard_path.clone(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "synthesizing zeroed result");
            synthesized_scorecard()
        }
        None => {
            let err = HarnessError::ScorecardMissing(scorecard_path.clone());
            tracing::warn!(error = %err, "synthesizing zeroed result");
            synthesized_scorecard()
        }
    };

    // Persist the scorecard exactly as produced (or synthesized); an
    // out-of-range score is written verbatim here and only clamped on the
    // `TestResult` this function returns.
    let results_path = run_dir.join("test_results.json");
    tokio::fs::write(&results_path, serde_json::to_vec_pretty(&result_data)?)
        .await
        .with_context(|| format!("failed to persist {}", results_path.display()))?;

    let score = clamp_score(result_data.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0));
    let metadata = result_data
        .get("metadata")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    tracing::info!(score, ?metadata, "test score");

    Ok(TestResult {
        score,
        metadata,
        test_output: exec_result.output,
    })
}

fn synthesized_scorecard() -> serde_json::Value {
    json!({ "score": 0, "metadata": { "error": "No results file found" } })
}

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}
