use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

/// Builds `<runs_root>/<timestamp>` and creates it. Millisecond-precision UTC
/// timestamps keep back-to-back harness invocations from colliding.
pub fn prepare_run_root(runs_root: &Path) -> Result<PathBuf> {
    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S%.3f").to_string();
    // chrono's `%.3f` renders as `.123`; splice it onto the seconds field
    // without the leading dot so the layout matches `HH-MM-SS-mmm`.
    let timestamp = timestamp.replacen('.', "-", 1);
    let run_root = runs_root.join(timestamp);
    std::fs::create_dir_all(&run_root)
        .with_context(|| format!("failed to create run root {}", run_root.display()))?;
    Ok(run_root)
}

/// Builds and creates `<run_root>/<agent>_<task>`, exclusive to one pair.
pub fn prepare_pair_dir(run_root: &Path, agent_name: &str, task_name: &str) -> Result<PathBuf> {
    let dir = run_root.join(format!("{agent_name}_{task_name}"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create run dir {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn run_root_timestamp_has_expected_shape() {
        let root = tempdir().unwrap();
        let run_root = prepare_run_root(root.path()).unwrap();
        assert!(run_root.is_dir());
        let name = run_root.file_name().unwrap().to_str().unwrap();
        // YYYY-MM-DD_HH-MM-SS-mmm
        let parts: Vec<&str> = name.split(['_', '-']).collect();
        assert_eq!(parts.len(), 7, "unexpected timestamp shape: {name}");
    }

    #[test]
    fn pair_dir_is_named_agent_underscore_task() {
        let root = tempdir().unwrap();
        let dir = prepare_pair_dir(root.path(), "claude-code", "git_changelog_generator").unwrap();
        assert_eq!(
            dir.file_name().unwrap().to_str().unwrap(),
            "claude-code_git_changelog_generator"
        );
        assert!(dir.is_dir());
    }
}
