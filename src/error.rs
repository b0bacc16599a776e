use std::path::PathBuf;

/// Typed errors for the parts of the harness whose callers need to match on
/// what went wrong rather than just log a message. Everything else still
/// flows through `anyhow::Result` with `.context(...)`.
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("missing required environment variables for {agent}/{task}: {missing:?}")]
    EnvMissing {
        agent: String,
        task: String,
        missing: Vec<String>,
    },

    #[error("failed to build image {image_tag}: {reason}")]
    BuildFailed { image_tag: String, reason: String },

    #[error("failed to create or start container: {0}")]
    ContainerFailed(String),

    #[error("container exec I/O error: {0}")]
    ExecIoError(String),

    #[error("no scorecard file found at {0}")]
    ScorecardMissing(String),

    #[error("scorecard file at {path} could not be parsed: {reason}")]
    ScorecardInvalid { path: String, reason: String },

    #[error("rubric schema must contain a 'score' field")]
    InvalidRubric,

    #[error("sub-agent did not write a rubric file at {0}")]
    RubricMissing(PathBuf),
}
