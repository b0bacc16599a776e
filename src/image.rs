use anyhow::{Context, Result};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use std::io::Write;

use crate::error::HarnessError;
use crate::model::{AgentConfig, TaskConfig};
use crate::template;

/// Base image template. Only the two placeholders matter to the harness —
/// everything else is Ubuntu with Python and `uv` preinstalled, `/project`
/// as the working area.
const BASE_DOCKERFILE: &str = "\
FROM ubuntu:24.04

RUN apt-get update \\
    && apt-get install -y --no-install-recommends curl ca-certificates python3 \\
    && rm -rf /var/lib/apt/lists/*
RUN curl -LsSf https://astral.sh/uv/install.sh | sh
ENV PATH=\"/root/.local/bin:$PATH\"

WORKDIR /project

{{agent_installation}}

{{task_installation}}
";

/// Substitutes the agent/task install fragments into the base template.
pub fn render_dockerfile(agent: &AgentConfig, task: &TaskConfig) -> String {
    template::render(
        BASE_DOCKERFILE,
        &[
            ("agent_installation", &agent.agent_installation),
            ("task_installation", &task.task_installation),
        ],
    )
}

/// Deterministic, lowercased tag: `benchmark-<agent>-<task>`.
pub fn image_tag_for(agent_name: &str, task_name: &str) -> String {
    format!("benchmark-{agent_name}-{task_name}").to_lowercase()
}

/// Packs the rendered dockerfile into a minimal in-memory tar build context
/// and submits it to the Docker daemon's image-build endpoint.
pub async fn build_image(docker: &Docker, dockerfile: &str, image_tag: &str) -> Result<()> {
    let context = build_context_tar(dockerfile)?;

    let options = BuildImageOptions {
        dockerfile: "Dockerfile",
        t: image_tag,
        rm: true,
        ..Default::default()
    };

    let mut stream = docker.build_image(options, None, Some(Bytes::from(context)));
    let mut last_error: Option<String> = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(info) => {
                if let Some(stream_text) = info.stream {
                    tracing::debug!(image = image_tag, "{}", stream_text.trim_end());
                }
                if let Some(err) = info.error {
                    last_error = Some(err);
                }
            }
            Err(e) => {
                last_error = Some(e.to_string());
            }
        }
    }

    if let Some(reason) = last_error {
        return Err(HarnessError::BuildFailed {
            image_tag: image_tag.to_string(),
            reason,
        }
        .into());
    }

    Ok(())
}

fn build_context_tar(dockerfile: &str) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let bytes = dockerfile.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "Dockerfile", bytes)
        .context("failed to append Dockerfile to build context")?;
    let mut inner = builder.into_inner().context("failed to finalize tar build context")?;
    inner.flush().ok();
    Ok(inner)
}
