use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::RemoveImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::HarnessError;

/// Thin wrapper over a `bollard::Docker` client; one per harness process.
#[derive(Clone)]
pub struct ContainerManager {
    docker: Docker,
}

/// Bytes for one exec, already written to `<run_dir>/<log_filename>`.
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

impl ContainerManager {
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Hands out a cheap clone of the underlying client for callers (the
    /// image builder) that need to talk to the same daemon connection.
    pub fn client(&self) -> Docker {
        self.docker.clone()
    }

    /// Creates and starts a detached container from `image_tag`, with only
    /// `container_env` injected (never the harness's full process
    /// environment), a TTY-like attached channel, and stdin open so a later
    /// `exec` behaves like an interactive agent session.
    pub async fn create_and_start(
        &self,
        image_tag: &str,
        container_env: &HashMap<String, String>,
    ) -> Result<ContainerHandle> {
        let env: Vec<String> = container_env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config {
            image: Some(image_tag.to_string()),
            cmd: Some(vec!["tail".into(), "-f".into(), "/dev/null".into()]),
            env: Some(env),
            tty: Some(true),
            open_stdin: Some(true),
            working_dir: Some("/project".into()),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| HarnessError::ContainerFailed(e.to_string()))?;

        self.docker
            .start_container(&response.id, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .map_err(|e| HarnessError::ContainerFailed(e.to_string()))?;

        tracing::info!(container_id = %response.id, image = image_tag, "container started");

        Ok(ContainerHandle {
            docker: self.docker.clone(),
            id: response.id,
        })
    }
}

/// One live container. Dropping this does nothing to the container itself —
/// callers must call `destroy` explicitly on every exit path (the async
/// teardown can't ride along with `Drop`).
pub struct ContainerHandle {
    docker: Docker,
    id: String,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Streams an in-memory tar archive of `files` into `dest_path` inside
    /// the container. Entries named in `executable_files` are given mode
    /// `0o755`; everything else gets `0o644`.
    pub async fn inject_files(
        &self,
        files: &HashMap<String, Vec<u8>>,
        dest_path: &str,
        executable_files: &[&str],
    ) -> Result<()> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            let mode = if executable_files.contains(&name.as_str()) {
                0o755
            } else {
                0o644
            };
            header.set_mode(mode);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_slice())
                .with_context(|| format!("failed to add {name} to injection archive"))?;
        }
        let archive = builder.into_inner().context("failed to finalize injection archive")?;

        self.docker
            .upload_to_container(
                &self.id,
                Some(UploadToContainerOptions {
                    path: dest_path.to_string(),
                    ..Default::default()
                }),
                Bytes::from(archive).into(),
            )
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?;

        Ok(())
    }

    /// Runs `command` inside the container, streaming stdout/stderr chunks
    /// to `<run_dir>/<log_filename>` as they arrive (never buffering the
    /// full output before writing, so a multi-hundred-megabyte exec can't
    /// blow up the harness's memory) and also returning the decoded text for
    /// callers that need to inspect it.
    pub async fn exec(
        &self,
        command: Vec<String>,
        run_dir: &Path,
        log_filename: &str,
        env: Option<HashMap<String, String>>,
        workdir: Option<&str>,
    ) -> Result<ExecOutput> {
        let env_vec = env.map(|e| e.into_iter().map(|(k, v)| format!("{k}={v}")).collect());

        let exec = self
            .docker
            .create_exec(
                &self.id,
                CreateExecOptions {
                    cmd: Some(command),
                    env: env_vec,
                    working_dir: workdir.map(str::to_string),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?;

        let log_path = run_dir.join(log_filename);
        let mut log_file = File::create(&log_path)
            .await
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;

        let mut decoded = String::new();

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    let chunk = chunk.map_err(|e| HarnessError::ExecIoError(e.to_string()))?;
                    let bytes = chunk.into_bytes();
                    log_file
                        .write_all(&bytes)
                        .await
                        .context("failed to stream exec output to disk")?;
                    decoded.push_str(&String::from_utf8_lossy(&bytes));
                }
            }
            StartExecResults::Detached => {}
        }
        log_file.flush().await.ok();

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            output: decoded,
        })
    }

    /// `cat`s `path` and returns its bytes, or `None` if the exec's exit
    /// code is non-zero (file absent, or unreadable — either way "not
    /// present" from the caller's point of view).
    pub async fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let exec = self
            .docker
            .create_exec(
                &self.id,
                CreateExecOptions {
                    cmd: Some(vec!["cat".to_string(), path.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?;

        let mut stdout = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?
        {
            while let Some(chunk) = output.next().await {
                let chunk = chunk.map_err(|e| HarnessError::ExecIoError(e.to_string()))?;
                if let bollard::container::LogOutput::StdOut { message } = chunk {
                    stdout.extend_from_slice(&message);
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| HarnessError::ExecIoError(e.to_string()))?;

        if inspect.exit_code.unwrap_or(-1) != 0 {
            return Ok(None);
        }
        Ok(Some(stdout))
    }

    /// Force-removes the container, then removes `image_tag`, tolerating
    /// either half failing so the pair loop can always move on.
    pub async fn destroy(self, image_tag: &str) -> Result<()> {
        if let Err(e) = self
            .docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(container_id = %self.id, error = %e, "failed to remove container");
        }

        if let Err(e) = self
            .docker
            .remove_image(
                image_tag,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
        {
            tracing::warn!(image = image_tag, error = %e, "failed to remove image");
        }

        Ok(())
    }
}
