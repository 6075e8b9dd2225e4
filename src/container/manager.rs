use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig};
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::RelayContainerConfig;
use crate::error::{Error, Result};

// Grace period for batch stops, where no per-container config is in scope.
const STOP_GRACE_SECS: i64 = 5;

/// Handle to the running relay sidecar container.
///
/// Owned exclusively by the harness for the suite's lifetime and threaded
/// into teardown explicitly, so no process-wide container id is needed.
#[derive(Debug, Clone)]
pub struct RelayContainerHandle {
    /// Runtime-assigned container identifier
    pub id: String,
    /// Container name
    pub name: String,
    /// Image reference the container was created from
    pub image: String,
    /// Grace period given to the container on stop
    pub stop_timeout: Duration,
}

impl RelayContainerHandle {
    fn new(id: String, config: &RelayContainerConfig) -> Self {
        Self {
            id,
            name: config.container_name.clone(),
            image: config.image.clone(),
            stop_timeout: config.stop_timeout,
        }
    }
}

/// Handle to a background log-streaming task.
///
/// The caller retains this and must cancel or join it during teardown;
/// otherwise the stream runs until the container stops.
pub struct LogStreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LogStreamHandle {
    /// Cancel the stream and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// Result of stopping one container in a batch stop.
#[derive(Debug)]
pub struct StopOutcome {
    /// Identifier of the container that was stopped
    pub container_id: String,
    /// `Err` carries the runtime's failure message for this container
    pub outcome: std::result::Result<(), String>,
}

/// Manages the relay sidecar container lifecycle
pub struct RelayOrchestrator {
    docker: Docker,
}

impl RelayOrchestrator {
    /// Connect to the local container runtime.
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Pull a container image for the current platform. Idempotent: pulling
    /// an already-present image succeeds.
    pub async fn pull_image(&self, reference: &str) -> Result<()> {
        info!(image = reference, "pulling relay image");

        let options = CreateImageOptions::<String> {
            from_image: reference.to_string(),
            platform: docker_platform(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(|source| Error::ImagePull {
                image: reference.to_string(),
                source,
            })?;
            if let Some(status) = progress.status {
                debug!(image = reference, "{status}");
            }
        }

        info!(image = reference, "image pulled");
        Ok(())
    }

    /// Create and start the relay container.
    ///
    /// The container runs with host networking, the local configuration file
    /// bind-mounted at the relay's expected path, and auto-removal on stop.
    pub async fn run_with_config(
        &self,
        config: &RelayContainerConfig,
    ) -> Result<RelayContainerHandle> {
        let host_config = HostConfig {
            network_mode: Some("host".to_string()),
            binds: Some(vec![config.bind_spec()]),
            auto_remove: Some(true),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: config.container_name.clone(),
                    platform: None,
                }),
                Config {
                    image: Some(config.image.clone()),
                    // Idle until the harness execs relay commands.
                    cmd: Some(vec!["sleep".to_string(), "3600".to_string()]),
                    host_config: Some(host_config),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| Error::ContainerStart {
                name: config.container_name.clone(),
                source,
            })?;

        if let Err(source) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Auto-remove only fires after a run; a created-but-never-started
            // container has to be removed by hand. Best-effort.
            if let Err(e) = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                warn!(container_id = %created.id, "failed to remove unstarted container: {e}");
            }
            return Err(Error::ContainerStart {
                name: config.container_name.clone(),
                source,
            });
        }

        info!(container_id = %created.id, image = %config.image, "relay container started");
        Ok(RelayContainerHandle::new(created.id, config))
    }

    /// Run a command inside the relay container with output attached.
    ///
    /// Fire-and-forget: the exec's output is drained in the background and
    /// not returned to the caller. Use [`Self::read_file`] when output is
    /// needed.
    pub async fn exec(&self, handle: &RelayContainerHandle, argv: Vec<&str>) -> Result<()> {
        let argv_joined = argv.join(" ");
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(argv.iter().map(|s| s.to_string()).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| Error::Exec {
                container_id: handle.id.clone(),
                argv: argv_joined.clone(),
                source,
            })?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|source| Error::Exec {
                container_id: handle.id.clone(),
                argv: argv_joined.clone(),
                source,
            })?;

        if let StartExecResults::Attached { mut output, .. } = started {
            let container_id = handle.id.clone();
            tokio::spawn(async move {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(chunk) => {
                            let bytes = chunk.into_bytes();
                            debug!(%container_id, "[exec] {}", String::from_utf8_lossy(&bytes).trim_end())
                        }
                        Err(e) => {
                            debug!(%container_id, "exec output stream ended: {e}");
                            break;
                        }
                    }
                }
            });
        }

        info!(container_id = %handle.id, argv = %argv_joined, "exec dispatched");
        Ok(())
    }

    /// Read a file from inside the running container.
    pub async fn read_file(&self, handle: &RelayContainerHandle, path: &str) -> Result<String> {
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(vec!["cat".to_string(), path.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|source| Error::Exec {
                container_id: handle.id.clone(),
                argv: format!("cat {path}"),
                source,
            })?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|source| Error::Exec {
                container_id: handle.id.clone(),
                argv: format!("cat {path}"),
                source,
            })?;

        let mut contents = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => contents.extend_from_slice(&message),
                    Ok(LogOutput::StdErr { message }) => {
                        debug!(container_id = %handle.id, "cat stderr: {}", String::from_utf8_lossy(&message))
                    }
                    _ => {}
                }
            }
        }

        Ok(String::from_utf8_lossy(&contents).into_owned())
    }

    /// Follow the container's demultiplexed stdout/stderr into `sink` as a
    /// background task.
    ///
    /// The returned handle must be cancelled or joined during teardown; the
    /// stream otherwise terminates only when the container stops.
    pub fn stream_logs_to_sink<W>(
        &self,
        handle: &RelayContainerHandle,
        mut sink: W,
    ) -> LogStreamHandle
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let docker = self.docker.clone();
        let container_id = handle.id.clone();
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();

        let task = tokio::spawn(async move {
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            };
            let mut stream = docker.logs(&container_id, Some(options));

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!(%container_id, "log stream cancelled");
                        break;
                    }
                    chunk = stream.next() => {
                        let Some(chunk) = chunk else {
                            debug!(%container_id, "log stream ended");
                            break;
                        };
                        match chunk {
                            Ok(output) => {
                                let (label, message) = match output {
                                    LogOutput::StdOut { message } => ("stdout", message),
                                    LogOutput::StdErr { message } => ("stderr", message),
                                    LogOutput::Console { message } => ("console", message),
                                    LogOutput::StdIn { .. } => continue,
                                };
                                let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
                                let line = format!(
                                    "[{timestamp}] [{label}] {}",
                                    String::from_utf8_lossy(&message)
                                );
                                if sink.write_all(line.as_bytes()).await.is_err() {
                                    warn!(%container_id, "log sink closed, stopping stream");
                                    break;
                                }
                                let _ = sink.flush().await;
                            }
                            Err(e) => {
                                warn!(%container_id, "log stream error: {e}");
                                break;
                            }
                        }
                    }
                }
            }
        });

        LogStreamHandle { cancel, task }
    }

    /// Force-stop the relay container, honoring its configured grace period.
    pub async fn stop(&self, handle: &RelayContainerHandle) -> Result<()> {
        self.docker
            .stop_container(
                &handle.id,
                Some(StopContainerOptions {
                    t: handle.stop_timeout.as_secs() as i64,
                }),
            )
            .await?;
        info!(container_id = %handle.id, "stopped relay container");
        Ok(())
    }

    /// Force-stop every running container created from `image`.
    ///
    /// Best-effort per container: individual failures are logged and also
    /// returned in the outcome list so callers can detect partial failure.
    /// Zero matching containers is a success with an empty list.
    pub async fn stop_all_by_image(&self, image: &str) -> Result<Vec<StopOutcome>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        let mut outcomes = Vec::new();
        for id in matching_ids(&containers, image) {
            let outcome = match self
                .docker
                .stop_container(&id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
                .await
            {
                Ok(()) => {
                    info!(container_id = %id, image, "stopped container");
                    Ok(())
                }
                Err(e) => {
                    warn!(container_id = %id, image, "failed to stop container: {e}");
                    Err(e.to_string())
                }
            };
            outcomes.push(StopOutcome {
                container_id: id,
                outcome,
            });
        }

        Ok(outcomes)
    }
}

/// Identifiers of running containers created from `image`.
fn matching_ids(containers: &[ContainerSummary], image: &str) -> Vec<String> {
    containers
        .iter()
        .filter(|c| c.image.as_deref() == Some(image))
        .filter_map(|c| c.id.clone())
        .collect()
}

/// Platform qualifier for image pulls, in the runtime's `os/arch` notation.
fn docker_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}/{arch}", std::env::consts::OS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_uses_runtime_arch_names() {
        let platform = docker_platform();
        let (os, arch) = platform.split_once('/').unwrap();
        assert_eq!(os, std::env::consts::OS);
        assert!(!arch.is_empty());
        assert_ne!(arch, "x86_64");
        assert_ne!(arch, "aarch64");
    }

    #[test]
    fn no_containers_yields_no_matching_ids() {
        assert!(matching_ids(&[], "ghcr.io/acme/relay:latest").is_empty());
    }

    #[test]
    fn foreign_images_yield_no_matching_ids() {
        let containers = vec![
            ContainerSummary {
                id: Some("aaa".to_string()),
                image: Some("postgres:16".to_string()),
                ..Default::default()
            },
            ContainerSummary {
                id: Some("bbb".to_string()),
                image: Some("redis:7".to_string()),
                ..Default::default()
            },
        ];
        assert!(matching_ids(&containers, "ghcr.io/acme/relay:latest").is_empty());
    }

    #[test]
    fn matching_ids_selects_only_the_requested_image() {
        let containers = vec![
            ContainerSummary {
                id: Some("aaa".to_string()),
                image: Some("ghcr.io/acme/relay:latest".to_string()),
                ..Default::default()
            },
            ContainerSummary {
                id: Some("bbb".to_string()),
                image: Some("postgres:16".to_string()),
                ..Default::default()
            },
            // Listed without an id; must be skipped rather than panic.
            ContainerSummary {
                id: None,
                image: Some("ghcr.io/acme/relay:latest".to_string()),
                ..Default::default()
            },
        ];
        assert_eq!(
            matching_ids(&containers, "ghcr.io/acme/relay:latest"),
            vec!["aaa".to_string()]
        );
    }

    #[test]
    fn handle_carries_the_configured_stop_timeout() {
        let config = RelayContainerConfig {
            stop_timeout: Duration::from_secs(12),
            ..RelayContainerConfig::new(
                "ghcr.io/acme/relay:latest".to_string(),
                std::path::PathBuf::from("/tmp/config.yaml"),
            )
        };
        let handle = RelayContainerHandle::new("abc123".to_string(), &config);
        assert_eq!(handle.stop_timeout, Duration::from_secs(12));
        assert_eq!(handle.image, "ghcr.io/acme/relay:latest");
        assert_eq!(handle.name, config.container_name);
    }

    #[test]
    fn stop_outcome_carries_failure_message() {
        let outcome = StopOutcome {
            container_id: "abc123".to_string(),
            outcome: Err("no such container".to_string()),
        };
        assert!(outcome.outcome.is_err());
        assert_eq!(outcome.container_id, "abc123");
    }
}
