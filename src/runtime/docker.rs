//! Docker engine runtime
//!
//! Talks to the local Docker daemon through bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use super::{ContainerRuntime, EngineVersion, OutputChunk, OutputStream, SandboxSpec};
use crate::error::{Error, Result};

/// Client-side request timeout for the bollard connection, in seconds
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker runtime
#[derive(Clone)]
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
    /// Grace period given to `stop` before the engine kills the container
    stop_timeout_secs: i64,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket
    pub fn connect(stop_timeout_secs: i64) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Startup(format!("Failed to connect to Docker: {}", e)))?;
        Ok(DockerRuntime {
            docker,
            stop_timeout_secs,
        })
    }

    /// Connect to an explicit unix socket
    pub fn connect_socket(path: &str, stop_timeout_secs: i64) -> Result<Self> {
        let docker =
            Docker::connect_with_socket(path, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    Error::Startup(format!("Failed to connect to Docker at {}: {}", path, e))
                })?;
        Ok(DockerRuntime {
            docker,
            stop_timeout_secs,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<String> {
        Ok(self.docker.ping().await?)
    }

    async fn version(&self) -> Result<EngineVersion> {
        let version = self.docker.version().await?;
        Ok(EngineVersion {
            version: version.version,
            api_version: version.api_version,
            os: version.os,
            arch: version.arch,
        })
    }

    async fn pull(&self, tag: &str) -> Result<()> {
        info!("Pulling Docker image: {}", tag);

        let options = CreateImageOptions {
            from_image: tag.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status for {}: {}", tag, status);
                    }
                }
                Err(e) => {
                    return Err(Error::Container(format!("Failed to pull {}: {}", tag, e)));
                }
            }
        }

        Ok(())
    }

    async fn create(&self, spec: &SandboxSpec) -> Result<()> {
        let labels = HashMap::from([("sointu.sandbox".to_string(), "true".to_string())]);

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            network_disabled: Some(spec.network_disabled),
            attach_stdin: Some(false),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            open_stdin: Some(spec.open_stdin),
            tty: Some(spec.tty),
            labels: Some(labels),
            host_config: Some(bollard::service::HostConfig {
                network_mode: Some("none".to_string()),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::Container(format!("Failed to create {}: {}", spec.name, e)))?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start {}: {}", name, e)))
    }

    async fn attach(&self, name: &str) -> Result<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };

        let attached = self
            .docker
            .attach_container(name, Some(options))
            .await
            .map_err(|e| Error::Container(format!("Failed to attach {}: {}", name, e)))?;

        let output = attached.output.filter_map(|item| async move {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Some(Ok(OutputChunk::Stdout(message.to_vec())))
                }
                Ok(LogOutput::StdErr { message }) => Some(Ok(OutputChunk::Stderr(message.to_vec()))),
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(Error::from(e))),
            }
        });

        Ok(output.boxed())
    }

    async fn wait(&self, name: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(name, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Container(format!("Wait failed for {}: {}", name, e))),
            None => Err(Error::Container(format!("Wait stream for {} ended", name))),
        }
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: self.stop_timeout_secs,
        };
        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            // already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(Error::Container(format!("Failed to stop {}: {}", name, e))),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| Error::Container(format!("Failed to remove {}: {}", name, e)))?;

        debug!("Removed container: {}", name);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let filters = HashMap::from([("name".to_string(), vec![prefix.to_string()])]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        // The name filter is a substring match and names carry a leading '/'
        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| n.starts_with(prefix))
            .collect())
    }
}
