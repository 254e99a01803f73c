//! Startup checks - run before the server accepts connections
//!
//! The engine must answer a version query and every image a submission may
//! use must be present locally. Either failure is fatal. Sandboxes left over
//! from a previous process are removed before the listener opens.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::runtime::{ContainerRuntime, EngineVersion};

/// Verify the container engine is reachable
pub async fn check_engine(
    runtime: &dyn ContainerRuntime,
    environment: Environment,
) -> Result<EngineVersion> {
    let version = runtime
        .version()
        .await
        .map_err(|e| Error::Startup(format!("Container engine unavailable: {}", e)))?;

    if version.version.is_none() {
        return Err(Error::Startup(
            "Container engine returned no version".to_string(),
        ));
    }

    if !environment.is_production() {
        info!(
            runtime = runtime.name(),
            version = ?version.version,
            api_version = ?version.api_version,
            os = ?version.os,
            arch = ?version.arch,
            "Container engine ready"
        );
    }

    Ok(version)
}

/// Pull every tag concurrently, retrying transient failures until `timeout`
pub async fn ensure_images(
    runtime: &dyn ContainerRuntime,
    tags: &[String],
    timeout: Duration,
) -> Result<()> {
    info!(count = tags.len(), "Pulling sandbox images");

    let pulls = tags.iter().map(|tag| pull_with_retry(runtime, tag, timeout));
    try_join_all(pulls).await?;

    info!("Sandbox images ready");
    Ok(())
}

/// Remove every container whose name starts with `prefix`.
///
/// Returns how many were removed. Individual removal failures are logged.
pub async fn reap_sandboxes(runtime: &dyn ContainerRuntime, prefix: &str) -> Result<usize> {
    let names = runtime
        .list(prefix)
        .await
        .map_err(|e| Error::Startup(format!("Failed to list sandboxes: {}", e)))?;

    let mut removed = 0;
    for name in names {
        match runtime.remove(&name).await {
            Ok(()) => {
                info!("Removed orphaned sandbox {}", name);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove orphaned sandbox {}: {}", name, e),
        }
    }
    Ok(removed)
}

async fn pull_with_retry(runtime: &dyn ContainerRuntime, tag: &str, timeout: Duration) -> Result<()> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(250))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(timeout))
        .build();

    let attempt = backoff::future::retry(policy, move || async move {
        runtime.pull(tag).await.map_err(|e| {
            warn!(image = tag, "Pull failed, retrying: {}", e);
            backoff::Error::transient(e)
        })
    });

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => {
            debug!(image = tag, "Image ready");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::Startup(format!("Failed to pull {}: {}", tag, e))),
        Err(_) => Err(Error::Startup(format!(
            "Timed out pulling {} after {:?}",
            tag, timeout
        ))),
    }
}
