//! Sandbox configuration types
//!
//! Which image and command each exercise runs with, and how long it may run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sandbox::{ExecutionPlan, ProvisionerSettings};

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container name prefix; names are `<prefix><submission id>`
    #[serde(default = "default_prefix")]
    pub name_prefix: String,
    /// Image used when an exercise has no override
    #[serde(default = "default_image")]
    pub image: String,
    /// Command used when an exercise has no override
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Per-exercise overrides
    #[serde(default)]
    pub exercises: Vec<ExerciseConfig>,
    /// Images pulled at startup
    #[serde(default = "default_images")]
    pub images: Vec<String>,
    /// Maximum run time per sandbox
    #[serde(default, with = "humantime_serde")]
    pub execution_timeout: Option<Duration>,
    /// Grace period for `stop`
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: i64,
    /// Per-chunk cap on logged output
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Docker socket path (defaults to `DOCKER_HOST` / platform default)
    #[serde(default)]
    pub docker_socket: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            name_prefix: default_prefix(),
            image: default_image(),
            command: default_command(),
            exercises: Vec::new(),
            images: default_images(),
            execution_timeout: None,
            stop_timeout_secs: default_stop_timeout(),
            max_output_bytes: default_max_output(),
            docker_socket: None,
        }
    }
}

fn default_prefix() -> String {
    "sointu-".to_string()
}

fn default_image() -> String {
    "python:3.6.12-alpine3.11".to_string()
}

fn default_command() -> Vec<String> {
    vec!["which".to_string(), "python".to_string()]
}

fn default_images() -> Vec<String> {
    vec![
        "hayd/alpine-deno:1.0.0".to_string(),
        "python:3.6.12-alpine3.11".to_string(),
    ]
}

fn default_stop_timeout() -> i64 {
    10
}

fn default_max_output() -> usize {
    64 * 1024 // 64KB
}

/// Image/command override for one exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    /// Exercise id
    pub id: i64,
    /// Image override
    #[serde(default)]
    pub image: Option<String>,
    /// Command override
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl SandboxConfig {
    /// Resolve the image and command for an exercise
    pub fn plan_for(&self, exercise_id: i64) -> ExecutionPlan {
        let exercise = self.exercises.iter().find(|e| e.id == exercise_id);
        ExecutionPlan {
            image: exercise
                .and_then(|e| e.image.clone())
                .unwrap_or_else(|| self.image.clone()),
            command: exercise
                .and_then(|e| e.command.clone())
                .unwrap_or_else(|| self.command.clone()),
        }
    }

    /// Every image any exercise may run with, deduplicated, in pull order
    pub fn required_images(&self) -> Vec<String> {
        let mut images = self.images.clone();
        let extra = std::iter::once(&self.image)
            .chain(self.exercises.iter().filter_map(|e| e.image.as_ref()));
        for image in extra {
            if !images.contains(image) {
                images.push(image.clone());
            }
        }
        images
    }

    pub fn provisioner_settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            name_prefix: self.name_prefix.clone(),
            execution_timeout: self.execution_timeout,
            max_output_bytes: self.max_output_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let config = SandboxConfig::default();
        assert_eq!(config.name_prefix, "sointu-");
        assert_eq!(config.command, vec!["which", "python"]);
        assert!(config.execution_timeout.is_none());
    }

    #[test]
    fn test_plan_for_uses_overrides() {
        let config = SandboxConfig {
            exercises: vec![ExerciseConfig {
                id: 5,
                image: Some("hayd/alpine-deno:1.0.0".to_string()),
                command: Some(vec!["deno".to_string(), "--version".to_string()]),
            }],
            ..Default::default()
        };

        let plan = config.plan_for(5);
        assert_eq!(plan.image, "hayd/alpine-deno:1.0.0");
        assert_eq!(plan.command, vec!["deno", "--version"]);

        let fallback = config.plan_for(6);
        assert_eq!(fallback.image, "python:3.6.12-alpine3.11");
    }

    #[test]
    fn test_required_images_dedup() {
        let config = SandboxConfig {
            image: "python:3.12-slim".to_string(),
            exercises: vec![ExerciseConfig {
                id: 1,
                image: Some("hayd/alpine-deno:1.0.0".to_string()),
                command: None,
            }],
            ..Default::default()
        };
        assert_eq!(
            config.required_images(),
            vec![
                "hayd/alpine-deno:1.0.0",
                "python:3.6.12-alpine3.11",
                "python:3.12-slim",
            ]
        );
    }

    #[test]
    fn test_execution_timeout_humantime() {
        let config: SandboxConfig = toml::from_str("execution_timeout = \"30s\"").unwrap();
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(30)));
    }
}
