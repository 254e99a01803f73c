//! Worker pool configuration types

use serde::{Deserialize, Serialize};

/// What to do with a submission when every worker slot is busy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Answer `exercise_rejected` immediately
    Reject,
    /// Queue FIFO and acknowledge once a slot frees up
    #[default]
    Delay,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(OverflowPolicy::Reject),
            "delay" | "queue" => Ok(OverflowPolicy::Delay),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid overflow policy: {}. Valid: reject, delay",
                s
            ))),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrently live sandboxes (`None` = unbounded)
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// Overflow behaviour
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Maximum waiting submissions under `Delay`
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_concurrent: None,
            overflow: OverflowPolicy::default(),
            max_queued: default_max_queued(),
        }
    }
}

fn default_max_queued() -> usize {
    256
}
