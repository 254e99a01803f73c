//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig, ...)
//! - types/sandbox.rs: Images, commands and limits for sandboxes
//! - types/pool.rs: Worker pool / backpressure
//! - io.rs: Configuration loading
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{BootstrapConfig, Config, Environment, ProtocolConfig, ServerConfig};

// Re-export sandbox types
pub use types::sandbox::{ExerciseConfig, SandboxConfig};

// Re-export pool types
pub use types::pool::{OverflowPolicy, PoolConfig};

// Re-export IO and utilities
pub use io::{apply_env_overrides, load_config, load_config_from_path};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
