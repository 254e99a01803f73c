//! Configuration I/O - Loading configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (explicit path, `SOINTU_CONFIG`, or the default location) if it exists, otherwise defaults
/// 2. Environment variable overrides
///
/// `.env` is loaded before anything is read, so it can also name the config file.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    dotenvy::dotenv().ok();
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load configuration, resolving paths and overrides from `var`
pub(crate) fn load_config_with(
    path: Option<&Path>,
    var: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut config = match path {
        // An explicitly requested file must exist
        Some(path) => load_config_from_path(path)?,
        None => {
            let default_path = super::paths::config_path_with(&var);
            if default_path.exists() {
                load_config_from_path(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    // Apply environment variable overrides (highest precedence)
    apply_overrides(&mut config, var);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try TOML first, then JSON5
        toml::from_str(&content)
            .map_err(|e| Error::Config(e.to_string()))
            .or_else(|_| json5::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set variables.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable source
pub(crate) fn apply_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    // Environment: SOINTU_ENV wins, NODE_ENV kept for existing deployments
    if let Some(env) = var("SOINTU_ENV").or_else(|| var("NODE_ENV")) {
        match env.parse() {
            Ok(env) => config.environment = env,
            Err(e) => warn!("Ignoring environment override: {}", e),
        }
    }

    // Server overrides
    if let Some(port) = var("PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!("Ignoring invalid PORT: {}", port),
        }
    }
    if let Some(bind) = var("SOINTU_BIND") {
        config.server.bind = bind;
    }

    // Sandbox overrides
    if let Some(timeout) = var("SOINTU_EXECUTION_TIMEOUT") {
        match humantime_serde::re::humantime::parse_duration(&timeout) {
            Ok(d) if d == Duration::ZERO => config.sandbox.execution_timeout = None,
            Ok(d) => config.sandbox.execution_timeout = Some(d),
            Err(e) => warn!("Ignoring invalid SOINTU_EXECUTION_TIMEOUT: {}", e),
        }
    }
    if let Some(socket) = var("DOCKER_SOCKET") {
        config.sandbox.docker_socket = Some(socket);
    }

    // Pool overrides
    if let Some(max) = var("SOINTU_MAX_CONCURRENT") {
        match max.parse::<usize>() {
            Ok(0) => config.pool.max_concurrent = None,
            Ok(n) => config.pool.max_concurrent = Some(n),
            Err(_) => warn!("Ignoring invalid SOINTU_MAX_CONCURRENT: {}", max),
        }
    }
    if let Some(policy) = var("SOINTU_OVERFLOW") {
        match policy.parse() {
            Ok(policy) => config.pool.overflow = policy,
            Err(e) => warn!("Ignoring overflow override: {}", e),
        }
    }

    // Protocol overrides
    if let Some(v) = var("SOINTU_EMIT_COMPLETION") {
        config.protocol.emit_completion_event = v == "true" || v == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, OverflowPolicy};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
environment = "production"

[server]
port = 9000

[sandbox]
execution_timeout = "45s"

[[sandbox.exercises]]
id = 3
command = ["python", "-V"]

[pool]
max_concurrent = 4
overflow = "reject"
"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sandbox.execution_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.sandbox.plan_for(3).command, vec!["python", "-V"]);
        assert_eq!(config.pool.max_concurrent, Some(4));
        assert_eq!(config.pool.overflow, OverflowPolicy::Reject);
    }

    #[test]
    fn test_load_json5_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ server: { port: 7000 }, /* comment */ }").unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            vars(&[
                ("PORT", "3000"),
                ("NODE_ENV", "production"),
                ("SOINTU_MAX_CONCURRENT", "2"),
                ("SOINTU_EXECUTION_TIMEOUT", "1m"),
                ("SOINTU_EMIT_COMPLETION", "true"),
            ]),
        );

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.pool.max_concurrent, Some(2));
        assert_eq!(config.sandbox.execution_timeout, Some(Duration::from_secs(60)));
        assert!(config.protocol.emit_completion_event);
    }

    #[test]
    fn test_sointu_env_wins_over_node_env() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            vars(&[("SOINTU_ENV", "development"), ("NODE_ENV", "production")]),
        );
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_env_file_can_name_config_file() {
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("service.toml");
        std::fs::write(&config_file, "[server]\nport = 9100\n").unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(
            &env_file,
            format!("SOINTU_CONFIG={}\nSOINTU_EMIT_COMPLETION=1\n", config_file.display()),
        )
        .unwrap();

        let entries: HashMap<String, String> = dotenvy::from_path_iter(&env_file)
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        let config = load_config_with(None, |key| entries.get(key).cloned()).unwrap();

        assert_eq!(config.server.port, 9100);
        assert!(config.protocol.emit_completion_event);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        apply_overrides(&mut config, vars(&[("PORT", "eighty"), ("SOINTU_OVERFLOW", "drop")]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pool.overflow, OverflowPolicy::Delay);
    }
}
