//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_sandbox_config(config, result);
    result = validate_pool_config(config, result);

    result
}

fn validate_sandbox_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let sandbox = &config.sandbox;

    if sandbox.name_prefix.is_empty() {
        result = result.with_error(
            ValidationIssue::new("sandbox.name_prefix", "Container name prefix is empty")
                .with_suggestion("Use a prefix such as \"sointu-\" so sandboxes can be found and cleaned up"),
        );
    }

    if sandbox.image.is_empty() {
        result = result.with_error(
            ValidationIssue::new("sandbox.image", "No default image specified")
                .with_suggestion("Set sandbox.image to a valid Docker image"),
        );
    }

    if sandbox.command.is_empty() {
        result = result.with_error(ValidationIssue::new(
            "sandbox.command",
            "Default command is empty",
        ));
    }

    for exercise in &sandbox.exercises {
        if exercise.command.as_ref().map_or(false, |c| c.is_empty()) {
            result = result.with_error(ValidationIssue::new(
                format!("sandbox.exercises[{}].command", exercise.id),
                "Command override is empty",
            ));
        }
    }

    if sandbox.execution_timeout.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "sandbox.execution_timeout",
                "No execution timeout; a runaway command keeps its sandbox alive indefinitely",
            )
            .with_suggestion("Set sandbox.execution_timeout, e.g. \"30s\""),
        );
    }

    result
}

fn validate_pool_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    match config.pool.max_concurrent {
        Some(0) => {
            result = result.with_error(
                ValidationIssue::new("pool.max_concurrent", "Capacity of 0 would reject every submission")
                    .with_suggestion("Unset pool.max_concurrent for no limit"),
            );
        }
        None => {
            result = result.with_warning(ValidationIssue::new(
                "pool.max_concurrent",
                "No concurrency limit; every submission starts a sandbox immediately",
            ));
        }
        Some(_) => {}
    }

    result
}
