//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set. Otherwise production logs JSON at `info` and
//! development logs human-readable output with debug detail for this crate.

use tracing_subscriber::EnvFilter;

use crate::config::Environment;

const PRODUCTION_FILTER: &str = "info";
const DEVELOPMENT_FILTER: &str = "sointu=debug,tower_http=debug,info";

/// Default filter directives for an environment
pub fn default_filter(environment: Environment) -> &'static str {
    if environment.is_production() {
        PRODUCTION_FILTER
    } else {
        DEVELOPMENT_FILTER
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(environment: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(environment)));

    let result = if environment.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_target(true)
            .with_env_filter(filter)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
