//! # Sointu
//!
//! Code exercise submission service.
//!
//! Clients submit exercises over WebSocket; each valid submission is
//! acknowledged and run in a throwaway, network-less Docker container that
//! is always cleaned up afterwards.
//!
//! ## Features
//!
//! - **WebSocket gateway:** event-based protocol with per-session ids
//! - **Sandboxed execution:** one container per submission, named `sointu-<id>`
//! - **Bounded concurrency:** optional worker pool with reject or queue overflow
//! - **Health endpoint:** reflects container engine reachability

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod runtime;
pub mod sandbox;
pub mod submission;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
