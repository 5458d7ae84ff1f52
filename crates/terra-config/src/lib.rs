//! Configuration for the terra tile scheduler.
//!
//! Settings persist to disk as RON files, validate before a sampling
//! session starts, and accept CLI overrides via clap.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, CoordSystemConfig, DebugConfig, MAX_SUPPORTED_ZOOM, SamplingConfig, ViewConfig,
    ViewKind, default_config_dir,
};
pub use error::ConfigError;
