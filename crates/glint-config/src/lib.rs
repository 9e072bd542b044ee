//! Configuration for the lens flare tools.
//!
//! Settings persist to disk as `config.ron`, every section falls back to its
//! defaults when missing, and command-line flags override what was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, OcclusionConfig, OutputConfig, PreviewConfig, StyleConfig,
    default_config_dir,
};
pub use error::ConfigError;
