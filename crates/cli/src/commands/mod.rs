//! CLI command implementations

mod config;
mod deploy;
mod logs;
mod status;
mod stop;

pub use config::{cmd_config_init, cmd_config_show};
pub use deploy::{cmd_deploy, cmd_start};
pub use logs::cmd_logs;
pub use status::cmd_status;
pub use stop::cmd_stop;

use anyhow::{Context, Result};
use mrdice_core::{Config, EnvName, Profile};
use std::path::PathBuf;

/// Load config for the current directory (project file, user file, or defaults).
pub(crate) fn load_config() -> Result<Config> {
  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  Config::load(&cwd).context("Failed to load configuration")
}

pub(crate) fn load_profile(config: &Config, env: EnvName) -> Result<Profile> {
  Profile::load(&config.env_dir(), env).context("Failed to load environment profile")
}
