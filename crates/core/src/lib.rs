//! Shared types for dicectl: the service catalog, configuration, and
//! environment profiles.

pub mod config;
pub mod envfile;
pub mod fleet;

pub use config::{CONFIG_FILE_NAME, Config, ConfigError, FleetConfig, PathsConfig, ServiceOverride, TimeoutsConfig};
pub use envfile::{EnvName, Profile, ProfileError};
pub use fleet::{Selection, ServiceId, ServiceSpec};
