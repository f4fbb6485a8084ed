//! Configuration for dicectl with per-deployment overrides.
//!
//! Config priority: project-relative (./dicectl.toml) > user (~/.config/dicectl/config.toml)
//!
//! Unlike a missing file, a malformed config file is a hard error.

use crate::fleet::{Selection, ServiceId, ServiceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "dicectl.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to read config {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("port {port} assigned to both {first} and {second}")]
  DuplicatePort { port: u16, first: String, second: String },
}

// ============================================================================
// Fleet Layout
// ============================================================================

/// Where the fleet lives and how its processes are invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
  /// Root directory the service checkouts live under (default: /opt/mr-dice)
  #[serde(default = "default_root_dir")]
  pub root_dir: PathBuf,

  /// Bind address handed to every service (default: 0.0.0.0)
  #[serde(default = "default_host")]
  pub host: String,

  /// Interpreter used to launch the database servers (default: python)
  #[serde(default = "default_python_bin")]
  pub python_bin: String,

  /// Launcher for the agent web UI (default: adk)
  #[serde(default = "default_adk_bin")]
  pub adk_bin: String,
}

fn default_root_dir() -> PathBuf {
  PathBuf::from("/opt/mr-dice")
}
fn default_host() -> String {
  "0.0.0.0".to_string()
}
fn default_python_bin() -> String {
  "python".to_string()
}
fn default_adk_bin() -> String {
  "adk".to_string()
}

impl Default for FleetConfig {
  fn default() -> Self {
    Self {
      root_dir: default_root_dir(),
      host: default_host(),
      python_bin: default_python_bin(),
      adk_bin: default_adk_bin(),
    }
  }
}

// ============================================================================
// Directories
// ============================================================================

/// Directory overrides. Unset entries derive from the fleet root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
  /// Service log files (default: <root_dir>/logs)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_dir: Option<PathBuf>,

  /// Run records, one JSON file per launched service (default: <root_dir>/run)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub run_dir: Option<PathBuf>,

  /// Environment profiles: test.env, uat.env, prod.env (default: <root_dir>/env)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub env_dir: Option<PathBuf>,
}

// ============================================================================
// Supervision Timing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
  /// Readiness deadline after a launch in seconds (default: 20)
  #[serde(default = "default_start_timeout_secs")]
  pub start_timeout_secs: u64,

  /// Grace period between SIGTERM and SIGKILL in seconds (default: 10)
  #[serde(default = "default_stop_grace_secs")]
  pub stop_grace_secs: u64,

  /// Wait after SIGKILL before giving up in seconds (default: 3)
  #[serde(default = "default_kill_wait_secs")]
  pub kill_wait_secs: u64,

  /// Poll interval for liveness and readiness checks in milliseconds (default: 200)
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

fn default_start_timeout_secs() -> u64 {
  20
}
fn default_stop_grace_secs() -> u64 {
  10
}
fn default_kill_wait_secs() -> u64 {
  3
}
fn default_poll_interval_ms() -> u64 {
  200
}

impl Default for TimeoutsConfig {
  fn default() -> Self {
    Self {
      start_timeout_secs: default_start_timeout_secs(),
      stop_grace_secs: default_stop_grace_secs(),
      kill_wait_secs: default_kill_wait_secs(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

// ============================================================================
// Per-Service Overrides
// ============================================================================

/// Optional overrides for one catalog entry, keyed by service name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverride {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,

  /// Working directory, joined onto the fleet root unless absolute.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub dir: Option<PathBuf>,

  /// Disabled services are skipped by every command (default: true)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub enabled: Option<bool>,
}

// ============================================================================
// Top-Level Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub fleet: FleetConfig,
  pub paths: PathsConfig,
  pub timeouts: TimeoutsConfig,
  /// Keyed by service name: `[services.optimade]`, `[services.agent]`, ...
  pub services: BTreeMap<String, ServiceOverride>,
}

impl Config {
  /// Load config for a working directory, with fallback to user config.
  pub fn load(dir: &Path) -> Result<Self, ConfigError> {
    Self::load_with_source(dir).map(|(config, _)| config)
  }

  /// Load config and report which file it came from (`None` = built-in defaults).
  pub fn load_with_source(dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
    let project = dir.join(CONFIG_FILE_NAME);
    if project.exists() {
      return Ok((Self::parse_file(&project)?, Some(project)));
    }

    if let Some(user) = Self::user_config_path()
      && user.exists()
    {
      return Ok((Self::parse_file(&user)?, Some(user)));
    }

    Ok((Self::default(), None))
  }

  fn parse_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DICECTL_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("dicectl").join("config.toml"));
    }

    dirs::config_dir().map(|p| p.join("dicectl").join("config.toml"))
  }

  pub fn root_dir(&self) -> &Path {
    &self.fleet.root_dir
  }

  pub fn log_dir(&self) -> PathBuf {
    self.paths.log_dir.clone().unwrap_or_else(|| self.fleet.root_dir.join("logs"))
  }

  pub fn run_dir(&self) -> PathBuf {
    self.paths.run_dir.clone().unwrap_or_else(|| self.fleet.root_dir.join("run"))
  }

  pub fn env_dir(&self) -> PathBuf {
    self.paths.env_dir.clone().unwrap_or_else(|| self.fleet.root_dir.join("env"))
  }

  /// The resolved fleet in catalog order, overrides applied.
  ///
  /// Ports must be unique across enabled services: a shared port means a
  /// shared args signature, so stopping one service would target the other.
  pub fn fleet(&self) -> Result<Vec<ServiceSpec>, ConfigError> {
    let specs: Vec<ServiceSpec> = ServiceId::ALL.iter().map(|id| self.spec_for(*id)).collect();

    let mut claimed: BTreeMap<u16, ServiceId> = BTreeMap::new();
    for spec in specs.iter().filter(|spec| spec.enabled) {
      if let Some(&holder) = claimed.get(&spec.port) {
        return Err(ConfigError::DuplicatePort {
          port: spec.port,
          first: holder.name().to_string(),
          second: spec.id.name().to_string(),
        });
      }
      claimed.insert(spec.port, spec.id);
    }

    Ok(specs)
  }

  /// Enabled services covered by a selection, in catalog order.
  pub fn select(&self, selection: Selection) -> Result<Vec<ServiceSpec>, ConfigError> {
    Ok(
      self
        .fleet()?
        .into_iter()
        .filter(|spec| spec.enabled && selection.contains(spec.id))
        .collect(),
    )
  }

  fn spec_for(&self, id: ServiceId) -> ServiceSpec {
    let overrides = self.services.get(id.name());
    let port = overrides.and_then(|o| o.port).unwrap_or_else(|| id.default_port());
    let dir = overrides
      .and_then(|o| o.dir.clone())
      .unwrap_or_else(|| PathBuf::from(id.default_dir()));
    let enabled = overrides.and_then(|o| o.enabled).unwrap_or(true);

    let (program, args) = match id {
      ServiceId::Agent => (
        self.fleet.adk_bin.clone(),
        vec![
          "web".to_string(),
          "--host".to_string(),
          self.fleet.host.clone(),
          "--port".to_string(),
          port.to_string(),
        ],
      ),
      _ => (
        self.fleet.python_bin.clone(),
        vec![
          "server.py".to_string(),
          "--host".to_string(),
          self.fleet.host.clone(),
          "--port".to_string(),
          port.to_string(),
        ],
      ),
    };

    ServiceSpec {
      id,
      port,
      dir,
      program,
      args,
      enabled,
    }
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    r#"# dicectl Configuration
# Place next to your deployment (./dicectl.toml) or in
# ~/.config/dicectl/config.toml (user-wide).

# ============================================================================
# Fleet Layout
# ============================================================================

[fleet]
# Root directory the service checkouts live under.
root_dir = "/opt/mr-dice"

# Bind address handed to every service.
host = "0.0.0.0"

# Interpreter used to launch the database servers.
python_bin = "python"

# Launcher for the agent web UI.
adk_bin = "adk"

# ============================================================================
# Directories
# ============================================================================

# All three default to subdirectories of the fleet root.
[paths]
# log_dir = "/opt/mr-dice/logs"
# run_dir = "/opt/mr-dice/run"
# env_dir = "/opt/mr-dice/env"

# ============================================================================
# Supervision Timing
# ============================================================================

[timeouts]
# Readiness deadline after a launch (seconds).
start_timeout_secs = 20

# Grace period between SIGTERM and SIGKILL (seconds).
stop_grace_secs = 10

# Wait after SIGKILL before giving up (seconds).
kill_wait_secs = 3

# Poll interval for liveness and readiness checks (milliseconds).
poll_interval_ms = 200

# ============================================================================
# Per-Service Overrides
# ============================================================================

# Services: optimade, openlam, bohriumpublic, mofdbsql, agent.
# Unset fields fall back to the built-in catalog (uncomment to use):
# [services.optimade]
# port = 50001
# dir = "optimade_database/Optimade_Server"
# enabled = true
"#
    .to_string()
  }
}
