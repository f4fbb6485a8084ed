//! Environment profiles: dotenv files injected into launched services.
//!
//! Each deploy environment has one profile file under the env dir, e.g.
//! `test.env`, holding `KEY=value` lines (`export KEY=value` also works).
//! Launched services get these variables on top of the inherited environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Deploy environments, each backed by `<env_dir>/<name>.env`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvName {
  #[default]
  Test,
  Uat,
  Prod,
}

impl EnvName {
  pub fn name(&self) -> &'static str {
    match self {
      EnvName::Test => "test",
      EnvName::Uat => "uat",
      EnvName::Prod => "prod",
    }
  }

  pub fn file_name(&self) -> String {
    format!("{}.env", self.name())
  }
}

impl fmt::Display for EnvName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for EnvName {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "test" => Ok(EnvName::Test),
      "uat" => Ok(EnvName::Uat),
      "prod" => Ok(EnvName::Prod),
      _ => Err(format!("Invalid environment: {} (expected test, uat, or prod)", s)),
    }
  }
}

#[derive(Error, Debug)]
pub enum ProfileError {
  #[error("failed to load profile {}: {source}", path.display())]
  Load {
    path: PathBuf,
    #[source]
    source: dotenvy::Error,
  },
}

/// A loaded environment profile.
///
/// A missing profile file is not an error: the service still launches, just
/// without extra variables. A present but malformed file is an error.
#[derive(Debug, Clone)]
pub struct Profile {
  pub env: EnvName,
  pub path: PathBuf,
  pub vars: BTreeMap<String, String>,
  /// Whether the profile file existed and was read.
  pub loaded: bool,
}

impl Profile {
  /// Load `<env_dir>/<name>.env`. Later assignments to the same key win,
  /// matching shell sourcing.
  pub fn load(env_dir: &Path, env: EnvName) -> Result<Self, ProfileError> {
    let path = env_dir.join(env.file_name());
    if !path.exists() {
      warn!(path = %path.display(), "profile file not found, launching with inherited environment only");
      return Ok(Self {
        env,
        path,
        vars: BTreeMap::new(),
        loaded: false,
      });
    }

    let entries = dotenvy::from_path_iter(&path).map_err(|source| ProfileError::Load {
      path: path.clone(),
      source,
    })?;

    let mut vars = BTreeMap::new();
    for entry in entries {
      let (key, value) = entry.map_err(|source| ProfileError::Load {
        path: path.clone(),
        source,
      })?;
      vars.insert(key, value);
    }

    debug!(path = %path.display(), count = vars.len(), "loaded profile");
    Ok(Self {
      env,
      path,
      vars,
      loaded: true,
    })
  }

  /// A profile with no variables, for operations that do not launch anything.
  pub fn empty(env: EnvName) -> Self {
    Self {
      env,
      path: PathBuf::new(),
      vars: BTreeMap::new(),
      loaded: false,
    }
  }
}
