//! The service catalog: every process dicectl supervises, with its port and
//! launch command.
//!
//! The fleet is fixed. Four MCP database servers listen on 50001-50004 and the
//! agent web UI on 50005, each launched from its own checkout directory under
//! the fleet root. Configuration can override ports and directories but cannot
//! add services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The five supervised services, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
  Optimade,
  Openlam,
  Bohriumpublic,
  Mofdbsql,
  Agent,
}

impl ServiceId {
  /// Every service, in display order.
  pub const ALL: [ServiceId; 5] = [
    ServiceId::Optimade,
    ServiceId::Openlam,
    ServiceId::Bohriumpublic,
    ServiceId::Mofdbsql,
    ServiceId::Agent,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      ServiceId::Optimade => "optimade",
      ServiceId::Openlam => "openlam",
      ServiceId::Bohriumpublic => "bohriumpublic",
      ServiceId::Mofdbsql => "mofdbsql",
      ServiceId::Agent => "agent",
    }
  }

  /// Port each server binds by default. Matches the servers' own argparse
  /// defaults, so a service launched by hand lands on the same port.
  pub fn default_port(&self) -> u16 {
    match self {
      ServiceId::Optimade => 50001,
      ServiceId::Openlam => 50002,
      ServiceId::Bohriumpublic => 50003,
      ServiceId::Mofdbsql => 50004,
      ServiceId::Agent => 50005,
    }
  }

  /// Checkout directory relative to the fleet root.
  pub fn default_dir(&self) -> &'static str {
    match self {
      ServiceId::Optimade => "optimade_database/Optimade_Server",
      ServiceId::Openlam => "openlam_database/Openlam_Server",
      ServiceId::Bohriumpublic => "bohriumpublic_database/Bohriumpublic_Server",
      ServiceId::Mofdbsql => "mofdb_database/Mofdb_Server",
      ServiceId::Agent => "agents",
    }
  }

  /// The database servers. The agent rides along with `all` but is not an
  /// addressable `--database` value.
  pub fn is_database(&self) -> bool {
    !matches!(self, ServiceId::Agent)
  }

  pub fn log_file_name(&self) -> String {
    format!("{}.log", self.name())
  }
}

impl fmt::Display for ServiceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for ServiceId {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "optimade" => Ok(ServiceId::Optimade),
      "openlam" => Ok(ServiceId::Openlam),
      "bohriumpublic" => Ok(ServiceId::Bohriumpublic),
      "mofdbsql" => Ok(ServiceId::Mofdbsql),
      "agent" => Ok(ServiceId::Agent),
      _ => Err(format!(
        "Invalid service: {} (expected bohriumpublic, mofdbsql, openlam, optimade, or agent)",
        s
      )),
    }
  }
}

/// Which services a command acts on. `all` covers the four databases plus the
/// agent; a single selector names one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
  #[default]
  All,
  One(ServiceId),
}

impl Selection {
  pub fn contains(&self, id: ServiceId) -> bool {
    match self {
      Selection::All => true,
      Selection::One(selected) => *selected == id,
    }
  }
}

impl fmt::Display for Selection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Selection::All => write!(f, "all"),
      Selection::One(id) => write!(f, "{}", id),
    }
  }
}

impl FromStr for Selection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "all" => Ok(Selection::All),
      other => match other.parse::<ServiceId>() {
        Ok(id) if id.is_database() => Ok(Selection::One(id)),
        _ => Err(format!(
          "Invalid database: {} (expected bohriumpublic, mofdbsql, openlam, optimade, or all)",
          s
        )),
      },
    }
  }
}

/// Resolved launch parameters for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
  pub id: ServiceId,
  pub port: u16,
  /// Working directory, joined onto the fleet root unless absolute.
  pub dir: PathBuf,
  pub program: String,
  pub args: Vec<String>,
  pub enabled: bool,
}

impl ServiceSpec {
  /// The full command as launched, for records and display.
  pub fn command_line(&self) -> String {
    let mut parts = Vec::with_capacity(self.args.len() + 1);
    parts.push(self.program.clone());
    parts.extend(self.args.iter().cloned());
    parts.join(" ")
  }

  /// The argument tail that identifies this service in a process table.
  ///
  /// argv[0] is excluded because the interpreter may resolve to an absolute
  /// path. The `--port N` pair makes the tail unique across the fleet.
  pub fn args_signature(&self) -> String {
    self.args.join(" ")
  }
}
