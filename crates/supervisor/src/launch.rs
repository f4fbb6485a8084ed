//! Detached service launching.
//!
//! Each service is spawned in its own process group with stdin closed and
//! stdout/stderr appended to its log file, so it survives the CLI (and the
//! terminal) exiting.

use mrdice_core::{Profile, ServiceSpec};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LaunchError {
  #[error("working directory {} does not exist", .0.display())]
  MissingWorkdir(PathBuf),
  #[error("failed to open log file {}: {source}", path.display())]
  LogFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to spawn `{command}`: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },
}

/// Spawn a service detached from the CLI, returning its pid.
///
/// Profile variables are layered over the inherited environment. The log file
/// is opened in append mode, so restarts extend the log rather than truncate
/// it.
pub fn spawn_detached(
  spec: &ServiceSpec,
  workdir: &Path,
  log_file: &Path,
  profile: &Profile,
) -> Result<u32, LaunchError> {
  if !workdir.is_dir() {
    return Err(LaunchError::MissingWorkdir(workdir.to_path_buf()));
  }

  if let Some(parent) = log_file.parent() {
    std::fs::create_dir_all(parent).map_err(|source| LaunchError::LogFile {
      path: log_file.to_path_buf(),
      source,
    })?;
  }
  let log = OpenOptions::new()
    .append(true)
    .create(true)
    .open(log_file)
    .map_err(|source| LaunchError::LogFile {
      path: log_file.to_path_buf(),
      source,
    })?;
  let log_err = log.try_clone().map_err(|source| LaunchError::LogFile {
    path: log_file.to_path_buf(),
    source,
  })?;

  let mut command = Command::new(&spec.program);
  command
    .args(&spec.args)
    .current_dir(workdir)
    .envs(&profile.vars)
    .stdin(Stdio::null())
    .stdout(Stdio::from(log))
    .stderr(Stdio::from(log_err));

  // New process group: a Ctrl-C aimed at the CLI must not reach the services.
  #[cfg(unix)]
  {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
  }

  let child = command.spawn().map_err(|source| LaunchError::Spawn {
    command: spec.command_line(),
    source,
  })?;
  let pid = child.id();
  debug!(service = spec.id.name(), pid, "spawned detached process");

  // Reap in the background: an exited child would otherwise linger as a
  // zombie and still count as alive to kill(pid, 0).
  std::thread::spawn(move || {
    let mut child = child;
    let _ = child.wait();
  });

  Ok(pid)
}
