//! Fleet orchestration: deploy, start, stop, and status over a set of
//! services.
//!
//! Deploy is stop-to-completion, then launch: the old instance is confirmed
//! gone before the new one spawns, so the two never race for the port.
//! Services are targeted by run record first, with a process-table scan as
//! fallback for instances launched outside dicectl. A record is only trusted
//! after its pid is verified to still run the recorded command line.

use crate::launch::spawn_detached;
use crate::pidfile::{RunDir, ServiceRecord};
use crate::probe::{Readiness, wait_ready};
use crate::process::{
  find_by_signature, is_process_running, kill_process, process_cmdline, terminate_process, wait_for_exit,
};
use chrono::Utc;
use futures::future::join_all;
use mrdice_core::{Config, Profile, ServiceId, ServiceSpec, TimeoutsConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supervision timing, resolved from config into durations.
#[derive(Debug, Clone)]
pub struct Timeouts {
  pub start_timeout: Duration,
  pub stop_grace: Duration,
  pub kill_wait: Duration,
  pub poll_interval: Duration,
}

impl From<&TimeoutsConfig> for Timeouts {
  fn from(config: &TimeoutsConfig) -> Self {
    Self {
      start_timeout: Duration::from_secs(config.start_timeout_secs),
      stop_grace: Duration::from_secs(config.stop_grace_secs),
      kill_wait: Duration::from_secs(config.kill_wait_secs),
      poll_interval: Duration::from_millis(config.poll_interval_ms),
    }
  }
}

/// Result of a deploy or start attempt for one service.
#[derive(Debug)]
pub enum LaunchOutcome {
  /// Launched and confirmed ready.
  Ready { pid: u32 },
  /// Already running; nothing done.
  AlreadyRunning { pid: u32 },
  /// The spawn itself failed.
  SpawnFailed { error: String },
  /// Exited before becoming ready.
  ExitedEarly { log_file: PathBuf },
  /// Still alive at the deadline but never accepted a connection. The
  /// process is left running.
  TimedOut { pid: u32, log_file: PathBuf },
  /// The previous instance would not die; launch aborted.
  StopFailed { pids: Vec<u32> },
}

impl LaunchOutcome {
  pub fn is_failure(&self) -> bool {
    !matches!(self, LaunchOutcome::Ready { .. } | LaunchOutcome::AlreadyRunning { .. })
  }
}

/// Result of a stop attempt for one service.
#[derive(Debug)]
pub enum StopOutcome {
  /// All instances terminated (`forced` if SIGKILL was needed).
  Stopped { pids: Vec<u32>, forced: bool },
  NotRunning,
  /// Instances still alive after SIGKILL.
  Failed { pids: Vec<u32> },
}

impl StopOutcome {
  pub fn is_failure(&self) -> bool {
    matches!(self, StopOutcome::Failed { .. })
  }
}

/// Point-in-time state of one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
  pub service: ServiceId,
  /// Recorded launch port while running, the configured port otherwise.
  pub port: u16,
  #[serde(flatten)]
  pub state: ServiceState,
  pub log_file: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceState {
  Running { pid: u32, env: String, uptime_secs: i64 },
  /// Running, but not launched by dicectl (no run record).
  Unmanaged { pids: Vec<u32> },
  /// A run record exists but its process is gone or runs something else.
  Stale { pid: u32 },
  Stopped,
}

/// Orchestrates the fleet. One instance per invocation; all state lives in
/// the run dir and the process table.
pub struct Supervisor {
  root_dir: PathBuf,
  log_dir: PathBuf,
  run: RunDir,
  timeouts: Timeouts,
}

impl Supervisor {
  pub fn new(config: &Config) -> Self {
    Self {
      root_dir: config.root_dir().to_path_buf(),
      log_dir: config.log_dir(),
      run: RunDir::new(config.run_dir()),
      timeouts: Timeouts::from(&config.timeouts),
    }
  }

  /// Stop-then-launch every service, concurrently. Order of results matches
  /// the input.
  pub async fn deploy(&self, specs: &[ServiceSpec], profile: &Profile) -> Vec<(ServiceId, LaunchOutcome)> {
    join_all(specs.iter().map(|spec| async move { (spec.id, self.deploy_one(spec, profile).await) })).await
  }

  /// Launch services that are not already running, concurrently.
  pub async fn start(&self, specs: &[ServiceSpec], profile: &Profile) -> Vec<(ServiceId, LaunchOutcome)> {
    join_all(specs.iter().map(|spec| async move { (spec.id, self.start_one(spec, profile).await) })).await
  }

  /// Stop services, concurrently.
  pub async fn stop(&self, specs: &[ServiceSpec]) -> Vec<(ServiceId, StopOutcome)> {
    join_all(specs.iter().map(|spec| async move { (spec.id, self.stop_one(spec).await) })).await
  }

  /// Inspect services without touching them. Never mutates run records.
  pub fn status(&self, specs: &[ServiceSpec]) -> Vec<ServiceStatus> {
    specs.iter().map(|spec| self.status_one(spec)).collect()
  }

  pub async fn deploy_one(&self, spec: &ServiceSpec, profile: &Profile) -> LaunchOutcome {
    match self.stop_one(spec).await {
      StopOutcome::Failed { pids } => LaunchOutcome::StopFailed { pids },
      _ => self.launch_one(spec, profile).await,
    }
  }

  pub async fn start_one(&self, spec: &ServiceSpec, profile: &Profile) -> LaunchOutcome {
    let pids = self.resolve_pids(spec);
    if let Some(&pid) = pids.first() {
      debug!(service = spec.id.name(), pid, "already running");
      return LaunchOutcome::AlreadyRunning { pid };
    }
    self.launch_one(spec, profile).await
  }

  pub async fn stop_one(&self, spec: &ServiceSpec) -> StopOutcome {
    let pids = self.resolve_pids(spec);
    if pids.is_empty() {
      let _ = self.run.remove(spec.id);
      return StopOutcome::NotRunning;
    }

    info!(service = spec.id.name(), ?pids, "stopping");
    for &pid in &pids {
      if !terminate_process(pid) {
        warn!(service = spec.id.name(), pid, "SIGTERM not delivered");
      }
    }

    let graceful = join_all(
      pids
        .iter()
        .map(|&pid| wait_for_exit(pid, self.timeouts.stop_grace, self.timeouts.poll_interval)),
    )
    .await;
    let survivors: Vec<u32> = pids
      .iter()
      .zip(&graceful)
      .filter(|(_, exited)| !**exited)
      .map(|(&pid, _)| pid)
      .collect();

    let mut forced = false;
    if !survivors.is_empty() {
      warn!(service = spec.id.name(), ?survivors, "escalating to SIGKILL");
      forced = true;
      for &pid in &survivors {
        kill_process(pid);
      }

      let killed = join_all(
        survivors
          .iter()
          .map(|&pid| wait_for_exit(pid, self.timeouts.kill_wait, self.timeouts.poll_interval)),
      )
      .await;
      let still_alive: Vec<u32> = survivors
        .iter()
        .zip(&killed)
        .filter(|(_, exited)| !**exited)
        .map(|(&pid, _)| pid)
        .collect();
      if !still_alive.is_empty() {
        warn!(service = spec.id.name(), pids = ?still_alive, "still alive after SIGKILL");
        return StopOutcome::Failed { pids: still_alive };
      }
    }

    // Only a confirmed stop clears the record; a failed one keeps it for
    // the next attempt.
    let _ = self.run.remove(spec.id);
    info!(service = spec.id.name(), forced, "stopped");
    StopOutcome::Stopped { pids, forced }
  }

  pub fn status_one(&self, spec: &ServiceSpec) -> ServiceStatus {
    // A running instance keeps the port it was launched on, which may differ
    // from the configured one until the next deploy.
    let mut port = spec.port;
    let state = match self.run.read(spec.id) {
      Ok(Some(record)) if record_is_live(&record) => {
        port = record.port;
        let uptime_secs = record.uptime_secs();
        ServiceState::Running {
          pid: record.pid,
          env: record.env,
          uptime_secs,
        }
      }
      Ok(Some(record)) => ServiceState::Stale { pid: record.pid },
      Ok(None) => scan_state(spec),
      Err(e) => {
        warn!(service = spec.id.name(), error = %e, "unreadable run record");
        scan_state(spec)
      }
    };

    ServiceStatus {
      service: spec.id,
      port,
      state,
      log_file: self.log_file(spec),
    }
  }

  pub fn log_file(&self, spec: &ServiceSpec) -> PathBuf {
    self.log_dir.join(spec.id.log_file_name())
  }

  async fn launch_one(&self, spec: &ServiceSpec, profile: &Profile) -> LaunchOutcome {
    let workdir = self.workdir(spec);
    let log_file = self.log_file(spec);

    let pid = match spawn_detached(spec, &workdir, &log_file, profile) {
      Ok(pid) => pid,
      Err(e) => {
        warn!(service = spec.id.name(), error = %e, "launch failed");
        return LaunchOutcome::SpawnFailed { error: e.to_string() };
      }
    };

    let record = ServiceRecord {
      service: spec.id,
      pid,
      port: spec.port,
      env: profile.env.to_string(),
      command: spec.command_line(),
      signature: spec.args_signature(),
      log_file: log_file.clone(),
      started_at: Utc::now(),
    };
    // The spawn already happened; a failed record write only degrades
    // stop/status to the process-table fallback.
    if let Err(e) = self.run.write(&record) {
      warn!(service = spec.id.name(), error = %e, "failed to write run record");
    }

    info!(service = spec.id.name(), pid, port = spec.port, "launched, probing readiness");
    match wait_ready(pid, Some(spec.port), self.timeouts.start_timeout, self.timeouts.poll_interval).await {
      Readiness::Ready => {
        info!(service = spec.id.name(), pid, "ready");
        LaunchOutcome::Ready { pid }
      }
      Readiness::ExitedEarly => {
        warn!(service = spec.id.name(), "exited before becoming ready");
        let _ = self.run.remove(spec.id);
        LaunchOutcome::ExitedEarly { log_file }
      }
      Readiness::TimedOut => {
        warn!(service = spec.id.name(), pid, "not accepting connections, leaving it running");
        LaunchOutcome::TimedOut { pid, log_file }
      }
    }
  }

  /// Every pid currently running this service: the verified run record
  /// first, then a process-table scan. Stale and unreadable records are
  /// removed on the way.
  fn resolve_pids(&self, spec: &ServiceSpec) -> Vec<u32> {
    let mut pids = Vec::new();

    match self.run.read(spec.id) {
      Ok(Some(record)) => {
        if record_is_live(&record) {
          pids.push(record.pid);
        } else {
          debug!(service = spec.id.name(), pid = record.pid, "removing stale run record");
          let _ = self.run.remove(spec.id);
        }
      }
      Ok(None) => {}
      Err(e) => {
        warn!(service = spec.id.name(), error = %e, "unreadable run record, removing");
        let _ = self.run.remove(spec.id);
      }
    }

    for pid in find_by_signature(&spec.args_signature()) {
      if !pids.contains(&pid) {
        pids.push(pid);
      }
    }
    pids
  }

  fn workdir(&self, spec: &ServiceSpec) -> PathBuf {
    if spec.dir.is_absolute() {
      spec.dir.clone()
    } else {
      self.root_dir.join(&spec.dir)
    }
  }
}

/// Whether the recorded pid is still running the recorded command.
fn record_is_live(record: &ServiceRecord) -> bool {
  is_process_running(record.pid)
    && process_cmdline(record.pid).is_some_and(|cmdline| cmdline.contains(&record.signature))
}

fn scan_state(spec: &ServiceSpec) -> ServiceState {
  let pids = find_by_signature(&spec.args_signature());
  if pids.is_empty() {
    ServiceState::Stopped
  } else {
    ServiceState::Unmanaged { pids }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_timeouts_from_config() {
    let config = TimeoutsConfig::default();
    let timeouts = Timeouts::from(&config);
    assert_eq!(timeouts.start_timeout, Duration::from_secs(20));
    assert_eq!(timeouts.stop_grace, Duration::from_secs(10));
    assert_eq!(timeouts.kill_wait, Duration::from_secs(3));
    assert_eq!(timeouts.poll_interval, Duration::from_millis(200));
  }

  #[test]
  fn test_workdir_resolution() {
    let mut config = Config::default();
    config.fleet.root_dir = PathBuf::from("/srv/dice");
    let supervisor = Supervisor::new(&config);

    let mut spec = config.fleet().unwrap().remove(0);
    assert_eq!(
      supervisor.workdir(&spec),
      PathBuf::from("/srv/dice/optimade_database/Optimade_Server")
    );

    spec.dir = PathBuf::from("/checkout/elsewhere");
    assert_eq!(supervisor.workdir(&spec), PathBuf::from("/checkout/elsewhere"));
  }

  #[test]
  fn test_log_file_path() {
    let config = Config::default();
    let supervisor = Supervisor::new(&config);
    let spec = config.fleet().unwrap().remove(4);
    assert_eq!(supervisor.log_file(&spec), PathBuf::from("/opt/mr-dice/logs/agent.log"));
  }

  #[test]
  fn test_launch_outcome_failure_classification() {
    assert!(!LaunchOutcome::Ready { pid: 1 }.is_failure());
    assert!(!LaunchOutcome::AlreadyRunning { pid: 1 }.is_failure());
    assert!(LaunchOutcome::SpawnFailed { error: "x".into() }.is_failure());
    assert!(
      LaunchOutcome::TimedOut {
        pid: 1,
        log_file: PathBuf::new()
      }
      .is_failure()
    );
    assert!(LaunchOutcome::StopFailed { pids: vec![1] }.is_failure());
  }

  #[test]
  fn test_stop_outcome_failure_classification() {
    assert!(
      !StopOutcome::Stopped {
        pids: vec![1],
        forced: true
      }
      .is_failure()
    );
    assert!(!StopOutcome::NotRunning.is_failure());
    assert!(StopOutcome::Failed { pids: vec![1] }.is_failure());
  }
}
