//! Integration tests for fleet supervision.
//!
//! Services are stand-ins: `sleep` with a unique marker argument plays the
//! long-running server, and a pre-bound listener plays its open port. Every
//! test stops what it starts.

use chrono::Utc;
use mrdice_core::{Config, EnvName, Profile, ServiceId, ServiceSpec};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervisor::{LaunchOutcome, RunDir, ServiceRecord, ServiceState, StopOutcome, Supervisor};
use tempfile::TempDir;

fn test_config(root: &Path) -> Config {
  let mut config = Config::default();
  config.fleet.root_dir = root.to_path_buf();
  config.timeouts.start_timeout_secs = 5;
  config.timeouts.stop_grace_secs = 5;
  config.timeouts.kill_wait_secs = 3;
  config.timeouts.poll_interval_ms = 25;
  config
}

/// A long-running fake service. The marker keeps process-table scans from
/// matching anything but this test's own child.
fn sleeper(id: ServiceId, port: u16, marker: &str) -> ServiceSpec {
  ServiceSpec {
    id,
    port,
    dir: PathBuf::from("."),
    program: "sleep".to_string(),
    args: vec!["30".to_string(), marker.to_string()],
    enabled: true,
  }
}

fn bound_port() -> (TcpListener, u16) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let port = listener.local_addr().unwrap().port();
  (listener, port)
}

/// Spawn a process the supervisor did not launch, reaped in the background
/// like spawn_detached's children are.
fn spawn_foreign(marker: &str) -> u32 {
  let child = std::process::Command::new("sleep").args(["30", marker]).spawn().unwrap();
  let pid = child.id();
  std::thread::spawn(move || {
    let mut child = child;
    let _ = child.wait();
  });
  // Let it exec so /proc shows its own argv.
  std::thread::sleep(Duration::from_millis(100));
  pid
}

/// Deploy launches the service, confirms readiness, records it, and stop
/// tears it back down.
#[tokio::test]
async fn test_deploy_then_stop() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let spec = sleeper(ServiceId::Optimade, port, "0.104729");
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let outcomes = supervisor.deploy(std::slice::from_ref(&spec), &profile).await;
  assert_eq!(outcomes.len(), 1);
  assert_eq!(outcomes[0].0, ServiceId::Optimade);
  let pid = match &outcomes[0].1 {
    LaunchOutcome::Ready { pid } => *pid,
    other => panic!("expected ready, got {other:?}"),
  };

  // Record on disk, process alive.
  let record = RunDir::new(config.run_dir()).read(ServiceId::Optimade).unwrap().unwrap();
  assert_eq!(record.pid, pid);
  assert_eq!(record.port, port);
  assert_eq!(record.env, "test");
  assert!(supervisor::process::is_process_running(pid));

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  match &stops[0].1 {
    StopOutcome::Stopped { pids, forced } => {
      assert!(pids.contains(&pid));
      assert!(!forced, "sleep should die to SIGTERM");
    }
    other => panic!("expected stopped, got {other:?}"),
  }

  assert!(!supervisor::process::is_process_running(pid));
  assert!(RunDir::new(config.run_dir()).read(ServiceId::Optimade).unwrap().is_none());
}

/// Deploying over a running instance replaces it: the old pid is gone before
/// the new one is probed.
#[tokio::test]
async fn test_deploy_replaces_previous_instance() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let spec = sleeper(ServiceId::Mofdbsql, port, "0.203317");
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Uat);

  let first = supervisor.deploy_one(&spec, &profile).await;
  let pid1 = match first {
    LaunchOutcome::Ready { pid } => pid,
    other => panic!("expected ready, got {other:?}"),
  };

  let second = supervisor.deploy_one(&spec, &profile).await;
  let pid2 = match second {
    LaunchOutcome::Ready { pid } => pid,
    other => panic!("expected ready, got {other:?}"),
  };

  assert_ne!(pid1, pid2);
  assert!(!supervisor::process::is_process_running(pid1));
  assert_eq!(
    RunDir::new(config.run_dir()).read(ServiceId::Mofdbsql).unwrap().unwrap().pid,
    pid2
  );

  supervisor.stop(std::slice::from_ref(&spec)).await;
}

/// Deploying one service leaves the rest of the fleet alone.
#[tokio::test]
async fn test_deploy_only_touches_selected() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let selected = sleeper(ServiceId::Openlam, port, "0.300211");
  let untouched_marker = "0.300212";
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let outcomes = supervisor.deploy(std::slice::from_ref(&selected), &profile).await;
  assert!(matches!(outcomes[0].1, LaunchOutcome::Ready { .. }));

  // Nothing else was recorded or launched.
  let run = RunDir::new(config.run_dir());
  assert!(run.read(ServiceId::Optimade).unwrap().is_none());
  assert!(run.read(ServiceId::Agent).unwrap().is_none());
  assert!(supervisor::process::find_by_signature(untouched_marker).is_empty());

  supervisor.stop(std::slice::from_ref(&selected)).await;
}

/// A service that dies on startup is reported, and no record is left behind.
#[tokio::test]
async fn test_deploy_reports_early_exit() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let spec = ServiceSpec {
    id: ServiceId::Bohriumpublic,
    port: 1,
    dir: PathBuf::from("."),
    program: "sh".to_string(),
    args: vec!["-c".to_string(), "exit 7".to_string()],
    enabled: true,
  };
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let outcome = supervisor.deploy_one(&spec, &profile).await;
  let log_file = match outcome {
    LaunchOutcome::ExitedEarly { log_file } => log_file,
    other => panic!("expected early exit, got {other:?}"),
  };

  assert!(log_file.exists(), "log file is created even for a crashing service");
  assert!(RunDir::new(config.run_dir()).read(ServiceId::Bohriumpublic).unwrap().is_none());
}

/// A service that stays up but never opens its port is reported and left
/// running for inspection.
#[tokio::test]
async fn test_deploy_timeout_leaves_process_running() {
  let root = TempDir::new().unwrap();
  let mut config = test_config(root.path());
  config.timeouts.start_timeout_secs = 1;

  // Nothing listens on port 1, so the probe can never connect.
  let spec = sleeper(ServiceId::Optimade, 1, "0.488917");
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let outcome = supervisor.deploy_one(&spec, &profile).await;
  let pid = match outcome {
    LaunchOutcome::TimedOut { pid, .. } => pid,
    other => panic!("expected timeout, got {other:?}"),
  };

  assert!(supervisor::process::is_process_running(pid));
  // The record stays so a later stop can still target the instance.
  assert!(RunDir::new(config.run_dir()).read(ServiceId::Optimade).unwrap().is_some());

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  assert!(matches!(&stops[0].1, StopOutcome::Stopped { .. }));
  assert!(!supervisor::process::is_process_running(pid));
}

/// Start is idempotent: a running service is left alone.
#[tokio::test]
async fn test_start_skips_running_service() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let spec = sleeper(ServiceId::Openlam, port, "0.551129");
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let first = supervisor.start(std::slice::from_ref(&spec), &profile).await;
  let pid = match &first[0].1 {
    LaunchOutcome::Ready { pid } => *pid,
    other => panic!("expected ready, got {other:?}"),
  };

  let second = supervisor.start(std::slice::from_ref(&spec), &profile).await;
  match &second[0].1 {
    LaunchOutcome::AlreadyRunning { pid: existing } => assert_eq!(*existing, pid),
    other => panic!("expected already running, got {other:?}"),
  }
  assert!(supervisor::process::is_process_running(pid));

  supervisor.stop(std::slice::from_ref(&spec)).await;
}

/// A service that ignores SIGTERM is escalated to SIGKILL and reported as
/// forced.
#[tokio::test]
async fn test_stop_escalates_when_sigterm_is_ignored() {
  let root = TempDir::new().unwrap();
  let mut config = test_config(root.path());
  config.timeouts.stop_grace_secs = 1;
  let (_listener, port) = bound_port();
  // The trailing `true` keeps the shell from exec'ing into sleep, so the
  // recorded pid is the TERM-ignoring shell itself.
  let spec = ServiceSpec {
    id: ServiceId::Openlam,
    port,
    dir: PathBuf::from("."),
    program: "sh".to_string(),
    args: vec!["-c".to_string(), "trap '' TERM; sleep 30 0.517293; true".to_string()],
    enabled: true,
  };
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Test);

  let outcome = supervisor.deploy_one(&spec, &profile).await;
  assert!(matches!(outcome, LaunchOutcome::Ready { .. }), "got {outcome:?}");

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  match &stops[0].1 {
    StopOutcome::Stopped { forced, .. } => assert!(*forced, "expected SIGKILL escalation"),
    other => panic!("expected stopped, got {other:?}"),
  }

  // SIGKILL took the shell; its sleep child survives as an orphan.
  for pid in supervisor::process::find_by_signature("30 0.517293") {
    supervisor::process::kill_process(pid);
    supervisor::process::wait_for_exit(pid, Duration::from_secs(5), Duration::from_millis(25)).await;
  }
}

/// Stopping a service that is not running reports so and succeeds.
#[tokio::test]
async fn test_stop_when_not_running() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let spec = sleeper(ServiceId::Agent, 1, "0.600913");
  let supervisor = Supervisor::new(&config);

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  assert!(matches!(&stops[0].1, StopOutcome::NotRunning));
}

/// A record whose process is gone is cleaned up by stop, not signalled.
#[tokio::test]
async fn test_stop_cleans_stale_record() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let spec = sleeper(ServiceId::Mofdbsql, 1, "0.700087");
  let supervisor = Supervisor::new(&config);
  let run = RunDir::new(config.run_dir());

  let mut dead = std::process::Command::new("true").spawn().unwrap();
  let dead_pid = dead.id();
  dead.wait().unwrap();

  run
    .write(&ServiceRecord {
      service: ServiceId::Mofdbsql,
      pid: dead_pid,
      port: spec.port,
      env: "test".to_string(),
      command: spec.command_line(),
      signature: spec.args_signature(),
      log_file: config.log_dir().join("mofdbsql.log"),
      started_at: Utc::now(),
    })
    .unwrap();

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  assert!(matches!(&stops[0].1, StopOutcome::NotRunning));
  assert!(run.read(ServiceId::Mofdbsql).unwrap().is_none());
}

/// A recorded pid that was recycled by an unrelated program is never
/// signalled: its command line no longer matches the recorded launch.
#[tokio::test]
async fn test_recycled_pid_is_not_signalled() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let spec = sleeper(ServiceId::Bohriumpublic, 1, "0.662407");
  let supervisor = Supervisor::new(&config);
  let run = RunDir::new(config.run_dir());

  // The test runner itself plays the recycled pid: alive, wrong command.
  run
    .write(&ServiceRecord {
      service: ServiceId::Bohriumpublic,
      pid: std::process::id(),
      port: spec.port,
      env: "test".to_string(),
      command: spec.command_line(),
      signature: spec.args_signature(),
      log_file: config.log_dir().join("bohriumpublic.log"),
      started_at: Utc::now(),
    })
    .unwrap();

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  match &statuses[0].state {
    ServiceState::Stale { pid } => assert_eq!(*pid, std::process::id()),
    other => panic!("expected stale, got {other:?}"),
  }

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  assert!(matches!(&stops[0].1, StopOutcome::NotRunning));
  assert!(run.read(ServiceId::Bohriumpublic).unwrap().is_none());
  assert!(supervisor::process::is_process_running(std::process::id()));
}

/// The record targets the exact instance even when the configured command
/// has since changed (port moved in config, say).
#[tokio::test]
async fn test_stop_follows_record_not_current_config() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let supervisor = Supervisor::new(&config);
  let run = RunDir::new(config.run_dir());

  // Instance launched under the old config.
  let old_marker = "0.801441";
  let old_pid = spawn_foreign(old_marker);
  run
    .write(&ServiceRecord {
      service: ServiceId::Optimade,
      pid: old_pid,
      port: 60001,
      env: "test".to_string(),
      command: format!("sleep 30 {old_marker}"),
      signature: format!("30 {old_marker}"),
      log_file: config.log_dir().join("optimade.log"),
      started_at: Utc::now(),
    })
    .unwrap();

  // Current config names a different command line.
  let spec = sleeper(ServiceId::Optimade, 60002, "0.801442");

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  match &stops[0].1 {
    StopOutcome::Stopped { pids, .. } => assert!(pids.contains(&old_pid)),
    other => panic!("expected stopped, got {other:?}"),
  }
  assert!(!supervisor::process::is_process_running(old_pid));
}

/// An instance started outside dicectl (no record) is found by the
/// process-table scan and stopped.
#[tokio::test]
async fn test_stop_finds_unmanaged_instance() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let marker = "0.900773";
  let pid = spawn_foreign(marker);
  let spec = sleeper(ServiceId::Openlam, 1, marker);
  let supervisor = Supervisor::new(&config);

  let stops = supervisor.stop(std::slice::from_ref(&spec)).await;
  match &stops[0].1 {
    StopOutcome::Stopped { pids, .. } => assert!(pids.contains(&pid)),
    other => panic!("expected stopped, got {other:?}"),
  }
  assert!(!supervisor::process::is_process_running(pid));
}

/// Status walks the full lifecycle: stopped, running, stale, stopped.
#[tokio::test]
async fn test_status_reflects_lifecycle() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let spec = sleeper(ServiceId::Bohriumpublic, port, "0.113383");
  let supervisor = Supervisor::new(&config);
  let profile = Profile::empty(EnvName::Prod);

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  assert!(matches!(statuses[0].state, ServiceState::Stopped));

  let outcome = supervisor.deploy_one(&spec, &profile).await;
  let pid = match outcome {
    LaunchOutcome::Ready { pid } => pid,
    other => panic!("expected ready, got {other:?}"),
  };

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  match &statuses[0].state {
    ServiceState::Running {
      pid: running,
      env,
      uptime_secs,
    } => {
      assert_eq!(*running, pid);
      assert_eq!(env, "prod");
      assert!(*uptime_secs >= 0);
    }
    other => panic!("expected running, got {other:?}"),
  }
  assert_eq!(statuses[0].port, port);

  supervisor.stop(std::slice::from_ref(&spec)).await;
  let statuses = supervisor.status(std::slice::from_ref(&spec));
  assert!(matches!(statuses[0].state, ServiceState::Stopped));
}

/// A running instance is listed under the port it was launched on, not the
/// one configured since.
#[tokio::test]
async fn test_status_reports_recorded_port_while_running() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let supervisor = Supervisor::new(&config);
  let run = RunDir::new(config.run_dir());

  let marker = "0.773311";
  let pid = spawn_foreign(marker);
  run
    .write(&ServiceRecord {
      service: ServiceId::Mofdbsql,
      pid,
      port: 61001,
      env: "uat".to_string(),
      command: format!("sleep 30 {marker}"),
      signature: format!("30 {marker}"),
      log_file: config.log_dir().join("mofdbsql.log"),
      started_at: Utc::now(),
    })
    .unwrap();

  // The port override moved after the launch.
  let spec = sleeper(ServiceId::Mofdbsql, 61002, marker);

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  assert_eq!(statuses[0].port, 61001, "running instance keeps its launch port");
  match &statuses[0].state {
    ServiceState::Running { pid: running, env, .. } => {
      assert_eq!(*running, pid);
      assert_eq!(env, "uat");
    }
    other => panic!("expected running, got {other:?}"),
  }

  supervisor::process::kill_process(pid);
  supervisor::process::wait_for_exit(pid, Duration::from_secs(5), Duration::from_millis(25)).await;
}

/// Status reports a dead record as stale without removing it.
#[tokio::test]
async fn test_status_stale_record_is_read_only() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let spec = sleeper(ServiceId::Agent, 1, "0.227199");
  let supervisor = Supervisor::new(&config);
  let run = RunDir::new(config.run_dir());

  let mut dead = std::process::Command::new("true").spawn().unwrap();
  let dead_pid = dead.id();
  dead.wait().unwrap();

  run
    .write(&ServiceRecord {
      service: ServiceId::Agent,
      pid: dead_pid,
      port: spec.port,
      env: "test".to_string(),
      command: spec.command_line(),
      signature: spec.args_signature(),
      log_file: config.log_dir().join("agent.log"),
      started_at: Utc::now(),
    })
    .unwrap();

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  match &statuses[0].state {
    ServiceState::Stale { pid } => assert_eq!(*pid, dead_pid),
    other => panic!("expected stale, got {other:?}"),
  }
  // Status never mutates: the record survives for stop to clean up.
  assert!(run.read(ServiceId::Agent).unwrap().is_some());
}

/// Status reports pids running the service command without a record.
#[tokio::test]
async fn test_status_reports_unmanaged_instance() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let marker = "0.331577";
  let pid = spawn_foreign(marker);
  let spec = sleeper(ServiceId::Optimade, 1, marker);
  let supervisor = Supervisor::new(&config);

  let statuses = supervisor.status(std::slice::from_ref(&spec));
  match &statuses[0].state {
    ServiceState::Unmanaged { pids } => assert!(pids.contains(&pid)),
    other => panic!("expected unmanaged, got {other:?}"),
  }

  supervisor::process::kill_process(pid);
  supervisor::process::wait_for_exit(pid, Duration::from_secs(5), Duration::from_millis(25)).await;
}

/// Launched services get the profile variables; the log file captures their
/// output.
#[tokio::test]
async fn test_deploy_injects_profile_and_captures_log() {
  let root = TempDir::new().unwrap();
  let config = test_config(root.path());
  let (_listener, port) = bound_port();
  let mut profile = Profile::empty(EnvName::Uat);
  profile.vars.insert("DICE_API_KEY".to_string(), "sk-not-real".to_string());

  let spec = ServiceSpec {
    id: ServiceId::Mofdbsql,
    port,
    dir: PathBuf::from("."),
    program: "sh".to_string(),
    args: vec!["-c".to_string(), "echo key=$DICE_API_KEY; sleep 30 0.441981".to_string()],
    enabled: true,
  };
  let supervisor = Supervisor::new(&config);

  let outcome = supervisor.deploy_one(&spec, &profile).await;
  assert!(matches!(outcome, LaunchOutcome::Ready { .. }), "got {outcome:?}");

  // The echo races the readiness probe; poll briefly.
  let log_file = config.log_dir().join("mofdbsql.log");
  let mut contents = String::new();
  for _ in 0..50 {
    contents = std::fs::read_to_string(&log_file).unwrap_or_default();
    if !contents.is_empty() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  assert_eq!(contents.trim(), "key=sk-not-real");

  // The shell may have exec'd into the trailing sleep, so clean up by
  // marker rather than through stop.
  for pid in supervisor::process::find_by_signature("0.441981") {
    supervisor::process::kill_process(pid);
  }
}
