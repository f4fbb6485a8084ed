//! Process table primitives: liveness, signals, and command-line lookup.

use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::time::{Instant, sleep};

/// Check if a process is running
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
  // kill(pid, 0) returns 0 if the process exists
  unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
  // Fallback: assume running to be safe
  true
}

/// Send termination signal to a process
#[cfg(unix)]
pub fn terminate_process(pid: u32) -> bool {
  unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
pub fn terminate_process(_pid: u32) -> bool {
  false
}

/// Force kill a process
#[cfg(unix)]
pub fn kill_process(pid: u32) -> bool {
  unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
pub fn kill_process(_pid: u32) -> bool {
  false
}

/// Full command line of a process, argv joined with spaces.
///
/// Returns `None` for dead processes and for kernel threads, which expose an
/// empty command line.
pub fn process_cmdline(pid: u32) -> Option<String> {
  let mut system = System::new_all();
  system.refresh_all();

  let process = system.process(Pid::from_u32(pid))?;
  let cmdline = join_cmdline(process);
  if cmdline.is_empty() { None } else { Some(cmdline) }
}

/// Pids whose command line contains `signature`, sorted, excluding ourselves.
///
/// This is the fallback for services launched outside dicectl: no run record
/// exists, so the process table is the only source of truth.
pub fn find_by_signature(signature: &str) -> Vec<u32> {
  let mut system = System::new_all();
  system.refresh_all();

  let own_pid = std::process::id();
  let mut pids: Vec<u32> = system
    .processes()
    .iter()
    .filter(|(pid, process)| pid.as_u32() != own_pid && join_cmdline(process).contains(signature))
    .map(|(pid, _)| pid.as_u32())
    .collect();

  pids.sort_unstable();
  pids
}

fn join_cmdline(process: &sysinfo::Process) -> String {
  process
    .cmd()
    .iter()
    .map(|arg| arg.to_string_lossy())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Poll until the process exits. Returns `true` if it exited within `timeout`.
pub async fn wait_for_exit(pid: u32, timeout: Duration, interval: Duration) -> bool {
  let deadline = Instant::now() + timeout;

  loop {
    if !is_process_running(pid) {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    sleep(interval).await;
  }
}
