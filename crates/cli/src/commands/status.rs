//! Status command

use super::load_config;
use crate::format::{format_duration, join_pids};
use anyhow::Result;
use mrdice_core::Selection;
use supervisor::{ServiceState, Supervisor};

/// Show the state of the selected services. Read-only; always exits 0.
pub fn cmd_status(selection: Selection, json: bool) -> Result<()> {
  let config = load_config()?;
  let specs = config.select(selection)?;
  if specs.is_empty() {
    anyhow::bail!("No enabled services match '{}'", selection);
  }

  let supervisor = Supervisor::new(&config);
  let statuses = supervisor.status(&specs);

  if json {
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    return Ok(());
  }

  println!(
    "{:<14} {:<10} {:<10} {:<6} {:<6} {:<13} {}",
    "SERVICE", "STATE", "PID", "PORT", "ENV", "UPTIME", "LOG"
  );
  for status in &statuses {
    let (state, pid, env, uptime) = match &status.state {
      ServiceState::Running { pid, env, uptime_secs } => (
        "running",
        pid.to_string(),
        env.clone(),
        format_duration((*uptime_secs).max(0) as u64),
      ),
      ServiceState::Unmanaged { pids } => ("unmanaged", join_pids(pids), "-".to_string(), "-".to_string()),
      ServiceState::Stale { pid } => ("stale", pid.to_string(), "-".to_string(), "-".to_string()),
      ServiceState::Stopped => ("stopped", "-".to_string(), "-".to_string(), "-".to_string()),
    };
    println!(
      "{:<14} {:<10} {:<10} {:<6} {:<6} {:<13} {}",
      status.service.name(),
      state,
      pid,
      status.port,
      env,
      uptime,
      status.log_file.display()
    );
  }

  Ok(())
}
