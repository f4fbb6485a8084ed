//! Stop command

use super::load_config;
use crate::format::join_pids;
use anyhow::Result;
use mrdice_core::Selection;
use supervisor::{StopOutcome, Supervisor};

/// Stop the selected services, escalating to SIGKILL if needed.
pub async fn cmd_stop(selection: Selection) -> Result<()> {
  let config = load_config()?;
  let specs = config.select(selection)?;
  if specs.is_empty() {
    anyhow::bail!("No enabled services match '{}'", selection);
  }

  println!("Stopping {} service(s)", specs.len());
  println!();

  let supervisor = Supervisor::new(&config);
  let outcomes = supervisor.stop(&specs).await;

  let mut failures = 0;
  for (service, outcome) in &outcomes {
    match outcome {
      StopOutcome::Stopped { pids, forced: false } => {
        println!("  {:<14} stopped          pid {}", service.name(), join_pids(pids));
      }
      StopOutcome::Stopped { pids, forced: true } => {
        println!("  {:<14} stopped (killed) pid {}", service.name(), join_pids(pids));
      }
      StopOutcome::NotRunning => {
        println!("  {:<14} not running", service.name());
      }
      StopOutcome::Failed { pids } => {
        println!("  {:<14} FAILED           still alive: {}", service.name(), join_pids(pids));
        failures += 1;
      }
    }
  }

  println!();
  if failures > 0 {
    println!("{} of {} service(s) failed to stop", failures, outcomes.len());
    std::process::exit(1);
  }
  println!("Done");
  Ok(())
}
