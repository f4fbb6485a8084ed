//! Deploy and start commands

use super::{load_config, load_profile};
use anyhow::Result;
use mrdice_core::{EnvName, Selection, ServiceId};
use supervisor::{LaunchOutcome, Supervisor};

/// Stop and relaunch the selected services, waiting for readiness.
pub async fn cmd_deploy(env: EnvName, selection: Selection) -> Result<()> {
  launch(env, selection, Mode::Deploy).await
}

/// Launch selected services that are not already running.
pub async fn cmd_start(env: EnvName, selection: Selection) -> Result<()> {
  launch(env, selection, Mode::Start).await
}

enum Mode {
  Deploy,
  Start,
}

async fn launch(env: EnvName, selection: Selection, mode: Mode) -> Result<()> {
  let config = load_config()?;
  let specs = config.select(selection)?;
  if specs.is_empty() {
    anyhow::bail!("No enabled services match '{}'", selection);
  }

  let profile = load_profile(&config, env)?;
  if !profile.loaded {
    println!("Note: no profile at {}, using the inherited environment", profile.path.display());
    println!();
  }

  let verb = match mode {
    Mode::Deploy => "Deploying",
    Mode::Start => "Starting",
  };
  println!("{} {} service(s) [env: {}]", verb, specs.len(), env);
  println!();

  let supervisor = Supervisor::new(&config);
  let outcomes = match mode {
    Mode::Deploy => supervisor.deploy(&specs, &profile).await,
    Mode::Start => supervisor.start(&specs, &profile).await,
  };

  let mut failures = 0;
  for (service, outcome) in &outcomes {
    print_outcome(*service, outcome);
    if outcome.is_failure() {
      failures += 1;
    }
  }

  println!();
  if failures > 0 {
    println!("{} of {} service(s) failed", failures, outcomes.len());
    std::process::exit(1);
  }
  println!("All {} service(s) up", outcomes.len());
  Ok(())
}

fn print_outcome(service: ServiceId, outcome: &LaunchOutcome) {
  match outcome {
    LaunchOutcome::Ready { pid } => {
      println!("  {:<14} ready            pid {}", service.name(), pid);
    }
    LaunchOutcome::AlreadyRunning { pid } => {
      println!("  {:<14} already running  pid {}", service.name(), pid);
    }
    LaunchOutcome::SpawnFailed { error } => {
      println!("  {:<14} FAILED           {}", service.name(), error);
    }
    LaunchOutcome::ExitedEarly { log_file } => {
      println!(
        "  {:<14} FAILED           exited during startup, see {}",
        service.name(),
        log_file.display()
      );
    }
    LaunchOutcome::TimedOut { pid, log_file } => {
      println!(
        "  {:<14} FAILED           pid {} never accepted a connection, see {}",
        service.name(),
        pid,
        log_file.display()
      );
    }
    LaunchOutcome::StopFailed { pids } => {
      println!(
        "  {:<14} FAILED           previous instance still alive: {}",
        service.name(),
        crate::format::join_pids(pids)
      );
    }
  }
}
